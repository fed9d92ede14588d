//! RSA key generation, loading and PEM persistence.

use rand::rngs::OsRng;
use rcgen::KeyPair;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// PEM label for PKCS#1 RSA private keys.
pub const PEM_PRIVATE_KEY: &str = "RSA PRIVATE KEY";

/// Smallest modulus the signing backend accepts.
pub const MIN_KEY_BITS: usize = 2048;

/// An RSA key pair. Immutable once generated or loaded.
#[derive(Clone)]
pub struct PrivateKey {
    rsa: RsaPrivateKey,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").field("bits", &self.bits()).finish()
    }
}

impl PrivateKey {
    /// Generate a fresh key of `bits` bits.
    pub fn generate(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(Error::KeyGeneration {
                bits,
                reason: format!("key size must be at least {MIN_KEY_BITS} bits"),
            });
        }
        let rsa = RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| Error::KeyGeneration {
            bits,
            reason: e.to_string(),
        })?;
        log::debug!("generated {bits}-bit RSA key");
        Ok(Self { rsa })
    }

    /// Parse the first `RSA PRIVATE KEY` PEM block in `pem`.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let mut rd = pem;
        if let Some(der) = rustls_pemfile::rsa_private_keys(&mut rd).next() {
            let der = der.map_err(|e| Error::decode("private key PEM", e))?;
            return Self::from_der(der.secret_pkcs1_der());
        }
        Err(Error::decode(
            "private key PEM",
            format!("no {PEM_PRIVATE_KEY} block found"),
        ))
    }

    /// Parse PKCS#1 DER.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let rsa = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| Error::decode("PKCS#1 private key", e))?;
        Ok(Self { rsa })
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::file_io("read private key", path, e))?;
        Self::from_pem(&data)
    }

    pub fn bits(&self) -> usize {
        self.rsa.n().bits()
    }

    /// PKCS#1 DER encoding.
    pub fn der_encoded(&self) -> Result<Vec<u8>> {
        let doc = self
            .rsa
            .to_pkcs1_der()
            .map_err(|e| Error::decode("PKCS#1 private key", e))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// OpenSSL-style `RSA PRIVATE KEY` PEM.
    pub fn pem_encoded(&self) -> Result<String> {
        let pem = self
            .rsa
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::decode("PKCS#1 private key", e))?;
        Ok(pem.to_string())
    }

    /// Write PEM to `path`, readable by the owner only.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let pem = self.pem_encoded()?;

        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut f = opts
            .open(path)
            .map_err(|e| Error::file_io("open private key", path, e))?;
        f.write_all(pem.as_bytes())
            .map_err(|e| Error::file_io("write private key", path, e))?;
        Ok(())
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_rsa(&self.rsa.to_public_key())
    }

    /// rcgen view of this key, used for signing.
    pub(crate) fn signing_key(&self) -> Result<KeyPair> {
        let der = self
            .rsa
            .to_pkcs8_der()
            .map_err(|e| Error::Signing(format!("encode signing key: {e}")))?;
        let pkcs8 = PrivatePkcs8KeyDer::from(der.as_bytes().to_vec());
        Ok(KeyPair::from_pkcs8_der_and_sign_algo(
            &pkcs8,
            &rcgen::PKCS_RSA_SHA256,
        )?)
    }
}

/// An RSA public key, held as PKCS#1 `RSAPublicKey` DER.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    der: Vec<u8>,
}

impl PublicKey {
    fn from_rsa(key: &RsaPublicKey) -> Result<Self> {
        let doc = key
            .to_pkcs1_der()
            .map_err(|e| Error::decode("PKCS#1 public key", e))?;
        Ok(Self {
            der: doc.as_bytes().to_vec(),
        })
    }

    /// Wrap PKCS#1 `RSAPublicKey` DER, e.g. the subject key bits of a certificate.
    pub fn from_pkcs1_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

impl rcgen::PublicKeyData for PublicKey {
    fn der_bytes(&self) -> &[u8] {
        &self.der
    }

    fn algorithm(&self) -> &rcgen::SignatureAlgorithm {
        &rcgen::PKCS_RSA_SHA256
    }
}
