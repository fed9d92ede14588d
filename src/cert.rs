//! Certificate templates, signing, parsing and persistence.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SanType, SerialNumber,
};
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use std::fs;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use tempfile::TempPath;
use time::{Duration, OffsetDateTime};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{Error, Result};
use crate::key::{PrivateKey, PublicKey};

/// PEM label for X.509 certificates.
pub const PEM_CERTIFICATE: &str = "CERTIFICATE";

/// Describes a certificate to be signed. Consumed once, never persisted.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub organization: String,
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub key_usages: Vec<KeyUsagePurpose>,
    pub is_ca: bool,
}

impl CertificateTemplate {
    /// Leaf template valid from a week ago for one year.
    pub fn new(organization: impl Into<String>, common_name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            organization: organization.into(),
            common_name: common_name.into(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            not_before: now - Duration::weeks(1),
            not_after: now + Duration::days(365),
            key_usages: vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ],
            is_ca: false,
        }
    }

    pub fn dns_name(mut self, name: impl Into<String>) -> Self {
        self.dns_names.push(name.into());
        self
    }

    pub fn ip_address(mut self, ip: IpAddr) -> Self {
        self.ip_addresses.push(ip);
        self
    }

    /// Add a SAN, as an IP address when `name` parses as one, else as a DNS name.
    pub fn san(self, name: &str) -> Self {
        match name.parse::<IpAddr>() {
            Ok(ip) => self.ip_address(ip),
            Err(_) => self.dns_name(name),
        }
    }

    /// Valid from now until `validity` from now. `validity` must be positive
    /// and keep the end date representable.
    pub fn valid_for(mut self, validity: Duration) -> Result<Self> {
        if !validity.is_positive() {
            return Err(Error::Signing(format!(
                "validity must be positive, got {validity}"
            )));
        }
        let now = OffsetDateTime::now_utc();
        self.not_before = now;
        self.not_after = now.checked_add(validity).ok_or_else(|| {
            Error::Signing(format!("validity of {validity} is out of range"))
        })?;
        Ok(self)
    }

    pub fn valid_until(mut self, not_after: OffsetDateTime) -> Self {
        self.not_after = not_after;
        self
    }

    /// Mark as a certificate authority that may sign other certificates.
    pub fn ca(mut self) -> Self {
        self.is_ca = true;
        for usage in [KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign] {
            if !self.key_usages.contains(&usage) {
                self.key_usages.push(usage);
            }
        }
        self
    }

    fn to_params(&self) -> Result<CertificateParams> {
        if self.not_after <= self.not_before {
            return Err(Error::Signing(format!(
                "validity window is empty: {} is not after {}",
                self.not_after, self.not_before
            )));
        }
        let mut params = CertificateParams::new(self.dns_names.clone())?;
        params
            .subject_alt_names
            .extend(self.ip_addresses.iter().copied().map(SanType::IpAddress));

        params.distinguished_name = DistinguishedName::new();
        if !self.organization.is_empty() {
            params.distinguished_name.push(
                DnType::OrganizationName,
                DnValue::Utf8String(self.organization.clone()),
            );
        }
        params.distinguished_name.push(
            DnType::CommonName,
            DnValue::Utf8String(self.common_name.clone()),
        );

        params.not_before = self.not_before;
        params.not_after = self.not_after;
        params.serial_number = Some(random_serial());
        params.key_usages = self.key_usages.clone();
        if self.is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        } else {
            params.is_ca = IsCa::ExplicitNoCa;
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        }
        Ok(params)
    }
}

fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    // keep it positive
    bytes[0] &= 0x7f;
    SerialNumber::from(bytes.to_vec())
}

impl PrivateKey {
    /// Sign `template` with this key. Without `issuer` the result is
    /// self-signed; otherwise the issuer's subject is used as signer identity
    /// while this key does the signing.
    pub fn certificate(
        &self,
        template: &CertificateTemplate,
        issuer: Option<&Certificate>,
    ) -> Result<Certificate> {
        self.sign(template, issuer, None)
    }

    /// Like [`PrivateKey::certificate`], but the certificate binds
    /// `public_key` instead of this key's own public key.
    pub fn certificate_for_key(
        &self,
        template: &CertificateTemplate,
        issuer: Option<&Certificate>,
        public_key: &PublicKey,
    ) -> Result<Certificate> {
        self.sign(template, issuer, Some(public_key))
    }

    /// TLS certificate for `name` valid until `valid_until`. `name` and each
    /// entry of `sans` that parses as an IP address become IP SANs; remaining
    /// `sans` become DNS SANs.
    pub fn tls_certificate_for(
        &self,
        valid_until: OffsetDateTime,
        is_ca: bool,
        issuer: Option<&Certificate>,
        organization: &str,
        name: &str,
        sans: &[&str],
    ) -> Result<Certificate> {
        let mut template = CertificateTemplate::new(organization, name).valid_until(valid_until);
        template.not_before = OffsetDateTime::now_utc() - Duration::days(30);
        if let Ok(ip) = name.parse::<IpAddr>() {
            template = template.ip_address(ip);
        }
        for san in sans {
            template = template.san(san);
        }
        if is_ca {
            template = template.ca();
        }
        self.certificate(&template, issuer)
    }

    fn sign(
        &self,
        template: &CertificateTemplate,
        issuer: Option<&Certificate>,
        subject_key: Option<&PublicKey>,
    ) -> Result<Certificate> {
        let signing_key = self.signing_key()?;
        let params = template.to_params()?;

        let cert = match (issuer, subject_key) {
            (None, None) => params.self_signed(&signing_key)?,
            _ => {
                let issuer_cert = match issuer {
                    Some(issuer) => {
                        CertificateParams::from_ca_cert_pem(&issuer.pem_encoded())?
                            .self_signed(&signing_key)?
                    }
                    None => template.to_params()?.self_signed(&signing_key)?,
                };
                match subject_key {
                    Some(pk) => params.signed_by(pk, &issuer_cert, &signing_key)?,
                    None => params.signed_by(&signing_key, &issuer_cert, &signing_key)?,
                }
            }
        };

        log::debug!(
            "signed certificate for {:?} (self-signed: {})",
            template.common_name,
            issuer.is_none()
        );
        Certificate::from_der(cert.der().to_vec())
    }
}

/// A parsed X.509 certificate. The DER bytes are authoritative; the
/// summary fields are derived from them once and never change.
#[derive(Clone)]
pub struct Certificate {
    der: CertificateDer<'static>,
    info: Summary,
}

#[derive(Clone)]
struct Summary {
    common_name: String,
    organization: Option<String>,
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    is_ca: bool,
    public_key: Vec<u8>,
}

impl Summary {
    fn parse(der: &[u8]) -> Result<Self> {
        let (_, x509) =
            X509Certificate::from_der(der).map_err(|e| Error::decode("X.509 certificate", e))?;

        let subject = x509.subject();
        let common_name = subject
            .iter_common_name()
            .next()
            .and_then(|c| c.as_str().ok())
            .map(String::from)
            .unwrap_or_default();
        let organization = subject
            .iter_organization()
            .next()
            .and_then(|o| o.as_str().ok())
            .map(String::from);

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(ext)) = x509.subject_alternative_name() {
            for name in &ext.value.general_names {
                match name {
                    GeneralName::DNSName(s) => dns_names.push(s.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        let validity = x509.validity();
        Ok(Self {
            common_name,
            organization,
            dns_names,
            ip_addresses,
            not_before: validity.not_before.to_datetime(),
            not_after: validity.not_after.to_datetime(),
            is_ca: x509.is_ca(),
            public_key: x509.public_key().subject_public_key.data.to_vec(),
        })
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.info.common_name)
            .field("not_after", &self.info.not_after)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = CertificateDer::from(der.into());
        let info = Summary::parse(der.as_ref())?;
        Ok(Self { der, info })
    }

    /// Parse the first `CERTIFICATE` PEM block.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let mut rd = pem;
        let der = rustls_pemfile::certs(&mut rd)
            .next()
            .ok_or_else(|| {
                Error::decode("certificate PEM", format!("no {PEM_CERTIFICATE} block found"))
            })?
            .map_err(|e| Error::decode("certificate PEM", e))?;
        Self::from_der(der.to_vec())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::file_io("read certificate", path, e))?;
        Self::from_pem(&data)
    }

    /// The identity used by trust stores.
    pub fn common_name(&self) -> &str {
        &self.info.common_name
    }

    pub fn organization(&self) -> Option<&str> {
        self.info.organization.as_deref()
    }

    pub fn dns_names(&self) -> &[String] {
        &self.info.dns_names
    }

    pub fn ip_addresses(&self) -> &[IpAddr] {
        &self.info.ip_addresses
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.info.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.info.not_after
    }

    pub fn is_ca(&self) -> bool {
        self.info.is_ca
    }

    pub fn expires_before(&self, instant: OffsetDateTime) -> bool {
        self.info.not_after < instant
    }

    /// Subject public key as PKCS#1 `RSAPublicKey` DER.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_pkcs1_der(self.info.public_key.clone())
    }

    /// Re-parse the full X.509 structure, borrowing from the DER bytes.
    pub fn x509(&self) -> Result<X509Certificate<'_>> {
        X509Certificate::from_der(self.der.as_ref())
            .map(|(_, cert)| cert)
            .map_err(|e| Error::decode("X.509 certificate", e))
    }

    pub fn der_encoded(&self) -> &[u8] {
        self.der.as_ref()
    }

    pub fn pem_encoded(&self) -> String {
        let block = pem::Pem::new(PEM_CERTIFICATE, self.der.to_vec());
        pem::encode_config(
            &block,
            pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
        )
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.pem_encoded())
            .map_err(|e| Error::file_io("write certificate", path, e))
    }

    pub fn write_to_der_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.der_encoded())
            .map_err(|e| Error::file_io("write certificate", path, e))
    }

    /// Stage the PEM in a temp file that is deleted when the returned path drops.
    pub fn write_to_temp_file(&self) -> Result<TempPath> {
        stage_temp(self.pem_encoded().as_bytes(), ".pem")
    }

    /// Stage the DER in a temp file that is deleted when the returned path drops.
    pub fn write_to_der_temp_file(&self) -> Result<TempPath> {
        stage_temp(self.der_encoded(), ".cer")
    }
}

fn stage_temp(bytes: &[u8], suffix: &str) -> Result<TempPath> {
    let tmp_dir = std::env::temp_dir();
    let mut file = tempfile::Builder::new()
        .prefix("trustkit-cert")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| Error::file_io("create temp file in", &tmp_dir, e))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| Error::file_io("write temp file", file.path(), e))?;
    Ok(file.into_temp_path())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// A rustls root store trusting exactly `certs`.
pub fn pool_containing(certs: &[Certificate]) -> Result<RootCertStore> {
    let mut pool = RootCertStore::empty();
    for cert in certs {
        pool.add(cert.der.clone())
            .map_err(|e| Error::decode("trust anchor", e))?;
    }
    Ok(pool)
}
