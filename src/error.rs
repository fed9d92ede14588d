//! Error type shared by key material, certificates and trust stores.

use std::path::PathBuf;

/// Everything that can go wrong while minting or installing certificates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to generate {bits}-bit RSA key: {reason}")]
    KeyGeneration { bits: usize, reason: String },

    #[error("unable to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("unable to sign certificate: {0}")]
    Signing(String),

    #[error("unable to {action} {}: {source}", .path.display())]
    FileIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External command could not be spawned or exited non-zero.
    /// `output` holds whatever the command printed (stdout then stderr).
    #[error("unable to run {command}: {reason}\n{output}")]
    ToolInvocation {
        command: String,
        reason: String,
        output: String,
    },

    #[error("{0} is not supported on this platform")]
    UnsupportedPlatform(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn file_io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Error::FileIo {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(what: &'static str, reason: impl ToString) -> Self {
        Error::Decode {
            what,
            reason: reason.to_string(),
        }
    }
}

impl From<rcgen::Error> for Error {
    fn from(e: rcgen::Error) -> Self {
        Error::Signing(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
