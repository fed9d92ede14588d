//! Trustkit - mint locally-trusted certificates and manage them in OS trust stores.

pub mod cert;
pub mod cli;
pub mod config;
pub mod elevate;
pub mod error;
pub mod key;
pub mod platform;
pub mod tool;
pub mod trust;

pub use cert::{Certificate, CertificateTemplate};
pub use error::{Error, Result};
pub use key::{PrivateKey, PublicKey};
pub use platform::{InstallAttempt, InstallPrompt, TrustStore};
