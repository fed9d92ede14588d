//! Platform trust stores behind one contract.
//!
//! Identity is the certificate's subject Common Name: two certificates with
//! the same CN are indistinguishable to `is_installed` and deletion. Stores
//! are the system of record; nothing is cached here.

pub mod linux;
pub mod macos;
pub mod nss;
pub mod unsupported;
pub mod windows;

use std::sync::Arc;

use crate::cert::Certificate;
use crate::config::TrustConfig;
use crate::error::{Error, Result};
use crate::tool::{CommandRunner, SystemRunner};

/// Texts shown to the user while installing.
#[derive(Debug, Clone, Default)]
pub struct InstallPrompt {
    /// Shown by the elevation mechanism; empty means do not elevate.
    pub elevate: String,
    /// Optional notice shown before installing (Windows only).
    pub title: String,
    pub body: String,
}

impl InstallPrompt {
    pub fn elevated(prompt: impl Into<String>) -> Self {
        Self {
            elevate: prompt.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one per-store install attempt, reported to the caller's callback.
#[derive(Debug)]
pub struct InstallAttempt<'a> {
    /// Store locator (keychain path, NSS profile, `ROOT`).
    pub store: &'a str,
    pub error: Option<&'a Error>,
}

/// Callback receiving each install attempt.
pub type AttemptCallback<'a> = &'a mut dyn FnMut(&InstallAttempt<'_>);

/// Trust store operations (check, install, delete, enumerate).
///
/// Within one install call every target store is attempted in order; the
/// first error is returned once all attempts are done. Stores changed before
/// a failure stay changed.
pub trait TrustStore: Send + Sync {
    /// Short name of the backend, e.g. "nss".
    fn name(&self) -> &'static str;

    /// Locators of every store this backend targets.
    fn stores(&self) -> Result<Vec<String>>;

    /// True when every target store holds a certificate with `cert`'s CN.
    /// Does not modify anything.
    fn is_installed(&self, cert: &Certificate) -> Result<bool>;

    /// Install `cert` as a trusted root in each target store that lacks it.
    /// Returns whether any store changed; repeated calls are no-ops.
    fn add_as_trusted_root_if_needed(
        &self,
        cert: &Certificate,
        prompt: &InstallPrompt,
        on_attempt: Option<AttemptCallback<'_>>,
    ) -> Result<bool>;

    /// Remove trusted roots named `common_name` from every reachable store.
    fn delete_trusted_root_by_name(&self, common_name: &str, prompt: &str) -> Result<()>;
}

pub(crate) fn report(on_attempt: &mut Option<AttemptCallback<'_>>, store: &str, error: Option<&Error>) {
    if let Some(cb) = on_attempt.as_mut() {
        cb(&InstallAttempt { store, error });
    }
}

/// Get the platform TrustStore implementation.
pub fn default_trust_store(config: &TrustConfig) -> Result<Box<dyn TrustStore>> {
    trust_store_with_runner(config, Arc::new(SystemRunner))
}

/// Platform TrustStore running its tools through `runner`.
#[allow(unused_variables)]
pub fn trust_store_with_runner(
    config: &TrustConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<Box<dyn TrustStore>> {
    #[cfg(target_os = "macos")]
    return Ok(Box::new(macos::KeychainTrustStore::with_runner(config, runner)));

    #[cfg(target_os = "linux")]
    return Ok(Box::new(linux::NssTrustStore::with_runner(config, runner)));

    #[cfg(windows)]
    return Ok(Box::new(windows::WindowsTrustStore::with_runner(
        windows::CertImporter::resolve(config)?,
        runner,
    )));

    #[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
    return Ok(Box::new(unsupported::UnsupportedTrustStore));
}
