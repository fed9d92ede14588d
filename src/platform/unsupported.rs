//! Fallback for platforms without a known trust store: every operation fails.

use super::{AttemptCallback, InstallPrompt, TrustStore};
use crate::cert::Certificate;
use crate::error::{Error, Result};

pub struct UnsupportedTrustStore;

impl TrustStore for UnsupportedTrustStore {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn stores(&self) -> Result<Vec<String>> {
        Err(Error::UnsupportedPlatform("listing trust stores"))
    }

    fn is_installed(&self, _cert: &Certificate) -> Result<bool> {
        Err(Error::UnsupportedPlatform("checking trusted roots"))
    }

    fn add_as_trusted_root_if_needed(
        &self,
        _cert: &Certificate,
        _prompt: &InstallPrompt,
        _on_attempt: Option<AttemptCallback<'_>>,
    ) -> Result<bool> {
        Err(Error::UnsupportedPlatform("adding trusted roots"))
    }

    fn delete_trusted_root_by_name(&self, _common_name: &str, _prompt: &str) -> Result<()> {
        Err(Error::UnsupportedPlatform("deleting trusted roots"))
    }
}
