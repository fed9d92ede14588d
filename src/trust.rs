//! Trust store install/uninstall (platform abstraction).

use crate::cert::Certificate;
use crate::config::TrustConfig;
use crate::error::Result;
use crate::platform::{default_trust_store, InstallPrompt, TrustStore};

/// Install certificate as a trusted root where missing; true if anything changed.
pub fn add_as_trusted_root_if_needed(
    config: &TrustConfig,
    cert: &Certificate,
    prompt: &InstallPrompt,
) -> Result<bool> {
    default_trust_store(config)?.add_as_trusted_root_if_needed(cert, prompt, None)
}

/// Install using provided store (for testing).
pub fn add_as_trusted_root_if_needed_with_store(
    store: &dyn TrustStore,
    cert: &Certificate,
    prompt: &InstallPrompt,
) -> Result<bool> {
    store.add_as_trusted_root_if_needed(cert, prompt, None)
}

/// Check if certificate is installed in the platform trust store.
pub fn is_installed(config: &TrustConfig, cert: &Certificate) -> Result<bool> {
    default_trust_store(config)?.is_installed(cert)
}

/// Remove trusted roots named `common_name` from the platform trust store.
pub fn delete_trusted_root_by_name(config: &TrustConfig, common_name: &str, prompt: &str) -> Result<()> {
    default_trust_store(config)?.delete_trusted_root_by_name(common_name, prompt)
}

/// Remove using provided store (for testing).
pub fn delete_trusted_root_by_name_with_store(
    store: &dyn TrustStore,
    common_name: &str,
    prompt: &str,
) -> Result<()> {
    store.delete_trusted_root_by_name(common_name, prompt)
}
