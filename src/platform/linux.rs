//! Linux: every discoverable NSS database, managed with `certutil`.
//!
//! Databases are user-writable, so nothing is elevated and the elevation
//! prompt is ignored. Deleting a name absent from a database is not an
//! error: databases are checked first and only those holding the name are
//! touched. `certutil -D` drops one entry per call, so deletion repeats
//! until the name is gone. With no database found nothing can trust the
//! certificate: `is_installed` is false and installing is a no-op.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::nss::{discover_profiles, Profile};
use super::{report, AttemptCallback, InstallPrompt, TrustStore};
use crate::cert::Certificate;
use crate::config::TrustConfig;
use crate::error::{Error, Result};
use crate::tool::{exits_zero, run_checked, CommandRunner, SystemRunner, ToolCommand};

/// certutil trust flags: trusted CA for TLS servers.
const TRUST_FLAGS: &str = "C,,";

/// Upper bound on `-D` calls against one database for one name.
const MAX_DELETES: usize = 32;

pub struct NssTrustStore {
    config: TrustConfig,
    runner: Arc<dyn CommandRunner>,
}

impl NssTrustStore {
    pub fn new(config: &TrustConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    pub fn with_runner(config: &TrustConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config: config.clone(),
            runner,
        }
    }

    pub fn profiles(&self) -> Vec<Profile> {
        discover_profiles(&self.config)
    }

    fn certutil(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config.certutil {
            return Ok(path.clone());
        }
        which::which("certutil").map_err(|e| Error::ToolInvocation {
            command: "certutil".to_string(),
            reason: format!("not found on PATH ({e}); install the NSS tools (libnss3-tools / nss-tools)"),
            output: String::new(),
        })
    }

    fn contains(&self, certutil: &Path, profile: &Profile, common_name: &str) -> Result<bool> {
        let cmd = ToolCommand::new(certutil)
            .args(["-d", profile.locator(), "-L", "-n", common_name]);
        exits_zero(self.runner.as_ref(), &cmd)
    }

    fn install_into(
        &self,
        certutil: &Path,
        profile: &Profile,
        cert: &Certificate,
        staged: &Path,
    ) -> Result<bool> {
        if self.contains(certutil, profile, cert.common_name())? {
            log::debug!("{} already trusted in {profile}", cert.common_name());
            return Ok(false);
        }
        let cmd = ToolCommand::new(certutil)
            .args(["-d", profile.locator(), "-A", "-t", TRUST_FLAGS, "-n"])
            .arg(cert.common_name())
            .arg("-i")
            .arg(staged);
        run_checked(self.runner.as_ref(), &cmd)?;
        log::info!("installed {} into {profile}", cert.common_name());
        Ok(true)
    }

    fn delete_from(&self, certutil: &Path, profile: &Profile, common_name: &str) -> Result<()> {
        let cmd = ToolCommand::new(certutil)
            .args(["-d", profile.locator(), "-D", "-n", common_name]);
        for _ in 0..MAX_DELETES {
            if !self.contains(certutil, profile, common_name)? {
                return Ok(());
            }
            run_checked(self.runner.as_ref(), &cmd)?;
            log::info!("deleted {common_name} from {profile}");
        }
        if self.contains(certutil, profile, common_name)? {
            return Err(Error::ToolInvocation {
                command: cmd.display(),
                reason: format!("{common_name} still present after {MAX_DELETES} deletions"),
                output: String::new(),
            });
        }
        Ok(())
    }
}

impl TrustStore for NssTrustStore {
    fn name(&self) -> &'static str {
        "nss"
    }

    fn stores(&self) -> Result<Vec<String>> {
        Ok(self
            .profiles()
            .iter()
            .map(|p| p.locator().to_string())
            .collect())
    }

    fn is_installed(&self, cert: &Certificate) -> Result<bool> {
        let profiles = self.profiles();
        if profiles.is_empty() {
            log::debug!("no NSS databases found; {} is not trusted anywhere", cert.common_name());
            return Ok(false);
        }
        let certutil = self.certutil()?;
        for profile in &profiles {
            if !self.contains(&certutil, profile, cert.common_name())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn add_as_trusted_root_if_needed(
        &self,
        cert: &Certificate,
        _prompt: &InstallPrompt,
        mut on_attempt: Option<AttemptCallback<'_>>,
    ) -> Result<bool> {
        let profiles = self.profiles();
        if profiles.is_empty() {
            log::warn!("no NSS databases found; nothing to install into");
            return Ok(false);
        }
        let certutil = self.certutil()?;
        let staged = cert.write_to_temp_file()?;

        let mut changed = false;
        let mut first_error = None;
        for profile in &profiles {
            match self.install_into(&certutil, profile, cert, &staged) {
                Ok(false) => {}
                Ok(true) => {
                    changed = true;
                    report(&mut on_attempt, profile.locator(), None);
                }
                Err(e) => {
                    log::warn!("unable to install {} into {profile}: {e}", cert.common_name());
                    report(&mut on_attempt, profile.locator(), Some(&e));
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }

    fn delete_trusted_root_by_name(&self, common_name: &str, _prompt: &str) -> Result<()> {
        let profiles = self.profiles();
        if profiles.is_empty() {
            return Ok(());
        }
        let certutil = self.certutil()?;

        let mut first_error = None;
        for profile in &profiles {
            if let Err(e) = self.delete_from(&certutil, profile, common_name) {
                log::warn!("unable to delete {common_name} from {profile}: {e}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
