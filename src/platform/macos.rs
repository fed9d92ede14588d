//! macOS: one keychain, managed with the `security` tool.
//!
//! The login keychain is user-writable. For the system keychain `security`
//! raises its own authorization dialog; when an elevation prompt is given
//! the command is additionally wrapped so the prompt text is shown.
//!
//! `security -c` matches any certificate whose name contains the search
//! string, so every hit is fetched as PEM and filtered on its exact Common
//! Name. Deletion goes by the SHA-1 hash of each exact match. Deleting a
//! name with no exact match is an error.

use std::path::PathBuf;
use std::sync::Arc;

use super::{report, AttemptCallback, InstallPrompt, TrustStore};
use crate::cert::Certificate;
use crate::config::{Keychain, TrustConfig};
use crate::elevate::Elevation;
use crate::error::{Error, Result};
use crate::tool::{exits_zero, run_checked, CommandRunner, SystemRunner, ToolCommand};

pub struct KeychainTrustStore {
    security: PathBuf,
    keychain: Keychain,
    keychain_path: PathBuf,
    elevation: Elevation,
    runner: Arc<dyn CommandRunner>,
}

impl KeychainTrustStore {
    pub fn new(config: &TrustConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    pub fn with_runner(config: &TrustConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            security: config.security.clone(),
            keychain: config.keychain,
            keychain_path: config.keychain_path(),
            elevation: Elevation::for_current_platform(),
            runner,
        }
    }

    /// Override the elevation mechanism.
    pub fn with_elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    fn keychain_arg(&self) -> String {
        self.keychain_path.to_string_lossy().into_owned()
    }

    fn security_cmd(&self, prompt: &str, args: &[String]) -> ToolCommand {
        match self.keychain {
            Keychain::System => self.elevation.command(prompt, &self.security, args),
            Keychain::Login => ToolCommand::new(&self.security).args(args),
        }
    }

    fn find_cmd(&self, common_name: &str) -> ToolCommand {
        ToolCommand::new(&self.security)
            .args(["find-certificate", "-a", "-c", common_name, "-Z", "-p"])
            .arg(&self.keychain_path)
    }

    /// Keychain certificates whose Common Name is exactly `common_name`.
    fn exact_matches(&self, common_name: &str) -> Result<Vec<KeychainEntry>> {
        let out = self.runner.run(&self.find_cmd(common_name))?;
        if !out.success() {
            return Ok(Vec::new());
        }
        Ok(parse_find_output(&out.output_lossy())
            .into_iter()
            .filter(|entry| entry.cert.common_name() == common_name)
            .collect())
    }

    /// Whether the OS accepts `cert` as trusted (`security verify-cert`).
    pub fn verify_trust(&self, cert: &Certificate) -> Result<bool> {
        let staged = cert.write_to_temp_file()?;
        let cmd = ToolCommand::new(&self.security)
            .args(["verify-cert", "-c"])
            .arg(&*staged);
        exits_zero(self.runner.as_ref(), &cmd)
    }
}

impl TrustStore for KeychainTrustStore {
    fn name(&self) -> &'static str {
        "keychain"
    }

    fn stores(&self) -> Result<Vec<String>> {
        Ok(vec![self.keychain_arg()])
    }

    fn is_installed(&self, cert: &Certificate) -> Result<bool> {
        Ok(!self.exact_matches(cert.common_name())?.is_empty())
    }

    fn add_as_trusted_root_if_needed(
        &self,
        cert: &Certificate,
        prompt: &InstallPrompt,
        mut on_attempt: Option<AttemptCallback<'_>>,
    ) -> Result<bool> {
        if self.is_installed(cert)? {
            log::debug!("{} already in {}", cert.common_name(), self.keychain_arg());
            return Ok(false);
        }

        let staged = cert.write_to_temp_file()?;
        let mut args = vec!["add-trusted-cert".to_string()];
        if self.keychain == Keychain::System {
            args.push("-d".to_string());
        }
        args.extend([
            "-r".to_string(),
            "trustRoot".to_string(),
            "-k".to_string(),
            self.keychain_arg(),
            staged.to_string_lossy().into_owned(),
        ]);

        let cmd = self.security_cmd(&prompt.elevate, &args);
        let store = self.keychain_arg();
        match run_checked(self.runner.as_ref(), &cmd) {
            Ok(_) => {
                log::info!("installed {} into {store}", cert.common_name());
                report(&mut on_attempt, &store, None);
                Ok(true)
            }
            Err(e) => {
                report(&mut on_attempt, &store, Some(&e));
                Err(e)
            }
        }
    }

    fn delete_trusted_root_by_name(&self, common_name: &str, prompt: &str) -> Result<()> {
        let matches = self.exact_matches(common_name)?;
        if matches.is_empty() {
            return Err(Error::ToolInvocation {
                command: self.find_cmd(common_name).display(),
                reason: format!("no certificate named {common_name} in {}", self.keychain_arg()),
                output: String::new(),
            });
        }

        let mut first_error = None;
        for entry in &matches {
            let result = match &entry.sha1 {
                Some(sha1) => {
                    let args = vec![
                        "delete-certificate".to_string(),
                        "-Z".to_string(),
                        sha1.clone(),
                        self.keychain_arg(),
                    ];
                    run_checked(self.runner.as_ref(), &self.security_cmd(prompt, &args)).map(|_| ())
                }
                None => Err(Error::ToolInvocation {
                    command: self.find_cmd(common_name).display(),
                    reason: "no SHA-1 hash reported for a matching certificate".to_string(),
                    output: String::new(),
                }),
            };
            match result {
                Ok(()) => log::info!("deleted {common_name} from {}", self.keychain_arg()),
                Err(e) => {
                    log::warn!("unable to delete {common_name} from {}: {e}", self.keychain_arg());
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// One certificate reported by `find-certificate -Z -p`.
struct KeychainEntry {
    sha1: Option<String>,
    cert: Certificate,
}

/// Pair each PEM block with the `SHA-1 hash:` line printed before it.
fn parse_find_output(output: &str) -> Vec<KeychainEntry> {
    let mut entries = Vec::new();
    let mut sha1 = None;
    let mut block: Option<String> = None;
    for line in output.lines() {
        if let Some(hash) = line.strip_prefix("SHA-1 hash:") {
            sha1 = Some(hash.trim().to_string());
        } else if line.starts_with("-----BEGIN CERTIFICATE-----") {
            block = Some(format!("{line}\n"));
        } else if let Some(pem) = block.as_mut() {
            pem.push_str(line);
            pem.push('\n');
            if !line.starts_with("-----END CERTIFICATE-----") {
                continue;
            }
            let pem = block.take().unwrap_or_default();
            match Certificate::from_pem(pem.as_bytes()) {
                Ok(cert) => entries.push(KeychainEntry {
                    sha1: sha1.take(),
                    cert,
                }),
                Err(e) => log::warn!("skipping unparsable keychain certificate: {e}"),
            }
        }
    }
    entries
}
