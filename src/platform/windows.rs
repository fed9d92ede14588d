//! Windows: the `ROOT` system store, reached through a certificate import
//! helper executable with `add`/`find`/`delete` subcommands.
//!
//! Exit code 0 is the helper's only success signal. `find` runs unelevated;
//! `add` and `delete` are elevated when a prompt is given. The helper exits
//! non-zero when asked to delete a name that is not present, and that is
//! returned as an error.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

use super::{report, AttemptCallback, InstallPrompt, TrustStore};
use crate::cert::Certificate;
use crate::config::TrustConfig;
use crate::elevate::Elevation;
use crate::error::{Error, Result};
use crate::tool::{exits_zero, run_checked, CommandRunner, SystemRunner, ToolCommand};

/// Name of the trusted root store.
pub const ROOT_STORE: &str = "ROOT";

/// Handle on the helper executable. When built from bytes the executable is
/// extracted once to a temp file that lives as long as this handle.
#[derive(Debug)]
pub struct CertImporter {
    path: PathBuf,
    _extracted: Option<TempPath>,
}

impl CertImporter {
    /// Use an existing helper at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::file_io(
                "find certificate helper",
                &path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(Self {
            path,
            _extracted: None,
        })
    }

    /// Write `bytes` to an executable temp file.
    pub fn extract(bytes: &[u8]) -> Result<Self> {
        let tmp_dir = std::env::temp_dir();
        let mut file = tempfile::Builder::new()
            .prefix("certimporter")
            .suffix(if cfg!(windows) { ".exe" } else { "" })
            .tempfile()
            .map_err(|e| Error::file_io("create helper in", &tmp_dir, e))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| Error::file_io("write helper", file.path(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o755))
                .map_err(|e| Error::file_io("make executable", file.path(), e))?;
        }
        let extracted = file.into_temp_path();
        log::debug!("extracted certificate helper to {}", extracted.display());
        Ok(Self {
            path: extracted.to_path_buf(),
            _extracted: Some(extracted),
        })
    }

    /// The helper named by the config.
    pub fn resolve(config: &TrustConfig) -> Result<Self> {
        match &config.certimporter {
            Some(path) => Self::at(path),
            None => Err(Error::Config(
                "no certificate helper configured; set `certimporter` or TRUSTKIT_CERTIMPORTER"
                    .to_string(),
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct WindowsTrustStore {
    helper: CertImporter,
    elevation: Elevation,
    runner: Arc<dyn CommandRunner>,
}

impl WindowsTrustStore {
    pub fn new(helper: CertImporter) -> Self {
        Self::with_runner(helper, Arc::new(SystemRunner))
    }

    pub fn with_runner(helper: CertImporter, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            helper,
            elevation: Elevation::for_current_platform(),
            runner,
        }
    }

    pub fn with_elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn helper(&self) -> &CertImporter {
        &self.helper
    }

    fn helper_cmd(&self, prompt: &str, args: &[&str]) -> ToolCommand {
        self.elevation.command(prompt, self.helper.path(), args)
    }

    fn install(&self, cert: &Certificate, prompt: &InstallPrompt) -> Result<()> {
        if !prompt.title.is_empty() && !prompt.body.is_empty() {
            self.show_notice(&prompt.title, &prompt.body)?;
        }
        let staged = cert.write_to_der_temp_file()?;
        let staged_arg = staged.to_string_lossy().into_owned();
        let cmd = self.helper_cmd(&prompt.elevate, &["add", ROOT_STORE, &staged_arg]);
        run_checked(self.runner.as_ref(), &cmd)?;
        Ok(())
    }

    fn show_notice(&self, title: &str, body: &str) -> Result<()> {
        let script = format!(
            "javascript: var sh=new ActiveXObject('WScript.Shell'); sh.Popup('{}', 0, '{}', 64); close()",
            js_escape(body),
            js_escape(title)
        );
        run_checked(self.runner.as_ref(), &ToolCommand::new("mshta").arg(script))?;
        Ok(())
    }
}

impl TrustStore for WindowsTrustStore {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn stores(&self) -> Result<Vec<String>> {
        Ok(vec![ROOT_STORE.to_string()])
    }

    fn is_installed(&self, cert: &Certificate) -> Result<bool> {
        let cmd = ToolCommand::new(self.helper.path())
            .args(["find", ROOT_STORE, cert.common_name()]);
        exits_zero(self.runner.as_ref(), &cmd)
    }

    fn add_as_trusted_root_if_needed(
        &self,
        cert: &Certificate,
        prompt: &InstallPrompt,
        mut on_attempt: Option<AttemptCallback<'_>>,
    ) -> Result<bool> {
        if self.is_installed(cert)? {
            log::debug!("{} already in {ROOT_STORE}", cert.common_name());
            return Ok(false);
        }

        match self.install(cert, prompt) {
            Ok(()) => {
                log::info!("installed {} into {ROOT_STORE}", cert.common_name());
                report(&mut on_attempt, ROOT_STORE, None);
                Ok(true)
            }
            Err(e) => {
                report(&mut on_attempt, ROOT_STORE, Some(&e));
                Err(e)
            }
        }
    }

    fn delete_trusted_root_by_name(&self, common_name: &str, prompt: &str) -> Result<()> {
        let cmd = self.helper_cmd(prompt, &["delete", ROOT_STORE, common_name]);
        run_checked(self.runner.as_ref(), &cmd)?;
        log::info!("deleted {common_name} from {ROOT_STORE}");
        Ok(())
    }
}

fn js_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}
