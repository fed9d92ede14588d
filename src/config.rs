//! Configuration loading: where trust stores and their tools live.
//!
//! Supports TRUSTKIT_HOME / TRUSTKIT_CONFIG / TRUSTKIT_CERTIMPORTER env
//! overrides for testing.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Which macOS keychain receives trusted roots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keychain {
    /// `~/Library/Keychains/login.keychain`, no elevation needed.
    #[default]
    Login,
    /// `/Library/Keychains/System.keychain`, needs admin rights.
    System,
}

/// Store and tool locations.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// User home; NSS profile paths are resolved against it.
    pub home: PathBuf,
    /// NSS `certutil`; looked up on PATH when unset.
    pub certutil: Option<PathBuf>,
    /// macOS `security` tool.
    pub security: PathBuf,
    pub keychain: Keychain,
    /// Windows certificate import helper.
    pub certimporter: Option<PathBuf>,
    /// Glob, relative to `home`, matching Firefox profile directories.
    pub firefox_profiles: String,
    /// Fixed NSS database directories; relative entries are resolved against `home`.
    pub nss_databases: Vec<PathBuf>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        let home = directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::with_home(home)
    }
}

impl TrustConfig {
    /// Defaults rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            certutil: None,
            security: PathBuf::from("/usr/bin/security"),
            keychain: Keychain::Login,
            certimporter: None,
            firefox_profiles: ".mozilla/firefox/*".to_string(),
            nss_databases: vec![
                PathBuf::from(".pki/nssdb"),
                PathBuf::from("snap/chromium/current/.pki/nssdb"),
                PathBuf::from("/etc/pki/nssdb"),
            ],
        }
    }

    /// Config for testing: every store lives under `home`.
    pub fn for_test(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref().to_path_buf();
        let mut config = Self::with_home(&home);
        config.certutil = Some(PathBuf::from("certutil"));
        config.security = PathBuf::from("security");
        config.nss_databases = vec![
            PathBuf::from(".pki/nssdb"),
            PathBuf::from("snap/chromium/current/.pki/nssdb"),
            home.join("etc/pki/nssdb"),
        ];
        config
    }

    /// Defaults, then the config file, then env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        if let Some(home) = std::env::var_os("TRUSTKIT_HOME") {
            config.home = PathBuf::from(home);
        }
        if let Some(helper) = std::env::var_os("TRUSTKIT_CERTIMPORTER") {
            config.certimporter = Some(PathBuf::from(helper));
        }
        Ok(config)
    }

    /// Read a TOML config (with shared lock); a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let mut file = fs::OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| Error::file_io("open config", path, e))?;
        fs2::FileExt::lock_shared(&file).map_err(|e| Error::file_io("lock config", path, e))?;
        use std::io::Read;
        let mut s = String::new();
        file.read_to_string(&mut s)
            .map_err(|e| Error::file_io("read config", path, e))?;
        toml::from_str(&s).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Write as TOML (with exclusive lock). Creates parent dirs if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(p) = path.parent() {
            fs::create_dir_all(p).map_err(|e| Error::file_io("create config dir", p, e))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::file_io("open config", path, e))?;
        fs2::FileExt::lock_exclusive(&file).map_err(|e| Error::file_io("lock config", path, e))?;
        let s = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        use std::io::Write;
        file.write_all(s.as_bytes())
            .map_err(|e| Error::file_io("write config", path, e))?;
        Ok(())
    }

    /// Absolute Firefox profile glob.
    pub fn firefox_profile_pattern(&self) -> PathBuf {
        self.home.join(&self.firefox_profiles)
    }

    /// Fixed NSS database directories, resolved against `home`.
    pub fn nss_database_paths(&self) -> Vec<PathBuf> {
        self.nss_databases.iter().map(|p| self.home.join(p)).collect()
    }

    pub fn keychain_path(&self) -> PathBuf {
        match self.keychain {
            Keychain::Login => self.home.join("Library/Keychains/login.keychain"),
            Keychain::System => PathBuf::from("/Library/Keychains/System.keychain"),
        }
    }
}

/// Path to config.toml (TRUSTKIT_CONFIG, else the per-user config dir).
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("TRUSTKIT_CONFIG") {
        return Some(PathBuf::from(path));
    }
    directories::ProjectDirs::from("org", "trustkit", "trustkit")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
