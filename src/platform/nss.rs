//! NSS certificate database discovery.
//!
//! Candidates are every Firefox profile matched by the configured glob
//! followed by the fixed database list. Order is discovery order and carries
//! no meaning.

use glob::glob;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::TrustConfig;
use crate::error::Result;

/// NSS database generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    /// SQLite backend, `cert9.db`.
    Modern,
    /// Berkeley DB backend, `cert8.db`.
    Legacy,
}

impl ProfileKind {
    /// Prefix telling certutil which backend to open.
    pub fn prefix(self) -> &'static str {
        match self {
            ProfileKind::Modern => "sql:",
            ProfileKind::Legacy => "dbm:",
        }
    }

    fn catalog(self) -> &'static str {
        match self {
            ProfileKind::Modern => "cert9.db",
            ProfileKind::Legacy => "cert8.db",
        }
    }
}

/// An NSS database, passed to certutil as `-d <locator>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Profile {
    kind: ProfileKind,
    path: PathBuf,
    locator: String,
}

impl Profile {
    /// Classify `dir`; `None` when it is not a directory holding an NSS catalog.
    pub fn classify(dir: &Path) -> Option<Self> {
        if !dir.is_dir() {
            return None;
        }
        [ProfileKind::Modern, ProfileKind::Legacy]
            .into_iter()
            .find(|kind| dir.join(kind.catalog()).is_file())
            .map(|kind| Self {
                kind,
                path: dir.to_path_buf(),
                locator: format!("{}{}", kind.prefix(), dir.display()),
            })
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `sql:/path` or `dbm:/path`.
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.locator)
    }
}

/// Directories that might hold an NSS database.
pub fn candidate_paths(config: &TrustConfig) -> Vec<PathBuf> {
    let pattern = config.firefox_profile_pattern();
    let mut paths = match pattern.to_str().map(glob) {
        Some(Ok(entries)) => entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    log::warn!("skipping unreadable Firefox profile: {e}");
                    None
                }
            })
            .collect(),
        Some(Err(e)) => {
            log::warn!("bad Firefox profile pattern {}: {e}", pattern.display());
            Vec::new()
        }
        None => {
            log::warn!("Firefox profile pattern is not UTF-8: {}", pattern.display());
            Vec::new()
        }
    };
    paths.extend(config.nss_database_paths());
    paths
}

/// Every candidate that is a directory with a cert9.db or cert8.db catalog.
pub fn discover_profiles(config: &TrustConfig) -> Vec<Profile> {
    candidate_paths(config)
        .iter()
        .filter_map(|path| {
            let profile = Profile::classify(path);
            if profile.is_none() {
                log::debug!("no NSS database at {}", path.display());
            }
            profile
        })
        .collect()
}

/// Invoke `f` once per discovered profile, stopping at the first error.
pub fn for_each_profile<F>(config: &TrustConfig, mut f: F) -> Result<()>
where
    F: FnMut(&Profile) -> Result<()>,
{
    for profile in discover_profiles(config) {
        f(&profile)?;
    }
    Ok(())
}
