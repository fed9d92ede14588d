//! Shared test helpers.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

use trustkit::cert::Certificate;
use trustkit::error::Result;
use trustkit::tool::{CommandRunner, ToolCommand, ToolOutput};
use trustkit::PrivateKey;

/// Temp directory standing in for the user's home.
pub fn temp_home() -> TempDir {
    tempfile::Builder::new()
        .prefix("trustkit_test_")
        .tempdir_in(std::env::current_dir().unwrap_or_else(|_| std::path::Path::new(".").into()))
        .expect("temp dir")
}

/// Run a closure with TRUSTKIT_HOME set to the given path and
/// TRUSTKIT_CONFIG pointing at a config file inside it.
pub fn with_test_env<F, R>(home: &Path, f: F) -> R
where
    F: FnOnce() -> R,
{
    let prev_home = std::env::var_os("TRUSTKIT_HOME");
    let prev_config = std::env::var_os("TRUSTKIT_CONFIG");
    std::env::set_var("TRUSTKIT_HOME", home);
    std::env::set_var("TRUSTKIT_CONFIG", home.join("config.toml"));
    let r = f();
    match prev_home {
        Some(v) => std::env::set_var("TRUSTKIT_HOME", v),
        None => std::env::remove_var("TRUSTKIT_HOME"),
    }
    match prev_config {
        Some(v) => std::env::set_var("TRUSTKIT_CONFIG", v),
        None => std::env::remove_var("TRUSTKIT_CONFIG"),
    }
    r
}

/// Create an NSS database directory with the given catalog file
/// (`cert9.db` or `cert8.db`).
pub fn make_nss_db(dir: &Path, catalog: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(catalog), b"").unwrap();
    dir.to_path_buf()
}

/// Self-signed root for `cn`.
pub fn root_cert(cn: &str) -> (PrivateKey, Certificate) {
    let key = PrivateKey::generate(2048).unwrap();
    let template = trustkit::CertificateTemplate::new("Test Org", cn)
        .valid_for(time::Duration::weeks(2))
        .unwrap()
        .ca();
    let cert = key.certificate(&template, None).unwrap();
    (key, cert)
}

/// In-memory stand-in for certutil, security and the Windows helper.
///
/// Stores are keyed by locator (NSS `-d` value, keychain path, `ROOT`) and
/// hold entries in insertion order. Like the real tools, certutil and the
/// helper match names exactly, `security -c` matches substrings, and one
/// store may hold several entries with the same name.
#[derive(Default)]
pub struct FakeRunner {
    stores: Mutex<BTreeMap<String, Vec<Entry>>>,
    calls: Mutex<Vec<ToolCommand>>,
    staged: Mutex<Vec<PathBuf>>,
    failing: Mutex<BTreeSet<String>>,
    next_id: Mutex<u64>,
}

#[derive(Clone)]
struct Entry {
    id: String,
    name: String,
    cert: Option<Certificate>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `store` fail with exit code 255.
    pub fn fail_writes_to(&self, store: &str) {
        self.failing.lock().unwrap().insert(store.to_string());
    }

    /// Put an entry named `cn` into `store` without certificate bytes.
    pub fn preinstall(&self, store: &str, cn: &str) {
        self.push(store, cn, None);
    }

    /// Put `cert` into `store` under its Common Name.
    pub fn preinstall_cert(&self, store: &str, cert: &Certificate) {
        self.push(store, cert.common_name(), Some(cert.clone()));
    }

    /// Names in `store`, in insertion order.
    pub fn entries(&self, store: &str) -> Vec<String> {
        self.stores
            .lock()
            .unwrap()
            .get(store)
            .map(|s| s.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Stores holding `cn`.
    pub fn stores_with(&self, cn: &str) -> Vec<String> {
        self.stores
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.name == cn))
            .map(|(store, _)| store.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls rendered as strings.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.display()).collect()
    }

    /// Files handed to add commands.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        self.staged.lock().unwrap().clone()
    }

    fn push(&self, store: &str, cn: &str, cert: Option<Certificate>) {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("{:040X}", *next)
        };
        self.stores
            .lock()
            .unwrap()
            .entry(store.to_string())
            .or_default()
            .push(Entry {
                id,
                name: cn.to_string(),
                cert,
            });
    }

    fn has(&self, store: &str, cn: &str) -> bool {
        self.stores
            .lock()
            .unwrap()
            .get(store)
            .is_some_and(|s| s.iter().any(|e| e.name == cn))
    }

    /// Entries whose name contains `needle`.
    fn search(&self, store: &str, needle: &str) -> Vec<Entry> {
        self.stores
            .lock()
            .unwrap()
            .get(store)
            .map(|s| s.iter().filter(|e| e.name.contains(needle)).cloned().collect())
            .unwrap_or_default()
    }

    fn is_read_only(&self, store: &str) -> bool {
        self.failing.lock().unwrap().contains(store)
    }

    fn add(&self, store: &str, cn: &str, cert: Option<Certificate>) -> ToolOutput {
        if self.is_read_only(store) {
            return fail(255, "SEC_ERROR_READ_ONLY: database is read-only");
        }
        self.push(store, cn, cert);
        ok()
    }

    /// Remove the first entry accepted by `pred`.
    fn remove_where(&self, store: &str, pred: impl Fn(&Entry) -> bool) -> ToolOutput {
        if self.is_read_only(store) {
            return fail(255, "SEC_ERROR_READ_ONLY: database is read-only");
        }
        let mut stores = self.stores.lock().unwrap();
        let Some(entries) = stores.get_mut(store) else {
            return fail(1, "could not find certificate");
        };
        match entries.iter().position(|e| pred(e)) {
            Some(i) => {
                entries.remove(i);
                ok()
            }
            None => fail(1, "could not find certificate"),
        }
    }

    fn stage(&self, path: &str) -> Option<Certificate> {
        let path = PathBuf::from(path);
        self.staged.lock().unwrap().push(path.clone());
        let bytes = std::fs::read(&path).ok()?;
        Certificate::from_pem(&bytes)
            .or_else(|_| Certificate::from_der(bytes))
            .ok()
    }

    fn certutil(&self, args: &[String]) -> ToolOutput {
        let db = value_after(args, "-d").unwrap_or_default();
        let name = value_after(args, "-n").unwrap_or_default();
        if args.iter().any(|a| a == "-L") {
            return status(self.has(&db, &name));
        }
        if args.iter().any(|a| a == "-A") {
            let file = value_after(args, "-i").unwrap_or_default();
            return match self.stage(&file) {
                Some(cert) => self.add(&db, &name, Some(cert)),
                None => fail(255, "unable to read certificate file"),
            };
        }
        if args.iter().any(|a| a == "-D") {
            return self.remove_where(&db, |e| e.name == name);
        }
        fail(1, "unknown certutil invocation")
    }

    fn security(&self, args: &[String]) -> ToolOutput {
        let keychain = args.last().cloned().unwrap_or_default();
        match args.first().map(String::as_str) {
            Some("find-certificate") => {
                let needle = value_after(args, "-c").unwrap_or_default();
                let mut found = self.search(&keychain, &needle);
                if !args.iter().any(|a| a == "-a") {
                    found.truncate(1);
                }
                if found.is_empty() {
                    return fail(
                        44,
                        "security: SecKeychainSearchCopyNext: The specified item could not be found in the keychain.",
                    );
                }
                let with_hash = args.iter().any(|a| a == "-Z");
                let with_pem = args.iter().any(|a| a == "-p");
                let mut out = String::new();
                for entry in &found {
                    if with_hash {
                        out.push_str(&format!("SHA-256 hash: {:0>64}\n", entry.id));
                        out.push_str(&format!("SHA-1 hash: {}\n", entry.id));
                    }
                    match (&entry.cert, with_pem) {
                        (Some(cert), true) => out.push_str(&cert.pem_encoded()),
                        _ => out.push_str(&format!(
                            "keychain: \"{keychain}\"\n    \"labl\"<blob>=\"{}\"\n",
                            entry.name
                        )),
                    }
                }
                ToolOutput {
                    code: Some(0),
                    output: out.into_bytes(),
                }
            }
            Some("add-trusted-cert") => {
                let keychain = value_after(args, "-k").unwrap_or_default();
                let file = args.last().cloned().unwrap_or_default();
                match self.stage(&file) {
                    Some(cert) => {
                        let cn = cert.common_name().to_string();
                        self.add(&keychain, &cn, Some(cert))
                    }
                    None => fail(1, "unable to read certificate"),
                }
            }
            Some("delete-certificate") => {
                if let Some(hash) = value_after(args, "-Z") {
                    self.remove_where(&keychain, |e| e.id == hash)
                } else {
                    let needle = value_after(args, "-c").unwrap_or_default();
                    self.remove_where(&keychain, |e| e.name.contains(&needle))
                }
            }
            Some("verify-cert") => {
                let file = value_after(args, "-c").unwrap_or_default();
                match self.stage(&file) {
                    Some(cert) => status(!self.stores_with(cert.common_name()).is_empty()),
                    None => fail(1, "unable to read certificate"),
                }
            }
            _ => fail(1, "unknown security invocation"),
        }
    }

    fn helper(&self, args: &[String]) -> ToolOutput {
        match args {
            [op, store, arg] if op == "find" => status(self.has(store, arg)),
            [op, store, arg] if op == "add" => match self.stage(arg) {
                Some(cert) => {
                    let cn = cert.common_name().to_string();
                    self.add(store, &cn, Some(cert))
                }
                None => fail(1, "unable to read certificate"),
            },
            [op, store, arg] if op == "delete" => self.remove_where(store, |e| &e.name == arg),
            _ => fail(2, "usage: certimporter add|find|delete STORE ARG"),
        }
    }

    fn dispatch(&self, program: &str, args: &[String]) -> ToolOutput {
        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name == "pkexec" {
            return match args.split_first() {
                Some((inner, rest)) => self.dispatch(inner, rest),
                None => fail(127, "pkexec: no command"),
            };
        }
        if name == "certutil" {
            self.certutil(args)
        } else if name == "security" {
            self.security(args)
        } else if name.starts_with("certimporter") {
            self.helper(args)
        } else if name == "mshta" || name == "osascript" || name == "powershell" {
            ok()
        } else {
            fail(127, "command not found")
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        let program = cmd.program.to_string_lossy().into_owned();
        let args: Vec<String> = cmd
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        Ok(self.dispatch(&program, &args))
    }
}

fn value_after(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn ok() -> ToolOutput {
    ToolOutput {
        code: Some(0),
        output: Vec::new(),
    }
}

fn fail(code: i32, message: &str) -> ToolOutput {
    ToolOutput {
        code: Some(code),
        output: message.as_bytes().to_vec(),
    }
}

fn status(found: bool) -> ToolOutput {
    if found {
        ok()
    } else {
        fail(1, "not found")
    }
}
