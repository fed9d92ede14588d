//! Privilege elevation for commands that modify system-wide stores.
//!
//! An empty prompt means "run as the current user". A non-empty prompt wraps
//! the command so the OS asks for elevated rights, showing the prompt where
//! the mechanism supports it. A refused or unavailable elevation shows up as
//! the wrapped command's own failure; there is no separate error kind.

use std::ffi::{OsStr, OsString};

use crate::tool::ToolCommand;

/// How commands get elevated on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Already privileged, or nothing available: run as-is.
    None,
    /// macOS: AppleScript `do shell script ... with administrator privileges`.
    Osascript,
    /// Linux/BSD: polkit's `pkexec`.
    Pkexec,
    /// Windows: PowerShell `Start-Process -Verb RunAs`.
    RunAs,
}

impl Elevation {
    /// Mechanism for the platform this was built for.
    pub fn for_current_platform() -> Self {
        if is_privileged() {
            return Elevation::None;
        }
        if cfg!(target_os = "macos") {
            Elevation::Osascript
        } else if cfg!(windows) {
            Elevation::RunAs
        } else if cfg!(unix) {
            Elevation::Pkexec
        } else {
            Elevation::None
        }
    }

    /// Wrap `program args` so it runs elevated when `prompt` is non-empty.
    pub fn command<S: AsRef<OsStr>>(self, prompt: &str, program: impl AsRef<OsStr>, args: &[S]) -> ToolCommand {
        let plain = ToolCommand::new(program).args(args);
        if prompt.is_empty() {
            return plain;
        }
        match self {
            Elevation::None => plain,
            Elevation::Pkexec => ToolCommand::new("pkexec")
                .arg(&plain.program)
                .args(&plain.args),
            Elevation::Osascript => {
                let shell = std::iter::once(&plain.program)
                    .chain(&plain.args)
                    .map(|s| sh_quote(s))
                    .collect::<Vec<_>>()
                    .join(" ");
                let script = format!(
                    "do shell script \"{}\" with prompt \"{}\" with administrator privileges",
                    applescript_escape(&shell),
                    applescript_escape(prompt)
                );
                ToolCommand::new("osascript").arg("-e").arg(script)
            }
            Elevation::RunAs => {
                let arg_list = plain
                    .args
                    .iter()
                    .map(|a| ps_quote(&format!("\"{}\"", a.to_string_lossy())))
                    .collect::<Vec<_>>()
                    .join(",");
                let mut script = format!(
                    "$p = Start-Process -FilePath {} -Verb RunAs -Wait -PassThru -WindowStyle Hidden",
                    ps_quote(&plain.program.to_string_lossy())
                );
                if !arg_list.is_empty() {
                    script.push_str(&format!(" -ArgumentList {arg_list}"));
                }
                script.push_str("; exit $p.ExitCode");
                ToolCommand::new("powershell")
                    .args(["-NoProfile", "-NonInteractive", "-Command"])
                    .arg(script)
            }
        }
    }

    /// Command builder bound to `prompt`.
    pub fn with_prompt(self, prompt: &str) -> impl Fn(&OsStr, &[OsString]) -> ToolCommand + '_ {
        move |program: &OsStr, args: &[OsString]| self.command(prompt, program, args)
    }
}

/// Command builder that elevates with the current platform's mechanism when
/// `prompt` is non-empty.
pub fn elevated_if_necessary(prompt: &str) -> impl Fn(&OsStr, &[OsString]) -> ToolCommand + '_ {
    Elevation::for_current_platform().with_prompt(prompt)
}

#[cfg(unix)]
fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_privileged() -> bool {
    false
}

fn sh_quote(s: &OsStr) -> String {
    format!("'{}'", s.to_string_lossy().replace('\'', "'\\''"))
}

fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
