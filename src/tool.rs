//! External trust-management tools: certutil, security, the Windows helper.
//!
//! Every store operation ends up here as a blocking process invocation. There
//! is no timeout; a hung tool blocks the caller.

use std::ffi::{OsStr, OsString};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// A program plus its arguments, not yet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// The program's file name, for messages.
    pub fn name(&self) -> String {
        std::path::Path::new(&self.program)
            .file_name()
            .unwrap_or(&self.program)
            .to_string_lossy()
            .into_owned()
    }

    /// Program and arguments joined by spaces, for logs.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status and combined output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// stdout followed by stderr.
    pub output: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Runs tool commands. Swapped for a fake in tests.
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Errors only when the process cannot be started;
    /// a non-zero exit is reported through [`ToolOutput::code`].
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput> {
        log::debug!("running {}", cmd.display());
        let out = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::ToolInvocation {
                command: cmd.display(),
                reason: e.to_string(),
                output: String::new(),
            })?;
        let mut output = out.stdout;
        output.extend_from_slice(&out.stderr);
        Ok(ToolOutput {
            code: out.status.code(),
            output,
        })
    }
}

/// Run `cmd`, treating anything but exit code 0 as an error that carries
/// the captured output.
pub fn run_checked(runner: &dyn CommandRunner, cmd: &ToolCommand) -> Result<ToolOutput> {
    let out = runner.run(cmd)?;
    if out.success() {
        Ok(out)
    } else {
        let reason = match out.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(Error::ToolInvocation {
            command: cmd.display(),
            reason,
            output: out.output_lossy(),
        })
    }
}

/// Run `cmd` as a yes/no check: exit code 0 means yes, any other exit means
/// no. Only a failure to start the process is an error.
pub fn exits_zero(runner: &dyn CommandRunner, cmd: &ToolCommand) -> Result<bool> {
    Ok(runner.run(cmd)?.success())
}
