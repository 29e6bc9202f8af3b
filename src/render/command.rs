//! Directive command execution.
//!
//! A `#|` line hands its text to a [`CommandRunner`]. The production runner,
//! [`ShellRunner`], passes it to a host shell unmodified: pipes, redirection
//! and anything else the shell offers are available to whoever writes the
//! page, and so are their side effects. Tests swap in a recording runner.

use super::error::MacroError;
use crate::log;
use std::{
    ffi::OsString,
    path::Path,
    process::{Command, Stdio},
};

/// Runs one directive and returns its standard output.
pub trait CommandRunner: Send + Sync {
    /// Run `command` with `dir` as working directory.
    ///
    /// # Errors
    /// Returns [`MacroError`] if the command cannot be started or exits
    /// unsuccessfully.
    fn run(&self, command: &str, dir: &Path) -> Result<String, MacroError>;
}

/// Runs directives through a host shell (`bash -c <command>` by default).
///
/// Stdin and stderr are inherited from the server process so diagnostics
/// land in the terminal; stdout is captured. No timeout: a directive that
/// never exits blocks the render of its page.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: Vec<OsString>,
}

impl ShellRunner {
    /// Create a runner from the shell program and its leading arguments.
    pub fn new<S: Into<OsString>>(shell: impl IntoIterator<Item = S>) -> Self {
        Self {
            shell: shell.into_iter().map(Into::into).collect(),
        }
    }

    /// Prepare a Command for `command` running in `dir`.
    fn prepare(&self, command: &str, dir: &Path) -> Option<Command> {
        let (program, args) = self.shell.split_first()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(command)
            .current_dir(dir)
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .stdout(Stdio::piped());
        Some(cmd)
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(["bash", "-c"])
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, dir: &Path) -> Result<String, MacroError> {
        let Some(mut cmd) = self.prepare(command, dir) else {
            return Err(MacroError::Spawn {
                command: command.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty shell"),
            });
        };

        log!("macro"; "{command}");

        let output = cmd.output().map_err(|source| MacroError::Spawn {
            command: command.to_owned(),
            source,
        })?;

        if !output.status.success() {
            return Err(MacroError::Exit {
                command: command.to_owned(),
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
