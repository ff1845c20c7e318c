//! Shell command execution seam.
//!
//! The iSCSI initiator tooling and the mount executor both shell out through
//! [`CommandRunner`] so tests can script outcomes without spawning processes.

use std::ffi::OsString;
use std::process::Command;

use shell_escape::unix::escape;
use thiserror::Error;
use tracing::trace;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Describes a failed run using the exit status and trimmed stderr.
    #[must_use]
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        match self.code {
            Some(code) if stderr.is_empty() => format!("exited with status {code}"),
            Some(code) => format!("exited with status {code}: {stderr}"),
            None if stderr.is_empty() => String::from("terminated without an exit status"),
            None => format!("terminated without an exit status: {stderr}"),
        }
    }
}

/// Errors raised when a command cannot be run at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when the process fails to start.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error text.
        message: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        (**self).run(program, args)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| CommandError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(program, code = ?result.code, "command finished");
        Ok(result)
    }
}

/// Renders a command line for logs, escaping each argument.
#[must_use]
pub fn render_command(program: &str, args: &[OsString]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        let text = arg.to_string_lossy();
        rendered.push_str(escape(text).as_ref());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(21), "", "exited with status 21")]
    #[case(Some(1), " no records found\n", "exited with status 1: no records found")]
    #[case(None, "", "terminated without an exit status")]
    fn failure_message_includes_status_and_stderr(
        #[case] code: Option<i32>,
        #[case] stderr: &str,
        #[case] expected: &str,
    ) {
        let output = CommandOutput {
            code,
            stdout: String::new(),
            stderr: stderr.to_owned(),
        };
        assert_eq!(output.failure_message(), expected);
    }

    #[test]
    fn render_command_escapes_arguments() {
        let args = [OsString::from("-m"), OsString::from("a b")];
        assert_eq!(render_command("iscsiadm", &args), "iscsiadm -m 'a b'");
    }
}
