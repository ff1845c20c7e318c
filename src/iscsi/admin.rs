//! Thin wrapper over the `iscsiadm` command line.

use std::ffi::OsString;

use tracing::{debug, trace, warn};

use crate::command::{CommandOutput, CommandRunner, render_command};
use crate::types::IscsiTarget;

use super::{LoginStep, SessionError};

/// Default name of the initiator administration tool.
pub const DEFAULT_ISCSIADM: &str = "iscsiadm";

/// `iscsiadm` exit status for "no records or sessions found".
pub const ISCSI_ERR_NO_OBJS_FOUND: i32 = 21;

const REDACTED: &str = "--value=<redacted>";

/// Issues initiator commands through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct IscsiAdmin<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> IscsiAdmin<R> {
    /// Creates a wrapper running `program` through `runner`.
    #[must_use]
    pub fn new(runner: R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Returns the program name this wrapper invokes.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Verifies the tooling is installed and runnable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ToolingUnavailable`] when `iscsiadm -h` cannot
    /// be run or fails.
    pub fn probe(&self) -> Result<(), SessionError> {
        let unavailable = |message: String| SessionError::ToolingUnavailable {
            program: self.program.clone(),
            message,
        };
        let output = self
            .execute(&["-h"], false)
            .map_err(unavailable)?;
        if output.is_success() {
            return Ok(());
        }
        Err(unavailable(output.failure_message()))
    }

    /// Runs SendTargets discovery against `portal` and returns the raw
    /// listing. An empty listing is not an error here.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DiscoveryFailed`] when the command fails.
    pub fn discover(&self, portal: &str) -> Result<String, SessionError> {
        let failed = |message: String| SessionError::DiscoveryFailed {
            portal: portal.to_owned(),
            message,
        };
        let output = self
            .execute(&["-m", "discovery", "-t", "sendtargets", "-p", portal], false)
            .map_err(failed)?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        if output.code == Some(ISCSI_ERR_NO_OBJS_FOUND) {
            return Ok(String::new());
        }
        Err(failed(output.failure_message()))
    }

    /// Creates a node record for `target`, configures CHAP and logs in.
    ///
    /// Stops at the first failing sub-step. The node record is then deleted
    /// on a best-effort basis so a retry starts clean.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LoginFailed`] naming the failing sub-step.
    pub fn login_with_chap(
        &self,
        target: &IscsiTarget,
        iface: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), SessionError> {
        let result = self.chap_sequence(target, iface, username, secret);
        if let Err(SessionError::LoginFailed { step, .. }) = &result
            && *step != LoginStep::CreateNode
            && let Err(cleanup) = self.delete_node(target)
        {
            warn!(iqn = %target.iqn, error = %cleanup, "failed to remove node record after login failure");
        }
        result
    }

    fn chap_sequence(
        &self,
        target: &IscsiTarget,
        iface: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), SessionError> {
        let node = ["-m", "node", "-T", target.iqn.as_str(), "-p", target.portal.as_str()];
        let run_step = |step: LoginStep, extra: &[&str], sensitive: bool| {
            let args: Vec<&str> = node.iter().chain(extra).copied().collect();
            let output = self
                .execute(&args, sensitive)
                .map_err(|message| login_failed(step, target, message))?;
            if output.is_success() {
                trace!(iqn = %target.iqn, %step, "login step complete");
                return Ok(());
            }
            Err(login_failed(step, target, output.failure_message()))
        };

        run_step(
            LoginStep::CreateNode,
            &["--interface", iface, "--op", "new"],
            false,
        )?;
        run_step(
            LoginStep::SetAuthMethod,
            &[
                "--op=update",
                "--name",
                "node.session.auth.authmethod",
                "--value=CHAP",
            ],
            false,
        )?;
        let username_value = format!("--value={username}");
        run_step(
            LoginStep::SetCredentials,
            &[
                "--op=update",
                "--name",
                "node.session.auth.username",
                username_value.as_str(),
            ],
            false,
        )?;
        let secret_value = format!("--value={secret}");
        run_step(
            LoginStep::SetCredentials,
            &[
                "--op=update",
                "--name",
                "node.session.auth.password",
                secret_value.as_str(),
            ],
            true,
        )?;
        run_step(LoginStep::Login, &["--login"], false)?;
        debug!(iqn = %target.iqn, portal = %target.portal, "logged in to target");
        Ok(())
    }

    /// Logs out of every session for `iqn`, or only the one through
    /// `portal` when given. No matching session counts as success.
    ///
    /// # Errors
    ///
    /// Returns the failure description when the logout fails.
    pub fn logout(&self, iqn: &str, portal: Option<&str>) -> Result<(), String> {
        let mut args = vec!["-m", "node", "-T", iqn];
        if let Some(address) = portal {
            args.extend(["--portal", address]);
        }
        args.push("-u");
        self.run_idempotent(&args)
    }

    /// Deletes every node record for `target`'s IQN. No record counts as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns the failure description when the deletion fails.
    pub fn delete_node(&self, target: &IscsiTarget) -> Result<(), String> {
        self.run_idempotent(&["-m", "node", "-o", "delete", "-T", target.iqn.as_str()])
    }

    fn run_idempotent(&self, args: &[&str]) -> Result<(), String> {
        let output = self.execute(args, false)?;
        if output.is_success() || output.code == Some(ISCSI_ERR_NO_OBJS_FOUND) {
            return Ok(());
        }
        Err(output.failure_message())
    }

    fn execute(&self, args: &[&str], sensitive: bool) -> Result<CommandOutput, String> {
        let argv: Vec<OsString> = args.iter().map(OsString::from).collect();
        if sensitive {
            let shown: Vec<OsString> = args
                .iter()
                .map(|arg| {
                    if arg.starts_with("--value=") {
                        OsString::from(REDACTED)
                    } else {
                        OsString::from(arg)
                    }
                })
                .collect();
            debug!(command = %render_command(&self.program, &shown), "running iscsiadm");
        } else {
            debug!(command = %render_command(&self.program, &argv), "running iscsiadm");
        }
        self.runner
            .run(&self.program, &argv)
            .map_err(|err| err.to_string())
    }
}

fn login_failed(step: LoginStep, target: &IscsiTarget, message: String) -> SessionError {
    SessionError::LoginFailed {
        step,
        iqn: target.iqn.clone(),
        message,
    }
}
