//! Error types for the iSCSI session orchestrator.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::types::{AccountId, VolumeId};

/// Ordered sub-steps of an authenticated login.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoginStep {
    /// Creating the local node record for the target and portal.
    CreateNode,
    /// Switching the node to CHAP authentication.
    SetAuthMethod,
    /// Writing the CHAP username and secret.
    SetCredentials,
    /// Logging in to the target.
    Login,
}

impl fmt::Display for LoginStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CreateNode => "create node record",
            Self::SetAuthMethod => "set CHAP auth method",
            Self::SetCredentials => "set CHAP credentials",
            Self::Login => "login",
        };
        formatter.write_str(label)
    }
}

/// Stage of a detach that can fail independently of the others.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DetachStage {
    /// Unmounting the filesystem through the mount executor.
    Unmount,
    /// Logging out of the session.
    Logout,
    /// Deleting the local node record.
    DeleteNode,
}

impl fmt::Display for DetachStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unmount => "unmount",
            Self::Logout => "logout",
            Self::DeleteNode => "delete node record",
        };
        formatter.write_str(label)
    }
}

/// One failed stage of a detach.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetachFailure {
    /// Stage that failed.
    pub stage: DetachStage,
    /// Failure description.
    pub message: String,
}

impl fmt::Display for DetachFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.stage, self.message)
    }
}

fn join_failures(failures: &[DetachFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while attaching or detaching a volume.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when no storage virtual IP is configured.
    #[error("storage virtual IP (svip) is not configured")]
    SvipUnset,
    /// Raised when the volume record carries no target IQN.
    #[error("volume {volume_id} has no iSCSI target name")]
    MissingIqn {
        /// Volume without an IQN.
        volume_id: VolumeId,
    },
    /// Raised when the iSCSI initiator tooling is absent from the host.
    #[error("iSCSI initiator tooling unavailable ({program}): {message}")]
    ToolingUnavailable {
        /// Program that was probed.
        program: String,
        /// Probe failure.
        message: String,
    },
    /// Raised when the owning account's CHAP credentials cannot be fetched.
    #[error("failed to fetch CHAP credentials for account {account_id}: {source}")]
    Account {
        /// Owning account.
        account_id: AccountId,
        /// Directory failure.
        #[source]
        source: DirectoryError,
    },
    /// Raised when a login sub-step fails.
    #[error("iSCSI login to {iqn} failed at step '{step}': {message}")]
    LoginFailed {
        /// Sub-step that failed.
        step: LoginStep,
        /// Target IQN.
        iqn: String,
        /// Command failure.
        message: String,
    },
    /// Raised when SendTargets discovery fails.
    #[error("SendTargets discovery against {portal} failed: {message}")]
    DiscoveryFailed {
        /// Portal that was queried.
        portal: String,
        /// Command failure.
        message: String,
    },
    /// Raised when discovery succeeds but does not list the target.
    #[error("target {iqn} not advertised by {portal}")]
    TargetNotFound {
        /// Portal that was queried.
        portal: String,
        /// Target IQN.
        iqn: String,
    },
    /// Raised when a discovery line does not match `portal,tag iqn`.
    #[error("malformed discovery line '{line}': {reason}")]
    MalformedDiscovery {
        /// Offending line.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// Raised when the device path never appears after login.
    #[error("device path {path} did not appear after {attempts} checks")]
    AttachTimeout {
        /// Path that was polled.
        path: Utf8PathBuf,
        /// Number of checks performed.
        attempts: u32,
    },
    /// Raised when the device path cannot be resolved to a block device.
    #[error("cannot resolve device for {path}: {message}")]
    DeviceResolution {
        /// Path that was resolved.
        path: Utf8PathBuf,
        /// Failure description.
        message: String,
    },
    /// Raised when one or more detach stages fail. Every stage is attempted.
    #[error("detach of {iqn} incomplete: {}", join_failures(.failures))]
    DetachIncomplete {
        /// Target IQN.
        iqn: String,
        /// Every stage that failed, in execution order.
        failures: Vec<DetachFailure>,
    },
}

impl SessionError {
    /// Returns `true` when the caller may retry after inspecting host state.
    ///
    /// Configuration problems and missing tooling need operator action and
    /// are never retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LoginFailed { .. }
                | Self::DiscoveryFailed { .. }
                | Self::TargetNotFound { .. }
                | Self::AttachTimeout { .. }
                | Self::DetachIncomplete { .. }
        )
    }
}
