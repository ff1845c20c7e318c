//! Error types for the account and volume directories.

use thiserror::Error;

use crate::rpc::RpcError;
use crate::types::{AccountId, VolumeId};

/// Errors raised by directory lookups and mutations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DirectoryError {
    /// Wrapper for controller call failures.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Raised when no active volume carries the requested name.
    #[error("no active volume named {name} for account {account_id}")]
    VolumeNotFound {
        /// Requested volume name.
        name: String,
        /// Account that was searched.
        account_id: AccountId,
    },
    /// Raised when more than one active volume carries the requested name.
    /// The directory is the uniqueness authority, so this is a data
    /// integrity problem rather than a transient failure.
    #[error("{count} active volumes named {name} for account {account_id}")]
    Ambiguous {
        /// Requested volume name.
        name: String,
        /// Account that was searched.
        account_id: AccountId,
        /// Number of matching volumes.
        count: usize,
    },
    /// Raised when an identifier does not resolve to an active volume.
    #[error("volume {volume_id} not found")]
    VolumeMissing {
        /// Requested volume identifier.
        volume_id: VolumeId,
    },
    /// Raised when the controller has no account with the given username.
    #[error("account {username} not found")]
    AccountNotFound {
        /// Requested username.
        username: String,
    },
    /// Raised when a request is missing a required field.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl DirectoryError {
    /// Returns `true` for the not-found outcomes.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::VolumeNotFound { .. } | Self::VolumeMissing { .. } | Self::AccountNotFound { .. }
        )
    }
}
