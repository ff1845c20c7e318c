//! Error types for the controller RPC transport.

use thiserror::Error;

/// Errors raised while issuing a controller call.
///
/// API-level rejections ([`RpcError::Api`]) are kept distinct from transport
/// failures so callers can classify them by code or name.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RpcError {
    /// Raised before any I/O when no controller endpoint is configured.
    #[error("controller endpoint is not set; unable to issue requests")]
    EndpointUnset,
    /// Raised when the controller answers with a non-zero error code.
    #[error("controller rejected {method} with {name} (code {code}): {message}")]
    Api {
        /// Remote method that was called.
        method: String,
        /// Numeric error code reported by the controller.
        code: i64,
        /// Symbolic error name (for example `xVolumeIDDoesNotExist`).
        name: String,
        /// Human-readable message reported by the controller.
        message: String,
    },
    /// Raised when the request never produced a usable HTTP response.
    #[error("transport failure calling {method}: {message}")]
    Transport {
        /// Remote method that was called.
        method: String,
        /// Description of the failure.
        message: String,
    },
    /// Raised when the response body cannot be decoded.
    #[error("malformed response to {method}: {message}")]
    MalformedResponse {
        /// Remote method that was called.
        method: String,
        /// Decoder error.
        message: String,
    },
    /// Raised when the request parameters cannot be encoded.
    #[error("failed to encode {method} request: {message}")]
    Encode {
        /// Remote method that was called.
        method: String,
        /// Encoder error.
        message: String,
    },
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl RpcError {
    /// Returns the controller error name for API-level failures.
    #[must_use]
    pub fn api_name(&self) -> Option<&str> {
        match self {
            Self::Api { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Returns `true` when the controller rejected the call with one of
    /// `names`.
    #[must_use]
    pub fn is_api_error_named(&self, names: &[&str]) -> bool {
        self.api_name()
            .is_some_and(|name| names.iter().any(|candidate| *candidate == name))
    }
}
