//! HTTPS transport backed by `reqwest`.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::{RpcError, RpcFuture, Transport, envelope};

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings used to build an [`HttpTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportSettings {
    /// Controller JSON-RPC endpoint URL. `None` makes every call fail with
    /// [`RpcError::EndpointUnset`].
    pub endpoint: Option<String>,
    /// Accept any server certificate. Off unless explicitly requested.
    pub insecure_skip_tls_verify: bool,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
}

impl TransportSettings {
    /// Creates verified-TLS settings for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint: endpoint
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            insecure_skip_tls_verify: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Opts in to (or out of) skipping certificate verification.
    #[must_use]
    pub const fn insecure_skip_tls_verify(mut self, value: bool) -> Self {
        self.insecure_skip_tls_verify = value;
        self
    }

    /// Overrides the per-request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }
}

/// Issues one HTTPS POST per call. No retries.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpTransport {
    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Client`] when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(settings: &TransportSettings) -> Result<Self, RpcError> {
        if settings.insecure_skip_tls_verify {
            warn!("TLS certificate verification is disabled for the controller endpoint");
        }
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(settings.insecure_skip_tls_verify)
            .build()
            .map_err(|err| RpcError::Client(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }

    /// Returns the configured endpoint, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl Transport for HttpTransport {
    fn post<'a>(&'a self, method: &'a str, body: Vec<u8>) -> RpcFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let Some(endpoint) = self.endpoint.as_deref() else {
                return Err(RpcError::EndpointUnset);
            };

            let transport_error = |message: String| RpcError::Transport {
                method: method.to_owned(),
                message,
            };

            let response = self
                .client
                .post(endpoint)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(|err| transport_error(err.to_string()))?;

            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|err| transport_error(err.to_string()))?;
            debug!(method, %status, len = bytes.len(), "controller responded");

            if !status.is_success() && !envelope::carries_error(&bytes) {
                let text = String::from_utf8_lossy(&bytes);
                return Err(transport_error(format!("HTTP {status}: {}", text.trim())));
            }
            Ok(bytes.to_vec())
        })
    }
}
