//! Controller RPC transport.
//!
//! [`RpcClient`] wraps a [`Transport`] with the request envelope, a random
//! request id and API-error classification. The transport is the seam tests
//! replace; [`HttpTransport`] is the production implementation.

use std::future::Future;
use std::pin::Pin;

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

mod envelope;
mod error;
mod http;

pub use error::RpcError;
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpTransport, TransportSettings};

/// Future returned by transport operations.
pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RpcError>> + Send + 'a>>;

/// Delivers an encoded request body to the controller and returns the raw
/// response body.
pub trait Transport {
    /// Posts `body` for `method`, returning the undecoded response.
    fn post<'a>(&'a self, method: &'a str, body: Vec<u8>) -> RpcFuture<'a, Vec<u8>>;
}

impl<T: Transport + ?Sized + Sync> Transport for std::sync::Arc<T> {
    fn post<'a>(&'a self, method: &'a str, body: Vec<u8>) -> RpcFuture<'a, Vec<u8>> {
        (**self).post(method, body)
    }
}

/// Issues named controller calls over a [`Transport`].
#[derive(Clone, Debug)]
pub struct RpcClient<T> {
    transport: T,
}

impl<T: Transport> RpcClient<T> {
    /// Wraps `transport`.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Issues `method` with `params` and returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Api`] when the controller answers with a non-zero
    /// error code, or the transport's error when the call fails outright.
    pub async fn request<P>(&self, method: &str, params: &P) -> Result<Vec<u8>, RpcError>
    where
        P: Serialize + Sync,
    {
        let id = next_request_id();
        let body = envelope::encode_request(method, id, params)?;
        debug!(method, id, "issuing controller request");
        let response = self.transport.post(method, body).await?;
        envelope::check_error(method, &response)?;
        Ok(response)
    }

    /// Issues `method` and decodes the `result` member of the response.
    ///
    /// # Errors
    ///
    /// Returns any error from [`RpcClient::request`], or
    /// [`RpcError::MalformedResponse`] when the result does not match `R`.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let body = self.request(method, params).await?;
        envelope::decode_result(method, &body)
    }
}

/// Small random id used only to correlate log lines.
fn next_request_id() -> u32 {
    rand::thread_rng().gen_range(1..1000)
}
