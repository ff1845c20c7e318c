//! JSON envelopes exchanged with the controller.
//!
//! Requests are `{"method", "id", "params"}`; responses carry either a
//! method-specific `result` or an `error` object with `code`, `message` and
//! `name`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::RpcError;

#[derive(Serialize)]
struct RequestEnvelope<'a, P> {
    method: &'a str,
    id: u32,
    params: &'a P,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct ResultEnvelope<R> {
    result: R,
}

pub(crate) fn encode_request<P: Serialize>(
    method: &str,
    id: u32,
    params: &P,
) -> Result<Vec<u8>, RpcError> {
    serde_json::to_vec(&RequestEnvelope { method, id, params }).map_err(|err| RpcError::Encode {
        method: method.to_owned(),
        message: err.to_string(),
    })
}

/// Fails with [`RpcError::Api`] when `body` is an error envelope with a
/// non-zero code.
pub(crate) fn check_error(method: &str, body: &[u8]) -> Result<(), RpcError> {
    let envelope: ErrorEnvelope =
        serde_json::from_slice(body).map_err(|err| RpcError::MalformedResponse {
            method: method.to_owned(),
            message: err.to_string(),
        })?;
    match envelope.error {
        Some(error) if error.code != 0 => Err(RpcError::Api {
            method: method.to_owned(),
            code: error.code,
            name: error.name,
            message: error.message,
        }),
        _ => Ok(()),
    }
}

/// Returns `true` when `body` decodes as an envelope carrying an error.
pub(crate) fn carries_error(body: &[u8]) -> bool {
    serde_json::from_slice::<ErrorEnvelope>(body).is_ok_and(|envelope| envelope.error.is_some())
}

pub(crate) fn decode_result<R: DeserializeOwned>(method: &str, body: &[u8]) -> Result<R, RpcError> {
    serde_json::from_slice::<ResultEnvelope<R>>(body)
        .map(|envelope| envelope.result)
        .map_err(|err| RpcError::MalformedResponse {
            method: method.to_owned(),
            message: err.to_string(),
        })
}
