//! HTTP transport behaviour against a one-shot local responder.

use std::time::Duration;

use serde_json::{Value, json};
use sfvol::{HttpTransport, RpcClient, RpcError, TransportSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Accepts a single connection, answers it with `status` and `body`, and
/// yields the raw request text.
async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        socket.shutdown().await.ok();
        request
    });
    (format!("http://{addr}/json-rpc/7.0"), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut received = Vec::new();
    let mut chunk = [0_u8; 2048];
    loop {
        let read = socket.read(&mut chunk).await.expect("read request");
        if read == 0 {
            break;
        }
        received.extend_from_slice(chunk.get(..read).expect("chunk bounds"));
        if request_complete(&String::from_utf8_lossy(&received)) {
            break;
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}

fn request_complete(text: &str) -> bool {
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    body.len() >= length
}

fn request_body(raw: &str) -> Value {
    let (_, body) = raw.split_once("\r\n\r\n").expect("request has a body");
    serde_json::from_str(body).expect("request body is JSON")
}

fn client(endpoint: Option<String>) -> RpcClient<HttpTransport> {
    let settings = TransportSettings::new(endpoint).request_timeout(Duration::from_secs(5));
    RpcClient::new(HttpTransport::new(&settings).expect("client builds"))
}

#[tokio::test]
async fn call_posts_an_envelope_and_decodes_the_result() {
    let (endpoint, server) = serve_once(
        "200 OK",
        json!({"id": 1, "result": {"volumeID": 42}}).to_string(),
    )
    .await;

    let result: Value = client(Some(endpoint))
        .call("CreateVolume", &json!({"name": "pgdata"}))
        .await
        .expect("call succeeds");

    assert_eq!(result, json!({"volumeID": 42}));
    let raw = server.await.expect("server task");
    assert!(raw.starts_with("POST /json-rpc/7.0 "), "request: {raw}");
    let envelope = request_body(&raw);
    assert_eq!(envelope["method"], "CreateVolume");
    assert_eq!(envelope["params"], json!({"name": "pgdata"}));
    assert!(envelope["id"].is_u64());
}

#[tokio::test]
async fn error_member_becomes_an_api_error() {
    let (endpoint, server) = serve_once(
        "200 OK",
        json!({
            "id": 1,
            "error": {"code": 500, "name": "xUnknownAccount", "message": "Unknown account"}
        })
        .to_string(),
    )
    .await;

    let err = client(Some(endpoint))
        .call::<_, Value>("GetAccountByName", &json!({"username": "docker"}))
        .await
        .expect_err("api error");

    server.await.expect("server task");
    assert_eq!(err.api_name(), Some("xUnknownAccount"));
    assert!(err.is_api_error_named(&["xUnknownAccount"]));
}

#[tokio::test]
async fn http_failure_without_envelope_is_a_transport_error() {
    let (endpoint, server) =
        serve_once("503 Service Unavailable", String::from("upstream down")).await;

    let err = client(Some(endpoint))
        .call::<_, Value>("ListActiveVolumes", &json!({}))
        .await
        .expect_err("transport error");

    server.await.expect("server task");
    assert!(
        matches!(err, RpcError::Transport { ref message, .. } if message.contains("503")),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn missing_result_is_malformed() {
    let (endpoint, server) = serve_once("200 OK", json!({"id": 1}).to_string()).await;

    let err = client(Some(endpoint))
        .call::<_, Value>("ListActiveVolumes", &json!({}))
        .await
        .expect_err("no result member");

    server.await.expect("server task");
    assert!(matches!(err, RpcError::MalformedResponse { .. }), "{err}");
}

#[tokio::test]
async fn unset_endpoint_fails_every_call() {
    let err = client(None)
        .call::<_, Value>("ListActiveVolumes", &json!({}))
        .await
        .expect_err("no endpoint");

    assert_eq!(err, RpcError::EndpointUnset);
}
