//! Integration test: boots an in-process HTTP/1.1 stub that plays the
//! Pushwire API side, connects a real [`RestPushClient`], and asserts the
//! request/retry/error behavior of the client:
//!
//! - `verify_key` parses the newest `modified` timestamp from the envelope
//! - 401 surfaces as `Error::InvalidKey` without a retry
//! - a 500 followed by a 200 succeeds on the retry
//! - `pushes_modified_after` forwards the watermark as a query parameter
//! - the `Access-Token` header is sent on every request

use std::net::SocketAddr;
use std::sync::Arc;

use pw_client::{Error, PushApi, RestPushClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

// ── Mini API: in-process HTTP stub ──────────────────────────────────────

/// The request line + headers + body of one captured HTTP request.
#[derive(Debug, Clone)]
struct CapturedRequest {
    request_line: String,
    raw: String,
}

impl CapturedRequest {
    fn has_header(&self, name: &str, value: &str) -> bool {
        let needle = format!("{name}: {value}");
        self.raw.lines().any(|l| l.eq_ignore_ascii_case(&needle))
    }
}

/// Boots a one-connection-at-a-time HTTP stub on an ephemeral port.  Each
/// accepted request pops the next scripted `(status, body)` response and
/// forwards the captured request to the test.  Responses use
/// `Connection: close` so the client opens a fresh connection per request.
async fn start_mini_api(
    responses: Vec<(u16, &'static str)>,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let script = Arc::new(Mutex::new(responses.into_iter()));

    tokio::spawn(async move {
        while let Ok((mut stream, _peer)) = listener.accept().await {
            let req_tx = req_tx.clone();
            let script = script.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut read = 0usize;

                // Read until the end of headers; then keep reading until
                // Content-Length bytes of body have arrived.
                loop {
                    let n = match stream.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    read += n;
                    let raw = String::from_utf8_lossy(&buf[..read]);
                    if let Some(header_end) = raw.find("\r\n\r\n") {
                        let content_length = raw
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length: ")
                                    .and_then(|v| v.parse::<usize>().ok())
                            })
                            .unwrap_or(0);
                        if read >= header_end + 4 + content_length {
                            break;
                        }
                    }
                }

                let raw = String::from_utf8_lossy(&buf[..read]).into_owned();
                let request_line = raw.lines().next().unwrap_or_default().to_owned();
                let _ = req_tx.send(CapturedRequest { request_line, raw });

                let (status, body) = script
                    .lock()
                    .await
                    .next()
                    .unwrap_or((500, r#"{"error":"script exhausted"}"#));
                let reason = match status {
                    200 => "OK",
                    401 => "Unauthorized",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, req_rx)
}

fn client_for(addr: SocketAddr) -> RestPushClient {
    RestPushClient::with_base_url("test-key", format!("http://{addr}/v2")).unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn verify_key_returns_newest_modified() {
    let (addr, mut reqs) = start_mini_api(vec![(
        200,
        r#"{"pushes":[{"iden":"p9","type":"note","title":"last","modified":142.25}]}"#,
    )])
    .await;

    let watermark = client_for(addr).verify_key().await.unwrap();
    assert_eq!(watermark, 142.25);

    let req = reqs.recv().await.unwrap();
    assert!(req.request_line.starts_with("GET /v2/pushes?"));
    assert!(req.request_line.contains("limit=1"));
    assert!(req.has_header("Access-Token", "test-key"));
}

#[tokio::test]
async fn verify_key_on_empty_account_returns_zero() {
    let (addr, _reqs) = start_mini_api(vec![(200, r#"{"pushes":[]}"#)]).await;

    let watermark = client_for(addr).verify_key().await.unwrap();
    assert_eq!(watermark, 0.0);
}

#[tokio::test]
async fn unauthorized_is_invalid_key_and_not_retried() {
    let (addr, mut reqs) = start_mini_api(vec![(401, r#"{"error":"bad key"}"#)]).await;

    let err = client_for(addr).verify_key().await.unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)), "got: {err:?}");

    // Exactly one request; a 401 must not be retried.
    reqs.recv().await.unwrap();
    assert!(reqs.try_recv().is_err());
}

#[tokio::test]
async fn server_error_is_retried_then_succeeds() {
    let (addr, mut reqs) = start_mini_api(vec![
        (500, r#"{"error":"flaky"}"#),
        (
            200,
            r#"{"pushes":[{"iden":"p1","type":"note","title":"T","body":"B","modified":100.0}]}"#,
        ),
    ])
    .await;

    let pushes = client_for(addr).pushes_modified_after(50.0).await.unwrap();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].iden, "p1");

    // Two requests total, both carrying the watermark.
    for _ in 0..2 {
        let req = reqs.recv().await.unwrap();
        assert!(req.request_line.contains("modified_after=50"));
        assert!(req.request_line.contains("active=true"));
    }
}

#[tokio::test]
async fn push_note_posts_and_parses_created_record() {
    let (addr, mut reqs) = start_mini_api(vec![(
        200,
        r#"{"iden":"sent-1","type":"note","title":"hi","body":"there","created":7.0,"modified":7.0,"active":true}"#,
    )])
    .await;

    let record = client_for(addr)
        .push_note("hi", "there", Some("dev-1"))
        .await
        .unwrap();
    assert_eq!(record.iden, "sent-1");

    let req = reqs.recv().await.unwrap();
    assert!(req.request_line.starts_with("POST /v2/pushes"));
    assert!(req.raw.contains(r#""device_iden":"dev-1""#));
    assert!(req.raw.contains(r#""type":"note""#));
}

#[tokio::test]
async fn find_or_create_device_registers_missing_device() {
    let (addr, mut reqs) = start_mini_api(vec![
        (
            200,
            r#"{"devices":[{"iden":"d1","nickname":"phone","active":true}]}"#,
        ),
        (
            200,
            r#"{"iden":"d2","nickname":"relay","active":true}"#,
        ),
    ])
    .await;

    let client = client_for(addr);
    let device = client.find_or_create_device("relay").await.unwrap();
    assert_eq!(device.iden, "d2");
    assert_eq!(device.nickname, "relay");

    let list = reqs.recv().await.unwrap();
    assert!(list.request_line.starts_with("GET /v2/devices"));
    let create = reqs.recv().await.unwrap();
    assert!(create.request_line.starts_with("POST /v2/devices"));
    assert!(create.raw.contains(r#""nickname":"relay""#));
}
