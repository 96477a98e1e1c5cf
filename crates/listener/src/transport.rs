//! Websocket transport for the realtime stream.
//!
//! [`StreamTransport`] owns the socket and hides its lifecycle: callers
//! just pull frames, and the transport re-dials across remote closes,
//! read errors, and idle timeouts.  Only terminal conditions surface as
//! errors (invalid key, retry exhaustion, shutdown).

use std::time::Duration;

use futures_util::StreamExt;
use pw_client::{Error, Result};
use pw_protocol::StreamFrame;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectBackoff;

/// Default time without any inbound frame before the socket is presumed
/// dead.  The server heartbeats roughly every 30s, so three missed
/// heartbeats plus slack.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(95);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum ReadEvent {
    Incoming(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
    IdleTimeout,
    Cancelled,
}

/// A self-healing connection to the realtime stream endpoint.
pub struct StreamTransport {
    url: String,
    backoff: ReconnectBackoff,
    idle_timeout: Duration,
    cancel: CancellationToken,
    socket: Option<WsStream>,
    /// Whether the current socket has delivered at least one frame.
    received_frame: bool,
    /// Consecutive connection failures.  Reset when a frame arrives, not
    /// merely on a completed handshake: a dial that succeeds but dies
    /// frameless still counts against the budget.
    failures: u32,
}

impl StreamTransport {
    /// Dial the stream endpoint.  An auth rejection during the websocket
    /// upgrade is fatal and is never retried; any other dial failure is
    /// surfaced so the caller can decide whether the initial connect
    /// should fail fast.
    pub async fn connect(
        url: impl Into<String>,
        backoff: ReconnectBackoff,
        idle_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let url = url.into();
        let socket = dial(&url).await?;
        tracing::info!("stream connected");

        Ok(Self {
            url,
            backoff,
            idle_timeout,
            cancel,
            socket: Some(socket),
            received_frame: false,
            failures: 0,
        })
    }

    /// Pull the next parsed frame, reconnecting transparently.
    ///
    /// Returns an error only for terminal conditions:
    /// [`Error::InvalidKey`] when a re-dial is rejected,
    /// [`Error::ReconnectExhausted`] when the failure budget runs out, and
    /// [`Error::Shutdown`] when the cancellation token fires.
    pub async fn next_frame(&mut self) -> Result<StreamFrame> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Shutdown);
            }

            // The socket borrow must end before this state machine can
            // drop or replace it, hence the event indirection.
            let event = {
                let Some(socket) = self.socket.as_mut() else {
                    self.redial().await?;
                    continue;
                };
                tokio::select! {
                    m = socket.next() => ReadEvent::Incoming(m),
                    _ = tokio::time::sleep(self.idle_timeout) => ReadEvent::IdleTimeout,
                    _ = self.cancel.cancelled() => ReadEvent::Cancelled,
                }
            };

            let msg = match event {
                ReadEvent::Incoming(msg) => msg,
                ReadEvent::IdleTimeout => {
                    tracing::warn!(
                        idle_secs = self.idle_timeout.as_secs(),
                        "no frame within idle timeout, presuming connection dead"
                    );
                    self.drop_dead_socket().await;
                    continue;
                }
                ReadEvent::Cancelled => {
                    self.drop_socket().await;
                    return Err(Error::Shutdown);
                }
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    // Inbound traffic proves the connection works.
                    self.received_frame = true;
                    self.failures = 0;
                    match serde_json::from_str::<StreamFrame>(&text) {
                        Ok(frame) => return Ok(frame),
                        Err(e) => {
                            // A single garbled frame is not worth a
                            // reconnect cycle.
                            tracing::debug!(error = %e, raw = %text, "unparseable frame, skipping");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("server closed the stream");
                    self.drop_dead_socket().await;
                }
                Some(Ok(_)) => {
                    // Ping/pong are handled by the protocol layer; binary
                    // frames are not part of the stream contract.
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "stream read error");
                    self.drop_dead_socket().await;
                }
            }
        }
    }

    /// Send a best-effort Close and drop the socket.
    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
    }

    async fn drop_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
    }

    /// Drop a socket that died on us.  A connection that never produced
    /// a frame spends one unit of the failure budget; otherwise an
    /// accept-then-drop server would induce a zero-delay redial loop.
    async fn drop_dead_socket(&mut self) {
        if !self.received_frame {
            self.failures += 1;
        }
        self.drop_socket().await;
    }

    /// Re-dial loop: immediate first attempt, then jittered exponential
    /// back-off per [`ReconnectBackoff`].
    async fn redial(&mut self) -> Result<()> {
        loop {
            if self.backoff.should_give_up(self.failures) {
                tracing::error!(failures = self.failures, "reconnect budget exhausted");
                return Err(Error::ReconnectExhausted(self.failures));
            }

            let delay = self.backoff.delay_after(self.failures);
            if !delay.is_zero() {
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    failures = self.failures,
                    "reconnecting after delay"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => return Err(Error::Shutdown),
                }
            }

            let dialed = tokio::select! {
                d = dial(&self.url) => d,
                _ = self.cancel.cancelled() => return Err(Error::Shutdown),
            };

            match dialed {
                Ok(socket) => {
                    tracing::info!("stream reconnected");
                    self.socket = Some(socket);
                    self.received_frame = false;
                    return Ok(());
                }
                // Auth rejections never heal on retry.
                Err(e @ Error::InvalidKey(_)) => return Err(e),
                Err(e) => {
                    self.failures += 1;
                    tracing::warn!(error = %e, failures = self.failures, "re-dial failed");
                }
            }
        }
    }
}

/// One dial attempt, mapping websocket upgrade rejections onto the domain
/// error type.
async fn dial(url: &str) -> Result<WsStream> {
    match tokio_tungstenite::connect_async(url).await {
        Ok((socket, _response)) => Ok(socket),
        Err(tokio_tungstenite::tungstenite::Error::Http(response))
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            Err(Error::InvalidKey(format!(
                "stream endpoint rejected the key ({})",
                response.status()
            )))
        }
        Err(e) => Err(Error::WebSocket(e.to_string())),
    }
}
