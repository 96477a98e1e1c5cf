//! The lazy listener façade.
//!
//! [`PushListener`] ties the transport and the resolver together behind
//! two consumption styles: single-shot [`next_push`](PushListener::next_push)
//! pulls and an [`async Stream`](PushListener::stream) adapter.  Both
//! share one transport, one watermark, and one pending queue, so mixing
//! them never duplicates a record.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use pw_client::{Error, PushApi, Result};
use pw_protocol::{PushRecord, DEFAULT_STREAM_URL};
use tokio_util::sync::CancellationToken;

use crate::actions::SentRegistry;
use crate::reconnect::ReconnectBackoff;
use crate::resolver::PushResolver;
use crate::transport::{StreamTransport, DEFAULT_IDLE_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Connecting,
    Streaming,
    Closed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Builder for [`PushListener`].
pub struct PushListenerBuilder {
    api: Arc<dyn PushApi>,
    api_key: String,
    stream_url: String,
    idle_timeout: Duration,
    backoff: ReconnectBackoff,
    include_dismissed: bool,
    device_iden: Option<String>,
    watermark: Option<f64>,
    suppressed: Option<Arc<SentRegistry>>,
}

impl PushListenerBuilder {
    pub fn new(api: Arc<dyn PushApi>, api_key: impl Into<String>) -> Self {
        Self {
            api,
            api_key: api_key.into(),
            stream_url: DEFAULT_STREAM_URL.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            backoff: ReconnectBackoff::default(),
            include_dismissed: false,
            device_iden: None,
            watermark: None,
            suppressed: None,
        }
    }

    /// Stream endpoint base; the API key is appended to it.
    pub fn stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = url.into();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Also deliver records the user has already dismissed.
    pub fn include_dismissed(mut self, include: bool) -> Self {
        self.include_dismissed = include;
        self
    }

    /// Only deliver broadcasts and pushes targeted at this device.
    pub fn device_iden(mut self, iden: impl Into<String>) -> Self {
        self.device_iden = Some(iden.into());
        self
    }

    /// Start from an explicit watermark instead of the connect-time seed.
    pub fn watermark(mut self, watermark: f64) -> Self {
        self.watermark = Some(watermark);
        self
    }

    /// Ignore echoes of pushes recorded in `registry`.
    pub fn suppress_sent(mut self, registry: Arc<SentRegistry>) -> Self {
        self.suppressed = Some(registry);
        self
    }

    pub fn build(self) -> PushListener {
        let mut resolver = PushResolver::new();
        resolver.include_dismissed(self.include_dismissed);
        resolver.filter_device(self.device_iden);
        if let Some(registry) = self.suppressed {
            resolver.suppress_sent(registry);
        }

        PushListener {
            api: self.api,
            stream_url: format!("{}{}", self.stream_url, self.api_key),
            idle_timeout: self.idle_timeout,
            backoff: self.backoff,
            cancel: CancellationToken::new(),
            state: State::Idle,
            transport: None,
            resolver,
            pending: VecDeque::new(),
            watermark_override: self.watermark,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Listener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PushListener {
    api: Arc<dyn PushApi>,
    stream_url: String,
    idle_timeout: Duration,
    backoff: ReconnectBackoff,
    cancel: CancellationToken,
    state: State,
    transport: Option<StreamTransport>,
    resolver: PushResolver,
    pending: VecDeque<PushRecord>,
    watermark_override: Option<f64>,
}

impl PushListener {
    pub fn builder(api: Arc<dyn PushApi>, api_key: impl Into<String>) -> PushListenerBuilder {
        PushListenerBuilder::new(api, api_key)
    }

    /// Token that aborts in-flight reads and back-off sleeps when
    /// cancelled.  Clone it to wire up external shutdown signals.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Verify the key, seed the watermark, and dial the stream.
    ///
    /// Called implicitly by the first [`next_push`](Self::next_push);
    /// call it directly to fail fast on bad credentials.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == State::Streaming {
            return Ok(());
        }
        if self.state == State::Closed {
            return Err(Error::Shutdown);
        }
        self.state = State::Connecting;

        // The key check doubles as the watermark source: only pushes
        // newer than this instant will be delivered.
        let seed = match self.api.verify_key().await {
            Ok(seed) => seed,
            Err(e) => {
                self.state = State::Closed;
                return Err(e);
            }
        };
        let watermark = self.watermark_override.unwrap_or(seed);
        self.resolver.seed(watermark);
        tracing::info!(watermark, "key verified");

        let transport = match StreamTransport::connect(
            self.stream_url.clone(),
            self.backoff.clone(),
            self.idle_timeout,
            self.cancel.clone(),
        )
        .await
        {
            Ok(t) => t,
            Err(e) => {
                self.state = State::Closed;
                return Err(e);
            }
        };

        self.transport = Some(transport);
        self.state = State::Streaming;
        Ok(())
    }

    /// Pull the next deliverable push.  `Ok(None)` means the listener
    /// has been closed (or cancelled) and will never yield again.
    ///
    /// Recoverable resolver failures are logged and streaming continues;
    /// only fatal errors terminate the sequence.
    pub async fn next_push(&mut self) -> Result<Option<PushRecord>> {
        loop {
            if let Some(push) = self.pending.pop_front() {
                return Ok(Some(push));
            }
            match self.state {
                State::Closed => return Ok(None),
                State::Idle | State::Connecting => {
                    if let Err(e) = self.connect().await {
                        return match e {
                            Error::Shutdown => Ok(None),
                            other => Err(other),
                        };
                    }
                }
                State::Streaming => {}
            }
            let Some(transport) = self.transport.as_mut() else {
                continue;
            };

            // Transport errors are always terminal; transient conditions
            // are absorbed inside next_frame.
            let frame = match transport.next_frame().await {
                Ok(frame) => frame,
                Err(Error::Shutdown) => {
                    self.state = State::Closed;
                    return Ok(None);
                }
                Err(e) => {
                    self.state = State::Closed;
                    return Err(e);
                }
            };

            match self.resolver.resolve(&frame, self.api.as_ref()).await {
                Ok(batch) => self.pending.extend(batch),
                Err(e) if e.is_fatal() => {
                    self.state = State::Closed;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not resolve frame, continuing");
                }
            }
        }
    }

    /// Iterate the same cursor as [`next_push`](Self::next_push) as an
    /// async stream.  The stream ends after `Ok(None)` or a fatal error.
    pub fn stream(&mut self) -> impl Stream<Item = Result<PushRecord>> + '_ {
        async_stream::stream! {
            loop {
                match self.next_push().await {
                    Ok(Some(push)) => yield Ok(push),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Current resolver watermark, for observability.
    pub fn watermark(&self) -> f64 {
        self.resolver.watermark()
    }

    /// Cancel in-flight work and drop the connection.  Terminal: a new
    /// listener is required to stream again.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.state = State::Closed;
    }
}
