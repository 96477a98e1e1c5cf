//! REST implementation of [`PushApi`].
//!
//! `RestPushClient` wraps a `reqwest::Client` and translates every trait
//! method into the corresponding HTTP call against the Pushwire API, with
//! automatic retry + exponential back-off on transient (5xx / timeout)
//! failures.  Authentication failures (401/403) are never retried.

use std::time::Duration;

use async_trait::async_trait;
use pw_protocol::{Device, NewPush, PushRecord, DEFAULT_API_BASE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::api::PushApi;
use crate::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST client for the Pushwire HTTP API.
///
/// Created once and reused for the lifetime of the process.  The underlying
/// `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestPushClient {
    http: Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl RestPushClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_API_BASE)
    }

    /// Build a client against a non-default API endpoint (tests, proxies).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("API key must not be empty".into()));
        }

        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Override the transient-failure retry budget.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    // ── request helpers ──────────────────────────────────────────────

    /// Decorate a `RequestBuilder` with the standard auth header.
    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("Access-Token", &self.api_key)
    }

    /// Build the full URL for a path like `/pushes`.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient
    /// errors.
    ///
    /// * Retries on 5xx status codes and on timeouts / connect failures.
    /// * Does **not** retry on 4xx; 401/403 become [`Error::InvalidKey`].
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let rb = self.decorate(build_request());
            match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_server_error() {
                        // 5xx — transient, retry
                        let body = resp.text().await.unwrap_or_default();
                        tracing::warn!(endpoint, status = status.as_u16(), "server error, retrying");
                        last_err = Some(Error::Api {
                            status: status.as_u16(),
                            message: format!("{endpoint}: {body}"),
                        });
                        continue;
                    }

                    if status.is_client_error() {
                        // 4xx — permanent, do NOT retry
                        let body = resp.text().await.unwrap_or_default();
                        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                            return Err(Error::InvalidKey(format!(
                                "{endpoint} rejected the key ({status}): {body}"
                            )));
                        }
                        return Err(Error::Api {
                            status: status.as_u16(),
                            message: format!("{endpoint}: {body}"),
                        });
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    tracing::warn!(endpoint, error = %e, attempt, "request failed, retrying");
                    last_err = Some(from_reqwest(e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Http(format!("{endpoint}: all retries exhausted"))))
    }

    async fn parse_json<T: DeserializeOwned>(&self, endpoint: &str, resp: Response) -> Result<T> {
        let body = resp.text().await.map_err(from_reqwest)?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Http(format!("failed to parse {endpoint} response: {e}: {body}")))
    }

    async fn create_push(&self, push: &NewPush) -> Result<PushRecord> {
        let url = self.url("/pushes");
        let resp = self
            .execute_with_retry("POST /pushes", || self.http.post(&url).json(push))
            .await?;
        self.parse_json("POST /pushes", resp).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct PushesEnvelope {
    #[serde(default)]
    pushes: Vec<PushRecord>,
}

#[derive(Debug, Deserialize)]
struct DevicesEnvelope {
    #[serde(default)]
    devices: Vec<Device>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl PushApi for RestPushClient {
    async fn verify_key(&self) -> Result<f64> {
        // A limit-1 pushes fetch both proves the key is valid and yields
        // the newest modified timestamp for watermark seeding.
        let url = self.url("/pushes");
        let resp = self
            .execute_with_retry("GET /pushes?limit=1", || {
                self.http
                    .get(&url)
                    .query(&[("limit", "1"), ("active", "false")])
            })
            .await?;

        let envelope: PushesEnvelope = self.parse_json("GET /pushes?limit=1", resp).await?;
        Ok(envelope
            .pushes
            .first()
            .map(|p| p.modified)
            .unwrap_or(0.0))
    }

    async fn pushes_modified_after(&self, modified_after: f64) -> Result<Vec<PushRecord>> {
        let url = self.url("/pushes");
        let resp = self
            .execute_with_retry("GET /pushes", || {
                self.http.get(&url).query(&[
                    ("modified_after", modified_after.to_string()),
                    ("active", "true".to_string()),
                ])
            })
            .await?;

        let envelope: PushesEnvelope = self.parse_json("GET /pushes", resp).await?;
        Ok(envelope.pushes)
    }

    async fn push_note(
        &self,
        title: &str,
        body: &str,
        device_iden: Option<&str>,
    ) -> Result<PushRecord> {
        let mut push = NewPush::note(title, body);
        if let Some(iden) = device_iden {
            push = push.to_device(iden);
        }
        self.create_push(&push).await
    }

    async fn push_link(
        &self,
        title: &str,
        body: &str,
        url: &str,
        device_iden: Option<&str>,
    ) -> Result<PushRecord> {
        let mut push = NewPush::link(title, body, url);
        if let Some(iden) = device_iden {
            push = push.to_device(iden);
        }
        self.create_push(&push).await
    }

    async fn devices(&self) -> Result<Vec<Device>> {
        let url = self.url("/devices");
        let resp = self
            .execute_with_retry("GET /devices", || self.http.get(&url))
            .await?;

        let envelope: DevicesEnvelope = self.parse_json("GET /devices", resp).await?;
        Ok(envelope.devices.into_iter().filter(|d| d.active).collect())
    }

    async fn create_device(&self, nickname: &str) -> Result<Device> {
        let url = self.url("/devices");
        let body = serde_json::json!({ "nickname": nickname });
        let resp = self
            .execute_with_retry("POST /devices", || self.http.post(&url).json(&body))
            .await?;
        self.parse_json("POST /devices", resp).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a `reqwest::Error` into a domain [`Error`].
///
/// Timeout errors become `Error::Timeout`; everything else becomes
/// `Error::Http`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
