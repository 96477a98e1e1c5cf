//! Turns low-information stream frames into concrete push records.
//!
//! A tickle only says "something changed"; the resolver re-queries the
//! HTTP API from its watermark, filters out anything already delivered,
//! and advances the watermark so the same change is never fetched twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pw_client::{Error, PushApi, Result};
use pw_protocol::{PushRecord, StreamFrame, TickleSubject};

use crate::actions::SentRegistry;

/// Bounded retries for the tickle-triggered query.  Transient failures
/// back off briefly; the watermark stays put until a query succeeds.
const QUERY_RETRIES: u32 = 3;

pub struct PushResolver {
    /// Highest `modified` timestamp considered so far.  Monotonically
    /// non-decreasing within one session; never persisted.
    watermark: f64,
    /// Idens delivered this session.
    seen: HashSet<String>,
    include_dismissed: bool,
    /// When set, only broadcasts and pushes targeted at this device pass.
    device_iden: Option<String>,
    /// Idens of pushes this process sent itself; their echoes over the
    /// stream are not notifications.
    suppressed: Option<Arc<SentRegistry>>,
}

impl PushResolver {
    pub fn new() -> Self {
        Self {
            watermark: 0.0,
            seen: HashSet::new(),
            include_dismissed: false,
            device_iden: None,
            suppressed: None,
        }
    }

    /// Set the starting watermark (typically the newest `modified` the
    /// service reported at connect time).
    pub fn seed(&mut self, watermark: f64) {
        self.watermark = watermark;
    }

    pub fn watermark(&self) -> f64 {
        self.watermark
    }

    pub fn include_dismissed(&mut self, include: bool) {
        self.include_dismissed = include;
    }

    pub fn filter_device(&mut self, iden: Option<String>) {
        self.device_iden = iden;
    }

    pub fn suppress_sent(&mut self, registry: Arc<SentRegistry>) {
        self.suppressed = Some(registry);
    }

    /// Resolve one frame into zero or more deliverable records.
    ///
    /// Only push tickles hit the API.  Inline push frames (ephemerals)
    /// are admitted directly.  Heartbeats, unknown frames, and tickles
    /// for other subjects resolve to an empty batch.
    pub async fn resolve(
        &mut self,
        frame: &StreamFrame,
        api: &dyn PushApi,
    ) -> Result<Vec<PushRecord>> {
        match frame {
            StreamFrame::Tickle {
                subtype: TickleSubject::Push,
            } => self.fetch_changes(api).await,
            StreamFrame::Push { push } => {
                if push.modified > self.watermark {
                    self.watermark = push.modified;
                }
                if self.admit(push) {
                    Ok(vec![push.clone()])
                } else {
                    Ok(Vec::new())
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Query records newer than the watermark, with bounded retry on
    /// transient failures.
    async fn fetch_changes(&mut self, api: &dyn PushApi) -> Result<Vec<PushRecord>> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..QUERY_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            match api.pushes_modified_after(self.watermark).await {
                Ok(records) => return Ok(self.admit_batch(records)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "push query failed, retrying");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Http("push query retries exhausted".into())))
    }

    /// Sort a batch into delivery order, filter, and advance the
    /// watermark past everything considered.
    ///
    /// The watermark moves even for filtered-out records; otherwise a
    /// duplicate or dismissed record at the head of the feed would be
    /// re-fetched on every tickle.
    fn admit_batch(&mut self, mut records: Vec<PushRecord>) -> Vec<PushRecord> {
        records.sort_by(|a, b| a.modified.total_cmp(&b.modified));

        let cutoff = self.watermark;
        let mut admitted = Vec::new();
        for record in records {
            if record.modified > self.watermark {
                self.watermark = record.modified;
            }
            if record.modified <= cutoff {
                continue;
            }
            if self.admit(&record) {
                admitted.push(record);
            }
        }
        admitted
    }

    /// Per-record admission filters, shared by queried and inline records.
    fn admit(&mut self, record: &PushRecord) -> bool {
        if !record.active {
            return false;
        }
        if record.dismissed && !self.include_dismissed {
            return false;
        }
        if let (Some(filter), Some(target)) = (&self.device_iden, &record.target_device_iden) {
            if filter != target {
                return false;
            }
        }
        if let Some(registry) = &self.suppressed {
            if !record.iden.is_empty() && registry.contains(&record.iden) {
                tracing::debug!(iden = %record.iden, "ignoring echo of our own push");
                return false;
            }
        }
        // Ephemerals may arrive without an iden; they cannot be deduped.
        if !record.iden.is_empty() && !self.seen.insert(record.iden.clone()) {
            return false;
        }
        true
    }
}

impl Default for PushResolver {
    fn default() -> Self {
        Self::new()
    }
}
