//! Pushwire wire types: stream frames, push records, and outbound requests.
//!
//! The realtime stream delivers low-information frames — a heartbeat, a
//! "tickle" hinting that some category of resource changed, or (for
//! ephemerals) a full record inline.  The HTTP API speaks full
//! [`PushRecord`]s.  Both surfaces share the types in this crate.

use serde::{Deserialize, Serialize};

/// Default HTTP API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.pushwire.io/v2";

/// Default realtime stream endpoint.  The API key is appended to the path.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.pushwire.io/subscribe/";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One inbound frame on the realtime stream.
///
/// Frames are JSON objects tagged by `type`.  Anything the client does not
/// recognize parses as [`StreamFrame::Unknown`] rather than failing, so a
/// newer server cannot tear down an older client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// Heartbeat.  Carries no payload; its arrival proves the connection
    /// is alive.
    Nop,

    /// Something in the given category changed.  The frame does not say
    /// what — the client re-queries the HTTP API to find out.
    Tickle {
        #[serde(default)]
        subtype: TickleSubject,
    },

    /// A full record delivered inline.  Used for ephemeral messages that
    /// are never stored server-side and therefore cannot be re-queried.
    Push { push: PushRecord },

    /// Unrecognized frame type.
    #[serde(other)]
    Unknown,
}

/// The resource category a tickle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TickleSubject {
    Push,
    Device,
    Channel,
    Chat,
    #[serde(other)]
    #[default]
    Other,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kind tag of a push record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    #[default]
    Note,
    Link,
    File,
    Sms,
    Ephemeral,
    #[serde(other)]
    Unknown,
}

/// A fully-resolved notification record.
///
/// Created by the service; never mutated locally.  A re-delivery with a
/// newer `modified` timestamp is an update of the same `iden`, not a new
/// notification.  `created`/`modified` are server-clock seconds and are
/// only ever compared against each other, never against local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushRecord {
    /// Opaque, stable, unique identifier.
    pub iden: String,
    #[serde(rename = "type")]
    pub kind: PushKind,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Device this push is addressed to, when targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_device_iden: Option<String>,
    pub created: f64,
    pub modified: f64,
    pub dismissed: bool,
    pub active: bool,
}

impl Default for PushRecord {
    fn default() -> Self {
        Self {
            iden: String::new(),
            kind: PushKind::default(),
            title: String::new(),
            body: String::new(),
            url: None,
            target_device_iden: None,
            created: 0.0,
            modified: 0.0,
            dismissed: false,
            // Partial payloads (ephemerals) omit the flag; absence must not
            // look like a deleted record.
            active: true,
        }
    }
}

/// A registered device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Device {
    pub iden: String,
    pub nickname: String,
    pub active: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Body of a push-creation request.
#[derive(Debug, Clone, Serialize)]
pub struct NewPush {
    #[serde(rename = "type")]
    pub kind: PushKind,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_iden: Option<String>,
}

impl NewPush {
    pub fn note(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: PushKind::Note,
            title: title.into(),
            body: body.into(),
            url: None,
            device_iden: None,
        }
    }

    pub fn link(
        title: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            kind: PushKind::Link,
            title: title.into(),
            body: body.into(),
            url: Some(url.into()),
            device_iden: None,
        }
    }

    /// Address the push to a single device.
    pub fn to_device(mut self, iden: impl Into<String>) -> Self {
        self.device_iden = Some(iden.into());
        self
    }
}

/// An outbound notification produced by an action in response to an
/// inbound push.  This is also the action wire format: external commands
/// write `{"title": ..., "body": ...}` (or a list of them) to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReply {
    pub title: String,
    #[serde(default)]
    pub body: String,
}
