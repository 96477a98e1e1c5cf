/// Shared error type used across all Pushwire crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid API key: {0}")]
    InvalidKey(String),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("config: {0}")]
    Config(String),

    #[error("action {action}: {message}")]
    Action { action: String, message: String },

    #[error("reconnect exhausted after {0} consecutive failures")]
    ReconnectExhausted(u32),

    #[error("shutdown")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Terminal errors end the stream once, immediately.  Everything else
    /// is absorbed and logged at the layer that detected it so the stream
    /// keeps flowing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidKey(_) | Error::ReconnectExhausted(_) | Error::Shutdown
        )
    }
}
