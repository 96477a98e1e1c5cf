//! Realtime push pipeline: websocket transport with reconnect, tickle
//! resolution with watermark dedup, a lazy listener façade, action
//! dispatch, and a sliding-window throttle.

pub mod actions;
mod listener;
mod reconnect;
mod resolver;
mod throttle;
mod transport;

pub use actions::{Action, ActionDispatcher, EchoAction, ExecAction, ExecSimpleAction, SentRegistry};
pub use listener::{PushListener, PushListenerBuilder};
pub use reconnect::ReconnectBackoff;
pub use resolver::PushResolver;
pub use throttle::{ThrottleGate, DEFAULT_CAPACITY, DEFAULT_WINDOW};
pub use transport::{StreamTransport, DEFAULT_IDLE_TIMEOUT};
