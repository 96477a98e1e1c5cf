//! HTTP API client for the Pushwire service.
//!
//! The [`PushApi`] trait is the seam the realtime pipeline programs
//! against; [`RestPushClient`] is the production implementation.

mod api;
mod error;
mod rest;

pub use api::PushApi;
pub use error::{Error, Result};
pub use rest::RestPushClient;
