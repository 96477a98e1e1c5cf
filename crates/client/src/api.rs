//! The collaborator seam between the listener pipeline and the HTTP API.
//!
//! The realtime pipeline only ever talks to the service through this trait,
//! so tests can substitute a scripted mock and the REST client stays an
//! implementation detail.

use async_trait::async_trait;
use pw_protocol::{Device, PushRecord};

use crate::error::{Error, Result};

#[async_trait]
pub trait PushApi: Send + Sync {
    /// Validate the credentials and return the newest `modified` timestamp
    /// on the account (`0.0` when there are no pushes yet).
    ///
    /// The timestamp seeds the listener's watermark so a fresh session only
    /// surfaces pushes that arrive after it connects.  Invalid credentials
    /// fail with [`Error::InvalidKey`].
    async fn verify_key(&self) -> Result<f64>;

    /// All records with `modified > modified_after`, as the service returns
    /// them (newest first).  Callers needing delivery order re-sort.
    async fn pushes_modified_after(&self, modified_after: f64) -> Result<Vec<PushRecord>>;

    /// Send a note push.  Returns the created record.
    async fn push_note(
        &self,
        title: &str,
        body: &str,
        device_iden: Option<&str>,
    ) -> Result<PushRecord>;

    /// Send a link push.  Returns the created record.
    async fn push_link(
        &self,
        title: &str,
        body: &str,
        url: &str,
        device_iden: Option<&str>,
    ) -> Result<PushRecord>;

    /// All active devices registered on the account.
    async fn devices(&self) -> Result<Vec<Device>>;

    /// Register a new device.
    async fn create_device(&self, nickname: &str) -> Result<Device>;

    /// Find an active device by nickname.
    async fn find_device(&self, nickname: &str) -> Result<Option<Device>> {
        let devices = self.devices().await?;
        Ok(devices
            .into_iter()
            .find(|d| d.active && d.nickname == nickname))
    }

    /// Find an active device by nickname, registering it when absent.
    async fn find_or_create_device(&self, nickname: &str) -> Result<Device> {
        if let Some(existing) = self.find_device(nickname).await? {
            return Ok(existing);
        }
        tracing::info!(nickname, "device not found, registering it");
        self.create_device(nickname).await.map_err(|e| match e {
            Error::Api { status, message } => Error::Api {
                status,
                message: format!("could not create device {nickname}: {message}"),
            },
            other => other,
        })
    }
}
