use crate::error::{ControlError, Result};
use crate::platform_api::DeviceInfo;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Holds the device list as last fetched from the API.
/// There is no expiry: the list is kept until `invalidate` is called.
/// The lock is held across a fetch, so concurrent callers that miss
/// the cache wait for, and then share, the result of a single fetch.
#[derive(Default)]
pub struct DeviceInventory {
    devices: Mutex<Option<Arc<Vec<DeviceInfo>>>>,
}

impl DeviceInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached list, or awaits `load` to populate it.
    /// `load` is only polled on a miss; if it fails, the cache stays
    /// empty.
    pub async fn fetch<Fut>(&self, load: Fut) -> Result<Arc<Vec<DeviceInfo>>>
    where
        Fut: Future<Output = Result<Vec<DeviceInfo>>>,
    {
        let mut devices = self.devices.lock().await;
        if let Some(cached) = devices.as_ref() {
            log::trace!("device inventory: using {} cached devices", cached.len());
            return Ok(cached.clone());
        }

        log::debug!("device inventory: fetching device list");
        let fetched = Arc::new(load.await?);
        devices.replace(fetched.clone());
        Ok(fetched)
    }

    pub async fn invalidate(&self) {
        if self.devices.lock().await.take().is_some() {
            log::debug!("device inventory: cleared");
        }
    }

    pub async fn find<Fut>(&self, id: &str, load: Fut) -> Result<Option<DeviceInfo>>
    where
        Fut: Future<Output = Result<Vec<DeviceInfo>>>,
    {
        let devices = self.fetch(load).await?;
        Ok(devices.iter().find(|d| d.device == id).cloned())
    }

    pub async fn get_or_fail<Fut>(&self, id: &str, load: Fut) -> Result<DeviceInfo>
    where
        Fut: Future<Output = Result<Vec<DeviceInfo>>>,
    {
        self.find(id, load)
            .await?
            .ok_or_else(|| ControlError::DeviceNotFound(id.to_string()))
    }

    #[cfg(test)]
    pub async fn is_populated(&self) -> bool {
        self.devices.lock().await.is_some()
    }
}
