//! Refresh coordinator
//!
//! Holds the most recent data snapshot read from the device and tells
//! listeners when a new one is available. Scheduling refreshes is left to
//! the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{CommonModel, ModelData, ModelError, ModelResult, ModelWrapper, SunSpecApi};

/// Shares device data between all entities of one config entry
pub struct Coordinator {
    /// Name used in log messages
    name: String,
    /// Device API
    api: Arc<dyn SunSpecApi>,
    /// Latest snapshot
    data: RwLock<Arc<ModelData>>,
    /// Whether the last refresh succeeded
    last_update_success: AtomicBool,
    /// Refresh generation, bumped after every successful refresh
    updates: watch::Sender<u64>,
}

impl Coordinator {
    /// Create a coordinator with an empty snapshot
    pub fn new(name: impl Into<String>, api: Arc<dyn SunSpecApi>) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            name: name.into(),
            api,
            data: RwLock::new(Arc::new(ModelData::new())),
            last_update_success: AtomicBool::new(false),
            updates,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device API
    pub fn api(&self) -> &Arc<dyn SunSpecApi> {
        &self.api
    }

    /// Identity values of the device
    pub async fn device_info(&self) -> ModelResult<CommonModel> {
        self.api.device_info().await
    }

    /// Read a new snapshot from the device and notify listeners
    pub async fn async_refresh(&self) -> ModelResult<()> {
        match self.api.read().await {
            Ok(data) => {
                debug!(coordinator = %self.name, models = data.len(), "Refreshed device data");
                if let Ok(mut current) = self.data.write() {
                    *current = Arc::new(data);
                }
                self.last_update_success.store(true, Ordering::SeqCst);
                self.updates.send_modify(|generation| *generation += 1);
                Ok(())
            }
            Err(e) => {
                warn!(coordinator = %self.name, error = %e, "Error fetching device data");
                self.last_update_success.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Initial refresh done while an entry is being set up
    ///
    /// Unlike later refreshes, an empty result is an error: an entry with no
    /// models would create no entities at all.
    pub async fn async_config_entry_first_refresh(&self) -> ModelResult<()> {
        self.async_refresh().await?;
        if self.data().is_empty() {
            return Err(ModelError::Device(format!(
                "no models read from {}",
                self.name
            )));
        }
        Ok(())
    }

    /// The latest snapshot
    pub fn data(&self) -> Arc<ModelData> {
        self.data
            .read()
            .map(|d| Arc::clone(&d))
            .unwrap_or_else(|_| Arc::new(ModelData::new()))
    }

    /// Look up a model in the latest snapshot
    pub fn model(&self, model_id: u16) -> ModelResult<Arc<dyn ModelWrapper>> {
        self.data()
            .get(&model_id)
            .cloned()
            .ok_or(ModelError::ModelNotFound(model_id))
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    /// Receive a notification after every successful refresh
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }
}
