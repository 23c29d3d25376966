//! Device API trait

use async_trait::async_trait;

use crate::{CommonModel, ModelData, ModelResult};

/// Device-facing operations provided by the data-access layer
///
/// Implementations own the connection and the register codec; the
/// integration only sees decoded models.
#[async_trait]
pub trait SunSpecApi: Send + Sync {
    /// Identity values from the common model
    async fn device_info(&self) -> ModelResult<CommonModel>;

    /// Read every model from the device
    async fn read(&self) -> ModelResult<ModelData>;

    /// Write all staged values of one model instance to the device
    async fn write(&self, model_id: u16, index: usize) -> ModelResult<()>;
}
