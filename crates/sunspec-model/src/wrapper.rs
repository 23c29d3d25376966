//! Model wrapper trait

use indexmap::IndexMap;
use std::sync::Arc;

use crate::{GroupMeta, ModelResult, PointMeta, PointValue};

/// Access to one SunSpec model's points
///
/// A model may repeat on a device (e.g. several MPPT modules); every point
/// then has one value per instance, addressed by `index` in
/// `0..num_models()`. Keys of points inside repeating groups take the form
/// `group:instance:point`.
pub trait ModelWrapper: Send + Sync {
    /// SunSpec model id (e.g. 103 for a three-phase inverter)
    fn model_id(&self) -> u16;

    /// Point keys in model order
    fn keys(&self) -> Vec<String>;

    /// Number of instances of this model on the device
    fn num_models(&self) -> usize;

    /// Model-level metadata
    fn group_meta(&self) -> &GroupMeta;

    /// Metadata for a point
    fn meta(&self, key: &str) -> Option<&PointMeta>;

    /// Decoded (scaled) value of a point; `None` when the device does not
    /// implement it
    fn value(&self, key: &str, index: usize) -> ModelResult<Option<PointValue>>;

    /// Raw register value of a point, before scaling
    fn raw_value(&self, key: &str, index: usize) -> ModelResult<Option<PointValue>>;

    /// Stage a decoded value to be sent on the next device write
    fn set_value(&self, key: &str, value: PointValue, index: usize) -> ModelResult<()>;
}

/// A full data snapshot: model id to wrapper, in device order
pub type ModelData = IndexMap<u16, Arc<dyn ModelWrapper>>;
