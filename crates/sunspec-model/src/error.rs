//! Errors reported by model wrappers and device APIs

use thiserror::Error;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when reading or writing model data
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// The coordinator data has no model with this id
    #[error("model {0} not found")]
    ModelNotFound(u16),

    /// The model has no point with this key
    #[error("point '{0}' not found")]
    PointNotFound(String),

    /// The repeating model index is past the number of instances
    #[error("instance {index} of point '{key}' out of range ({count} instances)")]
    InstanceOutOfRange {
        key: String,
        index: usize,
        count: usize,
    },

    /// Applying the scale factor produced a value that cannot be represented
    #[error("math overflow computing value of '{0}'")]
    Overflow(String),

    /// The value is not acceptable for the point
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// The device could not be reached or rejected the request
    #[error("device communication failed: {0}")]
    Device(String),
}
