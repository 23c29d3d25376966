//! Setup errors

use sunspec_model::ModelError;
use thiserror::Error;

/// Errors that fail a config entry setup
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid entry options: {0}")]
    InvalidOptions(#[source] serde_json::Error),

    #[error("device not ready: {0}")]
    NotReady(#[from] ModelError),

    #[error("entry {0} is already loaded")]
    AlreadyLoaded(String),
}

pub type SetupResult<T> = Result<T, SetupError>;
