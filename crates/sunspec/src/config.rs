//! Per-entry settings

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sunspec_host::ConfigEntry;

use crate::error::SetupError;

/// Settings read from a config entry's data, overridden by its options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunSpecOptions {
    /// Prepended to every entity name
    #[serde(default)]
    pub prefix: String,

    /// Seconds between refreshes
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Modbus unit id of the device
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Model ids to expose; empty exposes every model
    #[serde(default)]
    pub models: Vec<u16>,
}

fn default_scan_interval() -> u64 {
    30
}

fn default_unit_id() -> u8 {
    1
}

impl Default for SunSpecOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            scan_interval: default_scan_interval(),
            unit_id: default_unit_id(),
            models: Vec::new(),
        }
    }
}

impl SunSpecOptions {
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, SetupError> {
        entry.merged().map_err(SetupError::InvalidOptions)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval.max(1))
    }

    /// Whether entities should be created for a model
    pub fn includes_model(&self, model_id: u16) -> bool {
        self.models.is_empty() || self.models.contains(&model_id)
    }
}
