//! Config entry types
//!
//! A ConfigEntry is one configured instance of an integration, e.g. one
//! SunSpec device.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    /// Not set up, or unloaded again
    #[default]
    NotLoaded,
    /// Successfully set up
    Loaded,
    /// Setup failed
    SetupError,
    /// Unload failed
    FailedUnload,
}

impl ConfigEntryState {
    /// Whether the entry can be set up or unloaded from this state
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ConfigEntryState::FailedUnload)
    }
}

/// A configuration entry for an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain
    pub domain: String,

    /// Human-readable display name
    pub title: String,

    /// Configuration data from setup
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// User-configurable options, taking precedence over data
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    #[serde(default = "default_version")]
    pub version: u32,

    /// Current lifecycle state (not persisted)
    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Human-readable explanation for failed states
    #[serde(skip, default)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    /// Create a new config entry
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            version: 1,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            created_at: Utc::now(),
        }
    }

    /// Set entry data
    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    /// Set entry options
    pub fn with_options(mut self, options: HashMap<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    /// Deserialize data overlaid with options into a typed settings struct
    pub fn merged<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut merged: serde_json::Map<String, serde_json::Value> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in &self.options {
            merged.insert(k.clone(), v.clone());
        }
        serde_json::from_value(serde_json::Value::Object(merged))
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    pub fn set_state(&mut self, state: ConfigEntryState, reason: Option<String>) {
        self.state = state;
        self.reason = reason;
    }
}
