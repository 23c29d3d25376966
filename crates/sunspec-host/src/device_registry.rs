//! Device Registry
//!
//! Groups entities under the physical device (or model group) they belong
//! to. Devices are deduplicated by their `(domain, id)` identifiers.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for the device registry
pub const STORAGE_KEY: &str = "core.device_registry";

/// Device description provided by an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// `(domain, id)` pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

/// A registered device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    pub identifiers: Vec<(String, String)>,
    #[serde(default)]
    pub config_entries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    fn from_info(info: &DeviceInfo) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            identifiers: info.identifiers.clone(),
            config_entries: Vec::new(),
            name: info.name.clone(),
            manufacturer: info.manufacturer.clone(),
            model: info.model.clone(),
            sw_version: info.sw_version.clone(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Display name, falling back to the device id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Apply descriptive fields from `info`, returning whether anything changed
    fn merge(&mut self, config_entry_id: &str, info: &DeviceInfo) -> bool {
        let mut changed = false;

        if !self.config_entries.iter().any(|c| c == config_entry_id) {
            self.config_entries.push(config_entry_id.to_string());
            changed = true;
        }
        for identifier in &info.identifiers {
            if !self.identifiers.contains(identifier) {
                self.identifiers.push(identifier.clone());
                changed = true;
            }
        }

        let fields = [
            (&mut self.name, &info.name),
            (&mut self.manufacturer, &info.manufacturer),
            (&mut self.model, &info.model),
            (&mut self.sw_version, &info.sw_version),
        ];
        for (current, new) in fields {
            if new.is_some() && *current != *new {
                *current = new.clone();
                changed = true;
            }
        }

        changed
    }
}

/// Device registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Device registry indexed by device id, identifier and config entry
pub struct DeviceRegistry {
    storage: Arc<Storage>,

    by_id: RwLock<IndexMap<String, Arc<DeviceEntry>>>,

    /// "domain:id" -> device_id
    by_identifier: DashMap<String, String>,

    /// config_entry_id -> device_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

fn identifier_key(domain: &str, id: &str) -> String {
    format!("{}:{}", domain, id)
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: RwLock::new(IndexMap::new()),
            by_identifier: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<DeviceRegistryData>().await? {
            info!("Loading {} devices from storage", data.devices.len());
            for device in data.devices {
                self.index_device(Arc::new(device));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let devices: Vec<DeviceEntry> = self
            .by_id
            .read()
            .map(|d| d.values().map(|v| (**v).clone()).collect())
            .unwrap_or_default();
        let count = devices.len();

        self.storage.save(&DeviceRegistryData { devices }).await?;
        debug!("Saved {} devices to storage", count);
        Ok(())
    }

    fn index_device(&self, device: Arc<DeviceEntry>) {
        for (domain, id) in &device.identifiers {
            self.by_identifier
                .insert(identifier_key(domain, id), device.id.clone());
        }
        for config_entry_id in &device.config_entries {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(device.id.clone());
        }
        if let Ok(mut by_id) = self.by_id.write() {
            by_id.insert(device.id.clone(), device);
        }
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.read().ok().and_then(|d| d.get(device_id).cloned())
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let device_id = self
            .by_identifier
            .get(&identifier_key(domain, id))
            .map(|r| r.clone())?;
        self.get(&device_id)
    }

    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        let ids: Vec<String> = self
            .by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Get the device matching any of the identifiers, creating it if none does
    ///
    /// Descriptive fields of an existing device are overwritten by the ones
    /// set in `info`.
    pub fn get_or_create(&self, config_entry_id: &str, info: &DeviceInfo) -> Arc<DeviceEntry> {
        let existing = info
            .identifiers
            .iter()
            .find_map(|(domain, id)| self.get_by_identifier(domain, id));

        if let Some(existing) = existing {
            let mut updated = (*existing).clone();
            if !updated.merge(config_entry_id, info) {
                return existing;
            }
            debug!("Updating device: {}", updated.id);
            updated.modified_at = Utc::now();
            let updated = Arc::new(updated);
            self.index_device(Arc::clone(&updated));
            return updated;
        }

        let mut device = DeviceEntry::from_info(info);
        device.config_entries.push(config_entry_id.to_string());
        let device = Arc::new(device);
        self.index_device(Arc::clone(&device));
        info!("Registered new device: {}", device.display_name());
        device
    }

    /// Detach a config entry from all of its devices
    ///
    /// Devices left without any config entry are removed.
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        let Some((_, device_ids)) = self.by_config_entry_id.remove(config_entry_id) else {
            return;
        };

        for device_id in device_ids {
            let Some(device) = self.get(&device_id) else {
                continue;
            };
            let mut updated = (*device).clone();
            updated.config_entries.retain(|c| c != config_entry_id);

            if updated.config_entries.is_empty() {
                for (domain, id) in &updated.identifiers {
                    self.by_identifier.remove(&identifier_key(domain, id));
                }
                if let Ok(mut by_id) = self.by_id.write() {
                    by_id.shift_remove(&device_id);
                }
                debug!("Removed device: {}", device_id);
            } else {
                updated.modified_at = Utc::now();
                if let Ok(mut by_id) = self.by_id.write() {
                    by_id.insert(device_id, Arc::new(updated));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
