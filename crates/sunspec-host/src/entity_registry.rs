//! Entity Registry
//!
//! Maps platform unique ids to stable entity ids, so an entity keeps its id
//! across restarts and name changes.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for the entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";

/// Upper bound for `_N` suffixes when resolving entity id conflicts
const MAX_SUFFIX: usize = 10_000;

/// A registered entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal ULID
    pub id: String,
    /// Full entity id (domain.object_id)
    pub entity_id: String,
    /// Platform-specific unique identifier
    pub unique_id: String,
    /// Integration that provides this entity
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Name the platform gave the entity when it was registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_icon: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id: unique_id.into(),
            platform: platform.into(),
            config_entry_id: None,
            device_id: None,
            original_name: None,
            original_icon: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }
}

/// Registration request passed to [`EntityRegistry::get_or_create`]
#[derive(Debug, Clone, Default)]
pub struct EntityRegistration<'a> {
    pub platform: &'a str,
    pub domain: &'a str,
    pub unique_id: &'a str,
    pub suggested_object_id: &'a str,
    pub config_entry_id: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub original_name: Option<&'a str>,
    pub original_icon: Option<&'a str>,
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Entity registry indexed by entity id, unique id and config entry
pub struct EntityRegistry {
    storage: Arc<Storage>,

    /// Primary index, insertion ordered
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    /// (platform, unique_id) -> entity_id
    by_unique_id: DashMap<(String, String), String>,

    /// config_entry_id -> entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<EntityRegistryData>().await? {
            info!("Loading {} entities from storage", data.entities.len());
            for entry in data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let entities: Vec<EntityEntry> = self
            .by_entity_id
            .read()
            .map(|e| e.values().map(|v| (**v).clone()).collect())
            .unwrap_or_default();
        let count = entities.len();

        self.storage.save(&EntityRegistryData { entities }).await?;
        debug!("Saved {} entities to storage", count);
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        self.by_unique_id.insert(
            (entry.platform.clone(), entry.unique_id.clone()),
            entity_id.clone(),
        );

        if let Some(ref config_entry_id) = entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Ok(mut by_id) = self.by_entity_id.write() {
            by_id.insert(entity_id, entry);
        }
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        self.by_unique_id
            .remove(&(entry.platform.clone(), entry.unique_id.clone()));

        if let Some(ref config_entry_id) = entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.entity_id);
            }
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|e| e.get(entity_id).cloned())
    }

    pub fn get_by_unique_id(&self, platform: &str, unique_id: &str) -> Option<Arc<EntityEntry>> {
        let entity_id = self
            .by_unique_id
            .get(&(platform.to_string(), unique_id.to_string()))
            .map(|r| r.clone())?;
        self.get(&entity_id)
    }

    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        let ids: Vec<String> = self
            .by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let mut entries: Vec<_> = ids.iter().filter_map(|id| self.get(id)).collect();
        entries.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entries
    }

    pub fn is_registered(&self, entity_id: &str) -> bool {
        self.by_entity_id
            .read()
            .map(|e| e.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Get the entry for a unique id, registering a new entity when unknown
    ///
    /// Existing entries keep their entity id; their config entry and device
    /// links are refreshed.
    pub fn get_or_create(&self, registration: EntityRegistration<'_>) -> Arc<EntityEntry> {
        if let Some(existing) =
            self.get_by_unique_id(registration.platform, registration.unique_id)
        {
            debug!("Found existing entity by unique_id: {}", existing.entity_id);
            let stale = existing.config_entry_id.as_deref() != registration.config_entry_id
                || existing.device_id.as_deref() != registration.device_id;
            if !stale {
                return existing;
            }

            self.unindex_entry(&existing);
            let mut updated = (*existing).clone();
            updated.config_entry_id = registration.config_entry_id.map(String::from);
            updated.device_id = registration.device_id.map(String::from);
            updated.modified_at = Utc::now();
            let updated = Arc::new(updated);
            self.index_entry(Arc::clone(&updated));
            return updated;
        }

        let entity_id =
            self.generate_entity_id(registration.domain, registration.suggested_object_id);

        let mut entry = EntityEntry::new(
            entity_id.clone(),
            registration.platform,
            registration.unique_id,
        );
        entry.config_entry_id = registration.config_entry_id.map(String::from);
        entry.device_id = registration.device_id.map(String::from);
        entry.original_name = registration.original_name.map(String::from);
        entry.original_icon = registration.original_icon.map(String::from);

        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));
        info!("Registered new entity: {}", entity_id);
        entry
    }

    /// Generate a free entity id, appending `_2`, `_3`, ... on conflicts
    pub fn generate_entity_id(&self, domain: &str, suggested_object_id: &str) -> String {
        let preferred = format!("{}.{}", domain, suggested_object_id);
        if !self.is_registered(&preferred) {
            return preferred;
        }

        (2..MAX_SUFFIX)
            .map(|n| format!("{}_{}", preferred, n))
            .find(|candidate| !self.is_registered(candidate))
            .unwrap_or_else(|| {
                format!(
                    "{}_{}",
                    preferred,
                    ulid::Ulid::new().to_string().to_lowercase()
                )
            })
    }

    /// Remove an entity from the registry
    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let removed = self
            .by_entity_id
            .write()
            .ok()
            .and_then(|mut e| e.shift_remove(entity_id))?;
        self.unindex_entry(&removed);
        debug!("Removed entity: {}", entity_id);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
