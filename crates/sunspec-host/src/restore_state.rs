//! Last-known entity states, persisted across restarts
//!
//! Entities read their previous state when they are added, for example to
//! resume a counter that the device reports as zero while it is asleep.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sunspec_core::State;
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for restored states
pub const STORAGE_KEY: &str = "core.restore_state";

/// Stored form of the restore data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreStateData {
    pub states: Vec<State>,
}

impl Storable for RestoreStateData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Store of the last written state per entity
pub struct RestoreStateStore {
    storage: Arc<Storage>,
    /// States loaded from storage at startup
    restored: DashMap<String, State>,
    /// States written during this run
    current: DashMap<String, State>,
}

impl RestoreStateStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            restored: DashMap::new(),
            current: DashMap::new(),
        }
    }

    /// Load the states saved by the previous run
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<RestoreStateData>().await? {
            info!("Restoring {} entity states", data.states.len());
            for state in data.states {
                self.restored.insert(state.entity_id.to_string(), state);
            }
        }
        Ok(())
    }

    /// Save the latest known state of every entity
    pub async fn save(&self) -> StorageResult<()> {
        let mut merged: HashMap<String, State> = self
            .restored
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        for r in self.current.iter() {
            merged.insert(r.key().clone(), r.value().clone());
        }

        let mut states: Vec<State> = merged.into_values().collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        let count = states.len();

        self.storage.save(&RestoreStateData { states }).await?;
        debug!("Saved {} restore states", count);
        Ok(())
    }

    /// Record a state written during this run
    pub fn record(&self, state: &State) {
        self.current
            .insert(state.entity_id.to_string(), state.clone());
    }

    /// The state an entity had at the end of the previous run
    pub fn last_state(&self, entity_id: &str) -> Option<State> {
        self.restored.get(entity_id).map(|s| s.clone())
    }
}
