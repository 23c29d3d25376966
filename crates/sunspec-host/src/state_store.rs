//! Entity state storage
//!
//! Holds the current state of every entity and broadcasts a
//! [`StateChangedData`] for every write and removal.

use dashmap::DashMap;
use std::collections::HashMap;
use sunspec_core::{Context, EntityId, State, StateChangedData};
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Capacity of the state-changed channel
const CHANNEL_CAPACITY: usize = 1024;

/// Current state of all entities
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// State change notifications
    changes: broadcast::Sender<StateChangedData>,
}

impl StateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            states: DashMap::new(),
            changes,
        }
    }

    /// Write the state of an entity
    ///
    /// `last_changed` is only bumped when the state string changes.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context),
            None => State::new(entity_id.clone(), state, attributes, context),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key, new_state.clone());

        // No receivers is fine
        let _ = self.changes.send(StateChangedData {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get just the state string
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Entity ids of a domain, sorted
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .states
            .iter()
            .filter(|r| r.value().entity_id.domain() == domain)
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity's state, announcing it with `new_state: None`
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let old_state = self.states.remove(&entity_id.to_string()).map(|(_, s)| s);

        if let Some(state) = &old_state {
            trace!("Removing entity state");
            let _ = self.changes.send(StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(state.clone()),
                new_state: None,
            });
            drop(context);
        }

        old_state
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedData> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
