//! Event payloads fired by the state store

use serde::{Deserialize, Serialize};

use crate::{EntityId, State};

/// Event type name for state changes
pub const STATE_CHANGED: &str = "state_changed";

/// Data for state_changed events
///
/// `old_state` is `None` for the first write of an entity, `new_state` is
/// `None` when the entity is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: EntityId,
    pub old_state: Option<State>,
    pub new_state: Option<State>,
}

impl StateChangedData {
    /// The event type string
    pub fn event_type() -> &'static str {
        STATE_CHANGED
    }

    /// Whether the state string differs between old and new state
    pub fn is_significant(&self) -> bool {
        match (&self.old_state, &self.new_state) {
            (Some(old), Some(new)) => old.state != new.state,
            _ => true,
        }
    }
}
