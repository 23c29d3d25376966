//! Core host types for the SunSpec integration
//!
//! The integration publishes device points as entities of a home-automation
//! host. This crate holds the vocabulary shared by the host slice and the
//! integration: entity ids, state snapshots, contexts, the state-changed
//! event payload and service calls.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::StateChangedData;
pub use service_call::ServiceCall;
pub use state::State;

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// State value for entities without a known value
pub const STATE_UNKNOWN: &str = "unknown";

/// State value for entities that cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Entity domains the integration publishes into
pub mod domains {
    /// Read-only measurements
    pub const SENSOR: &str = "sensor";

    /// Enumerated selectors
    pub const SELECT: &str = "select";

    /// Writable numeric controls
    pub const NUMBER: &str = "number";
}

/// Truncate a string to at most `max` characters, on a char boundary
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("", 2), "");
    }
}
