//! Persisted reactive triggers (§3). Dispatch is external; this engine only
//! persists the trigger and its rate-limit/counter state.

use crate::types::filter::Filter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted reactive trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watcher {
    /// Unique watcher ID.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The filter used to decide whether an attestation matches.
    pub filter: Filter,
    /// The action type this watcher dispatches (opaque to storage).
    pub action_type: String,
    /// The action payload (opaque to storage).
    pub action_payload: Value,
    /// Maximum fires per minute. `0` means matching continues but the
    /// action never fires.
    pub max_fires_per_minute: u32,
    /// Whether this watcher is currently enabled.
    pub enabled: bool,
    /// Total number of times this watcher's action has fired.
    pub fire_count: u64,
    /// Total number of dispatch errors recorded against this watcher.
    pub error_count: u64,
    /// The instant of the most recent fire.
    pub last_fired_at: Option<DateTime<Utc>>,
    /// The most recent error message, if any.
    pub last_error: Option<String>,
}

impl Watcher {
    /// Whether this watcher's action is permitted to fire at all, given its
    /// `max_fires_per_minute` configuration. A limit of zero disables firing
    /// unconditionally; matching itself still proceeds.
    #[must_use]
    pub fn action_enabled(&self) -> bool {
        self.enabled && self.max_fires_per_minute > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::filter::Filter;

    fn watcher(max_fires: u32) -> Watcher {
        Watcher {
            id: "W-1".to_string(),
            name: "test".to_string(),
            filter: Filter::default(),
            action_type: "webhook".to_string(),
            action_payload: Value::Null,
            max_fires_per_minute: max_fires,
            enabled: true,
            fire_count: 0,
            error_count: 0,
            last_fired_at: None,
            last_error: None,
        }
    }

    #[test]
    fn zero_max_fires_disables_action_but_not_matching() {
        let w = watcher(0);
        assert!(!w.action_enabled());
    }

    #[test]
    fn positive_max_fires_enables_action() {
        let w = watcher(5);
        assert!(w.action_enabled());
    }

    #[test]
    fn disabled_watcher_never_fires() {
        let mut w = watcher(5);
        w.enabled = false;
        assert!(!w.action_enabled());
    }
}
