//! The attestation record (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An attestation: who said what about whom, in what context.
///
/// `subjects`, `predicates`, `contexts`, and `actors` are ordered sequences
/// of non-empty strings (empty string *values* within a facet are allowed
/// and carry meaning, e.g. as wildcard markers upstream of this engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    /// Opaque, collision-free ID allocated by an external generator.
    pub id: String,
    /// Subjects the attestation is about.
    pub subjects: Vec<String>,
    /// Predicates (verbs/relations) the attestation asserts.
    pub predicates: Vec<String>,
    /// Contexts qualifying the assertion.
    pub contexts: Vec<String>,
    /// Actors responsible for the assertion. A self-certifying attestation
    /// has `actors == [id]`.
    pub actors: Vec<String>,
    /// Instant of the attested event.
    pub timestamp: DateTime<Utc>,
    /// Free-form origin tag.
    pub source: String,
    /// Free-form attribute map. `None` persists as an empty/null column.
    pub attributes: Option<HashMap<String, Value>>,
    /// Instant this row was inserted, distinct from `timestamp`.
    pub created_at: DateTime<Utc>,
}

impl Attestation {
    /// Whether this attestation is self-certifying: its first actor equals
    /// its own ID. Self-certifying attestations are exempt from all
    /// bounded-retention quotas (§4.5).
    #[must_use]
    pub fn is_self_certifying(&self) -> bool {
        self.actors.first().is_some_and(|first| first == &self.id)
    }

    /// Force this attestation to be self-certifying by setting
    /// `actors = [id]`, per §3 and §4.3's `generate_and_create`.
    pub fn make_self_certifying(&mut self) {
        self.actors = vec![self.id.clone()];
    }
}

/// A command to create an attestation whose ID is allocated by the external
/// generator (§4.3 `generate_and_create`). If `actors` is empty the engine
/// sets `actors = [id]`, making the row self-certifying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttestationCommand {
    /// Subjects the attestation is about.
    pub subjects: Vec<String>,
    /// Predicates the attestation asserts.
    pub predicates: Vec<String>,
    /// Contexts qualifying the assertion.
    pub contexts: Vec<String>,
    /// Actors responsible for the assertion; empty means self-certifying.
    pub actors: Vec<String>,
    /// Instant of the attested event.
    pub timestamp: DateTime<Utc>,
    /// Free-form origin tag.
    pub source: String,
    /// Free-form attribute map.
    pub attributes: Option<HashMap<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attestation(id: &str, actors: Vec<String>) -> Attestation {
        Attestation {
            id: id.to_string(),
            subjects: vec!["ALICE".to_string()],
            predicates: vec!["speaks".to_string()],
            contexts: vec!["Dutch".to_string()],
            actors,
            timestamp: Utc::now(),
            source: "t".to_string(),
            attributes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn self_certifying_when_first_actor_is_id() {
        let a = attestation("AS-1", vec!["AS-1".to_string()]);
        assert!(a.is_self_certifying());
    }

    #[test]
    fn not_self_certifying_for_other_actor() {
        let a = attestation("AS-1", vec!["u@x".to_string()]);
        assert!(!a.is_self_certifying());
    }

    #[test]
    fn not_self_certifying_with_no_actors() {
        let a = attestation("AS-1", vec![]);
        assert!(!a.is_self_certifying());
    }

    #[test]
    fn make_self_certifying_overwrites_actors() {
        let mut a = attestation("AS-1", vec!["u@x".to_string(), "u2@x".to_string()]);
        a.make_self_certifying();
        assert_eq!(a.actors, vec!["AS-1".to_string()]);
    }
}
