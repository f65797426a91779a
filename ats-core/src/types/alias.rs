//! Bidirectional alias records (§3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed alias edge: `alias` resolves to `target`. Every alias creation
/// writes both directions atomically; lookups ignore case, stored values
/// preserve case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    /// The alias identifier (case preserved as stored).
    pub alias: String,
    /// The target identifier this alias resolves to.
    pub target: String,
    /// Who registered this alias.
    pub created_by: String,
    /// When this alias edge was created.
    pub created_at: DateTime<Utc>,
}
