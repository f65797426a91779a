//! The composite filter object consumed by the query executor (§4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The unit a numeric OVER threshold is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverUnit {
    /// Years; used as the canonical threshold unit directly.
    Years,
    /// Months; divided by 12 to convert to the canonical (years) threshold.
    Months,
    /// Seconds; used only for duration-typed predicates in domains where
    /// the whitelist admits them.
    Seconds,
}

/// The comparison operator applied by an OVER filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverOperator {
    /// `>=`
    Gte,
    /// `>`
    Gt,
    /// `<=`
    Lte,
    /// `<`
    Lt,
    /// `==`
    Eq,
}

impl OverOperator {
    /// The SQL operator text for this comparison.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            OverOperator::Gte => ">=",
            OverOperator::Gt => ">",
            OverOperator::Lte => "<=",
            OverOperator::Lt => "<",
            OverOperator::Eq => "=",
        }
    }
}

/// A numeric OVER-threshold comparison (§4.2 `build_over_filter`, §4.6 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverComparison {
    /// The threshold value, expressed in `unit`.
    pub value: f64,
    /// The unit `value` is expressed in.
    pub unit: OverUnit,
    /// The comparison operator.
    pub operator: OverOperator,
}

impl OverComparison {
    /// Convert this comparison's threshold to the canonical unit (years for
    /// `Years`/`Months`; left alone for `Seconds`, per §4.6 step 3).
    #[must_use]
    pub fn canonical_threshold(&self) -> f64 {
        match self.unit {
            OverUnit::Years => self.value,
            OverUnit::Months => self.value / 12.0,
            OverUnit::Seconds => self.value,
        }
    }
}

/// The composite filter object passed to the query executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Subject values to match (OR within the facet).
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Predicate values to match (OR within the facet).
    #[serde(default)]
    pub predicates: Vec<String>,
    /// Context values to match (OR within the facet, case-insensitive).
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Actor values to match (OR within the facet).
    #[serde(default)]
    pub actors: Vec<String>,
    /// Exclusive lower bound on `timestamp`.
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    /// An optional numeric OVER-threshold comparison.
    #[serde(default)]
    pub over_comparison: Option<OverComparison>,
    /// Opaque post-query action list, untouched by storage.
    #[serde(default)]
    pub so_actions: Vec<Value>,
    /// Caller-supplied row limit. `None` or `<= 0` yields the
    /// component-specific default.
    #[serde(default)]
    pub limit: Option<i64>,
}

impl Filter {
    /// Whether any facet, time bound, or OVER comparison is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
            && self.predicates.is_empty()
            && self.contexts.is_empty()
            && self.actors.is_empty()
            && self.time_start.is_none()
            && self.time_end.is_none()
            && self.over_comparison.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn months_threshold_divides_by_twelve() {
        let over = OverComparison {
            value: 24.0,
            unit: OverUnit::Months,
            operator: OverOperator::Gte,
        };
        assert!((over.canonical_threshold() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn years_threshold_is_unchanged() {
        let over = OverComparison {
            value: 5.0,
            unit: OverUnit::Years,
            operator: OverOperator::Gte,
        };
        assert!((over.canonical_threshold() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_filter_is_empty() {
        assert!(Filter::default().is_empty());
    }

    #[test]
    fn filter_with_subject_is_not_empty() {
        let filter = Filter {
            subjects: vec!["ALICE".to_string()],
            ..Default::default()
        };
        assert!(!filter.is_empty());
    }
}
