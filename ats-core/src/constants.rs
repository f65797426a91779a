//! Built-in defaults for the engine. A negative configured limit falls back
//! to the corresponding constant here (§4.5); a configured value of zero is
//! honoured literally ("zero means zero").

/// Default maximum attestations retained per (actor, context) pair.
pub const DEFAULT_ACTOR_CONTEXT_LIMIT: i64 = 16;

/// Default maximum distinct context-arrays retained per actor.
pub const DEFAULT_ACTOR_CONTEXTS_LIMIT: i64 = 64;

/// Default maximum distinct actors retained per subject.
pub const DEFAULT_ENTITY_ACTORS_LIMIT: i64 = 64;

/// Hard cap on rows returned by any single retrieval, regardless of the
/// caller-supplied limit (§4.3).
pub const GLOBAL_RETRIEVAL_CAP: i64 = 10_000;

/// Default limit applied by the query executor when the caller supplies
/// none (§4.6).
pub const DEFAULT_EXECUTOR_LIMIT: i64 = 100;

/// Default limit applied by nearest-neighbour embedding search (§4.7).
pub const DEFAULT_SEMANTIC_SEARCH_LIMIT: i64 = 10;

/// Number of rows scanned by the rich-text search before giving up (§4.8).
pub const RICH_SEARCH_SCAN_CAP: usize = 500;

/// Number of rows returned by the rich-text exact-match path (§4.8).
pub const RICH_SEARCH_EXACT_RESULT_CAP: usize = 100;

/// Maximum vocabulary size for fuzzy rich search; truncated deterministically
/// beyond this (§4.8).
pub const RICH_SEARCH_VOCAB_CAP: usize = 100_000;

/// Wall-clock TTL of the rich-search field-discovery cache (§4.8, §5).
pub const RICH_SEARCH_CACHE_TTL_SECS: u64 = 300;

/// Character window within which matched tokens must fall to earn the
/// sequential-match boost (§4.8 step 5).
pub const RICH_SEARCH_SEQUENTIAL_WINDOW: usize = 50;

/// Multiplier applied to the fuzzy score when matched tokens are sequential.
pub const RICH_SEARCH_SEQUENTIAL_BOOST: f64 = 1.5;

/// Maximum excerpt length produced by the rich search (§4.8).
pub const RICH_SEARCH_EXCERPT_LEN: usize = 150;

/// Fill-percent window in which a predictive warning is emitted (§4.5).
pub const WARNING_FILL_LOW_WATERMARK: f64 = 0.5;
/// Upper (exclusive) bound of the fill-percent window for warnings.
pub const WARNING_FILL_HIGH_WATERMARK: f64 = 1.0;

/// Hourly rate below which a warning is skipped as noise (§4.5).
pub const WARNING_MIN_RATE_PER_HOUR: f64 = 0.01;

/// Hours in the "last day" window used for rate computation.
pub const WARNING_DAY_WINDOW_HOURS: i64 = 24;
/// Hours in the "last week" window used for normal-rate computation.
pub const WARNING_WEEK_WINDOW_HOURS: i64 = 168;

/// Resolve a configured limit per §4.5: negative falls back to `default`,
/// zero and positive values are used as-is.
#[must_use]
pub const fn resolve_limit(configured: i64, default: i64) -> i64 {
    if configured < 0 {
        default
    } else {
        configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_limit_falls_back_to_default() {
        assert_eq!(resolve_limit(-1, DEFAULT_ACTOR_CONTEXT_LIMIT), DEFAULT_ACTOR_CONTEXT_LIMIT);
    }

    #[test]
    fn zero_limit_means_zero() {
        assert_eq!(resolve_limit(0, DEFAULT_ACTOR_CONTEXT_LIMIT), 0);
    }

    #[test]
    fn positive_limit_passes_through() {
        assert_eq!(resolve_limit(5, DEFAULT_ACTOR_CONTEXT_LIMIT), 5);
    }
}
