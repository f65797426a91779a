//! Pure WHERE-fragment construction (§4.2).

use super::QueryParam;

/// A WHERE-body fragment plus its ordered bound parameters. Multiple
/// fragments are combined by the caller with `AND`/`OR` as appropriate.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFragment {
    /// The SQL text, using `?` placeholders in the order `params` appears.
    pub sql: String,
    /// Bound parameters, one per `?` in `sql`.
    pub params: Vec<QueryParam>,
}

impl QueryFragment {
    fn empty() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }
}

/// Double every backslash, then prefix `%` and `_` with a backslash. Mandatory
/// on every user-supplied LIKE operand; failing to call this leaks wildcard
/// semantics to the caller's input.
#[must_use]
pub fn escape_like_pattern(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            other => out.push(other),
        }
    }
    out
}

/// Build an OR-combined `LIKE` clause over JSON-array membership for one
/// facet column. `values` must be non-empty; an empty slice yields an empty
/// fragment (`1=1` is not emitted — the caller must skip empty facets).
#[must_use]
pub fn build_facet_filter(facet: &str, values: &[String], case_insensitive: bool) -> QueryFragment {
    if values.is_empty() {
        return QueryFragment::empty();
    }

    let collate = if case_insensitive { " COLLATE NOCASE" } else { "" };
    let mut clauses = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());

    for value in values {
        clauses.push(format!("{facet} LIKE ? ESCAPE '\\'{collate}"));
        params.push(QueryParam::Text(format!("%\"{}\"%", escape_like_pattern(value))));
    }

    QueryFragment {
        sql: format!("({})", clauses.join(" OR ")),
        params,
    }
}

/// Build the OR-combined `(predicates LIKE ? AND contexts LIKE ? COLLATE
/// NOCASE)` group for natural-language predicate/context expansions, ANDed
/// with any `extra_contexts` literals.
#[must_use]
pub fn build_natural_language_filter(
    expansions: &[(String, String)],
    extra_contexts: &[String],
) -> QueryFragment {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for (predicate, context) in expansions {
        clauses.push("(predicates LIKE ? ESCAPE '\\' AND contexts LIKE ? ESCAPE '\\' COLLATE NOCASE)".to_string());
        params.push(QueryParam::Text(format!("%\"{}\"%", escape_like_pattern(predicate))));
        params.push(QueryParam::Text(format!("%\"{}\"%", escape_like_pattern(context))));
    }

    let mut body = if clauses.is_empty() {
        String::new()
    } else {
        format!("({})", clauses.join(" OR "))
    };

    for context in extra_contexts {
        let clause = "contexts LIKE ? ESCAPE '\\' COLLATE NOCASE".to_string();
        params.push(QueryParam::Text(format!("%\"{}\"%", escape_like_pattern(context))));
        body = if body.is_empty() {
            clause
        } else {
            format!("{body} AND {clause}")
        };
    }

    QueryFragment { sql: body, params }
}

/// Build the numeric OVER-threshold fragment. `predicate_whitelist` names the
/// predicates permitted to carry a numeric value in `contexts[0]`; predicate
/// names are always bound as parameters, never interpolated as SQL text.
/// When `has_other_clauses` is true, the comparison is nested as a subquery
/// over `subjects[0]` so it composes correctly with the caller's other
/// conjuncts; otherwise a direct OR-joined conjunction is emitted.
#[must_use]
pub fn build_over_filter(
    predicate_whitelist: &[String],
    threshold: f64,
    operator_sql: &str,
    has_other_clauses: bool,
) -> QueryFragment {
    if predicate_whitelist.is_empty() {
        return QueryFragment::empty();
    }

    let mut clauses = Vec::with_capacity(predicate_whitelist.len());
    let mut params = Vec::new();

    for predicate in predicate_whitelist {
        clauses.push(format!(
            "(json_extract(predicates, '$[0]') = ? AND CAST(json_extract(contexts, '$[0]') AS REAL) {operator_sql} ?)"
        ));
        params.push(QueryParam::Text(predicate.clone()));
        params.push(QueryParam::Real(threshold));
    }

    let joined = clauses.join(" OR ");

    if has_other_clauses {
        let sql = format!(
            "json_extract(subjects, '$[0]') IN (SELECT json_extract(subjects, '$[0]') FROM attestations WHERE {joined})"
        );
        QueryFragment { sql, params }
    } else {
        QueryFragment {
            sql: format!("({joined})"),
            params,
        }
    }
}

/// Build the temporal-bound fragment. Exclusive on `start` (`timestamp >
/// ?`), inclusive on `end` (`timestamp <= ?`); this asymmetry is load-bearing
/// and must not be "fixed" to be symmetric.
#[must_use]
pub fn build_temporal_filters(start: Option<i64>, end: Option<i64>) -> QueryFragment {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(start) = start {
        clauses.push("timestamp > ?".to_string());
        params.push(QueryParam::Int(start));
    }
    if let Some(end) = end {
        clauses.push("timestamp <= ?".to_string());
        params.push(QueryParam::Int(end));
    }

    QueryFragment {
        sql: clauses.join(" AND "),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_pattern_escapes_wildcards_and_backslash() {
        assert_eq!(escape_like_pattern("100%_off\\"), "100\\%\\_off\\\\");
    }

    #[test]
    fn facet_filter_combines_values_with_or() {
        let values = vec!["ALICE".to_string(), "BOB".to_string()];
        let fragment = build_facet_filter("subjects", &values, false);
        assert_eq!(fragment.params.len(), 2);
        assert!(fragment.sql.contains(" OR "));
        assert!(!fragment.sql.contains("COLLATE"));
    }

    #[test]
    fn facet_filter_is_case_insensitive_when_requested() {
        let values = vec!["Dutch".to_string()];
        let fragment = build_facet_filter("contexts", &values, true);
        assert!(fragment.sql.contains("COLLATE NOCASE"));
    }

    #[test]
    fn empty_facet_values_yield_empty_fragment() {
        let fragment = build_facet_filter("subjects", &[], false);
        assert!(fragment.sql.is_empty());
        assert!(fragment.params.is_empty());
    }

    #[test]
    fn temporal_filter_is_exclusive_start_inclusive_end() {
        let fragment = build_temporal_filters(Some(100), Some(200));
        assert_eq!(fragment.sql, "timestamp > ? AND timestamp <= ?");
        assert_eq!(fragment.params, vec![QueryParam::Int(100), QueryParam::Int(200)]);
    }

    #[test]
    fn over_filter_binds_predicate_names_as_parameters() {
        let whitelist = vec!["age".to_string()];
        let fragment = build_over_filter(&whitelist, 18.0, ">=", false);
        assert!(!fragment.sql.contains("age"));
        assert_eq!(fragment.params[0], QueryParam::Text("age".to_string()));
    }

    #[test]
    fn over_filter_nests_as_subquery_with_other_clauses() {
        let whitelist = vec!["age".to_string()];
        let fragment = build_over_filter(&whitelist, 18.0, ">=", true);
        assert!(fragment.sql.contains("IN (SELECT"));
    }

    #[test]
    fn natural_language_filter_ands_extra_contexts_with_or_group() {
        let expansions = vec![("born_in".to_string(), "city".to_string())];
        let extra = vec!["country".to_string()];
        let fragment = build_natural_language_filter(&expansions, &extra);
        assert!(fragment.sql.contains(" AND contexts LIKE"));
    }
}
