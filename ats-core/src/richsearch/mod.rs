//! Rich-text fuzzy search over attribute fields declared searchable by
//! type-definition attestations (§4.8).

use crate::constants::{
    RICH_SEARCH_CACHE_TTL_SECS, RICH_SEARCH_EXACT_RESULT_CAP, RICH_SEARCH_EXCERPT_LEN,
    RICH_SEARCH_SCAN_CAP, RICH_SEARCH_SEQUENTIAL_BOOST, RICH_SEARCH_SEQUENTIAL_WINDOW,
    RICH_SEARCH_VOCAB_CAP,
};
use crate::error::Result;
use crate::query::{build_facet_filter, QueryParam};
use crate::traits::{AttestationBackend, FuzzyMatcher};
use crate::types::Attestation;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One rich-search match.
#[derive(Debug, Clone, PartialEq)]
pub struct RichSearchHit {
    /// The matched attestation's ID.
    pub attestation_id: String,
    /// Combined match score.
    pub score: f64,
    /// Which matching strategy produced this hit.
    pub strategy: &'static str,
    /// The tokens that matched, for caller-side highlighting.
    pub matched_words: Vec<String>,
    /// A short excerpt centred on the first match, word-boundary trimmed.
    pub excerpt: String,
}

/// The result of a rich-search call.
#[derive(Debug, Clone, Default)]
pub struct RichSearchResult {
    /// Matches, sorted by score descending, truncated to the caller's limit.
    pub hits: Vec<RichSearchHit>,
    /// Set when the fuzzy matcher backend is unavailable and the engine
    /// fell back to pure substring matching.
    pub degraded: bool,
    /// Human-readable detail when `degraded` is set.
    pub warning: Option<String>,
}

struct FieldCache {
    fields: Vec<String>,
    fetched_at: Instant,
}

/// Discovers searchable fields from type-definition attestations, builds an
/// in-memory vocabulary, and performs typo-tolerant multi-word matching.
pub struct RichSearchEngine<B, M> {
    backend: std::sync::Arc<B>,
    matcher: M,
    cache: Mutex<Option<FieldCache>>,
}

impl<B: AttestationBackend, M: FuzzyMatcher> RichSearchEngine<B, M> {
    /// Wrap `backend`, using `matcher` for the fuzzy path.
    pub fn new(backend: std::sync::Arc<B>, matcher: M) -> Self {
        Self { backend, matcher, cache: Mutex::new(None) }
    }

    /// Discover the current searchable field set, honouring the 5-minute
    /// cache TTL.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn discover_fields(&self) -> Result<Vec<String>> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.fetched_at.elapsed() < Duration::from_secs(RICH_SEARCH_CACHE_TTL_SECS) {
                    return Ok(entry.fields.clone());
                }
            }
        }

        let predicate_filter = build_facet_filter("predicates", &["type".to_string()], false);
        let context_filter = build_facet_filter("contexts", &["graph".to_string()], true);
        let where_sql = format!("{} AND {}", predicate_filter.sql, context_filter.sql);
        let mut params: Vec<QueryParam> = Vec::new();
        params.extend(predicate_filter.params);
        params.extend(context_filter.params);

        let type_defs = self.backend.query(&where_sql, &params, crate::constants::GLOBAL_RETRIEVAL_CAP).await?;

        let mut fields = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for attestation in &type_defs {
            let Some(attributes) = &attestation.attributes else { continue };
            let Some(list) = attributes.get("rich_string_fields") else { continue };
            let Some(array) = list.as_array() else { continue };
            for entry in array {
                if let Some(field) = entry.as_str() {
                    if seen.insert(field.to_string()) {
                        fields.push(field.to_string());
                    }
                }
            }
        }

        *self.cache.lock() = Some(FieldCache { fields: fields.clone(), fetched_at: Instant::now() });
        Ok(fields)
    }

    /// Search rich-text fields for `query`, returning at most `limit` hits.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn search(&self, query: &str, limit: usize) -> Result<RichSearchResult> {
        let fields = self.discover_fields().await?;
        if fields.is_empty() {
            return Ok(RichSearchResult::default());
        }

        let tokens = tokenize_query(query);
        if tokens.len() <= 1 {
            let exact = self.exact_search(query, &fields, limit).await?;
            if !exact.is_empty() {
                return Ok(RichSearchResult { hits: exact, degraded: false, warning: None });
            }
        }

        self.fuzzy_search(&tokens, &fields, limit).await
    }

    async fn exact_search(&self, query: &str, fields: &[String], limit: usize) -> Result<Vec<RichSearchHit>> {
        let rows = self.scan_rows().await?;
        let query_lower = query.to_lowercase();
        let mut hits = Vec::new();

        for row in rows.iter().take(RICH_SEARCH_SCAN_CAP) {
            let Some(values) = collect_field_values(row, fields) else { continue };
            for value in &values {
                let lower = value.to_lowercase();
                if let Some(pos) = lower.find(&query_lower) {
                    let score = 1.0 - (pos as f64 / value.len().max(1) as f64) * 0.5;
                    hits.push(RichSearchHit {
                        attestation_id: row.id.clone(),
                        score,
                        strategy: "substring",
                        matched_words: vec![query.to_string()],
                        excerpt: excerpt_around(value, pos, query.len()),
                    });
                    break;
                }
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit.min(RICH_SEARCH_EXACT_RESULT_CAP));
        Ok(hits)
    }

    async fn fuzzy_search(&self, query_tokens: &[String], fields: &[String], limit: usize) -> Result<RichSearchResult> {
        let rows = self.scan_rows().await?;

        let mut vocabulary = Vec::new();
        let mut seen = std::collections::HashSet::new();
        'outer: for row in rows.iter().take(RICH_SEARCH_SCAN_CAP) {
            let Some(values) = collect_field_values(row, fields) else { continue };
            for value in &values {
                for token in tokenize_field(value) {
                    if seen.insert(token.clone()) {
                        vocabulary.push(token);
                        if vocabulary.len() >= RICH_SEARCH_VOCAB_CAP {
                            break 'outer;
                        }
                    }
                }
            }
        }

        let mut per_token_candidates: HashMap<String, Vec<(String, f64)>> = HashMap::new();
        for token in query_tokens {
            let matches = self.matcher.find_matches(token, &vocabulary, 10, 0.0);
            let candidates = if matches.is_empty() {
                vec![(token.clone(), 0.7)]
            } else {
                matches
            };
            per_token_candidates.insert(token.clone(), candidates);
        }

        let mut hits = Vec::new();
        for row in rows.iter().take(RICH_SEARCH_SCAN_CAP) {
            let Some(values) = collect_field_values(row, fields) else { continue };
            if let Some(hit) = score_row(row, &values, query_tokens, &per_token_candidates) {
                hits.push(hit);
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(RichSearchResult { hits, degraded: false, warning: None })
    }

    async fn scan_rows(&self) -> Result<Vec<Attestation>> {
        self.backend.query("1=1", &[], RICH_SEARCH_SCAN_CAP as i64).await
    }
}

fn collect_field_values(attestation: &Attestation, fields: &[String]) -> Option<Vec<String>> {
    let attributes = attestation.attributes.as_ref()?;
    let mut values = Vec::new();
    for field in fields {
        if let Some(value) = attributes.get(field).and_then(|v| v.as_str()) {
            values.push(value.to_string());
        }
    }
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|t| t.len() > 1)
        .collect()
}

fn tokenize_field(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|t| t.len() > 1)
        .collect()
}

fn score_row(
    attestation: &Attestation,
    values: &[String],
    query_tokens: &[String],
    per_token_candidates: &HashMap<String, Vec<(String, f64)>>,
) -> Option<RichSearchHit> {
    let mut best_per_token: HashMap<&String, f64> = HashMap::new();
    let mut matched_words = Vec::new();
    let mut positions: Vec<usize> = Vec::new();
    let mut raw_field_for_excerpt: Option<(&String, usize)> = None;

    for value in values {
        let words = tokenize_field(value);
        for query_token in query_tokens {
            let Some(candidates) = per_token_candidates.get(query_token) else { continue };
            for (candidate, score) in candidates {
                if words.contains(candidate) {
                    let entry = best_per_token.entry(query_token).or_insert(0.0);
                    if *score > *entry {
                        *entry = *score;
                    }
                    if !matched_words.contains(candidate) {
                        matched_words.push(candidate.clone());
                    }
                    if let Some(pos) = value.to_lowercase().find(&candidate.to_lowercase()) {
                        positions.push(pos);
                        if raw_field_for_excerpt.is_none() {
                            raw_field_for_excerpt = Some((value, pos));
                        }
                    }
                }
            }
        }
    }

    // Substring fallback (score 0.6) for any still-unmatched query token.
    for query_token in query_tokens {
        if best_per_token.contains_key(query_token) {
            continue;
        }
        for value in values {
            let lower = value.to_lowercase();
            if let Some(pos) = lower.find(query_token.as_str()) {
                best_per_token.insert(query_token, 0.6);
                if !matched_words.contains(query_token) {
                    matched_words.push(query_token.clone());
                }
                positions.push(pos);
                if raw_field_for_excerpt.is_none() {
                    raw_field_for_excerpt = Some((value, pos));
                }
                break;
            }
        }
    }

    if best_per_token.is_empty() {
        return None;
    }

    let matched_count = best_per_token.len();
    let total = query_tokens.len().max(1);
    let mean_score: f64 = best_per_token.values().sum::<f64>() / matched_count as f64;
    let mut final_score = mean_score * (matched_count as f64 / total as f64);

    positions.sort_unstable();
    let sequential = positions.len() > 1
        && positions.windows(2).all(|w| w[1] >= w[0] && w[1] - w[0] <= RICH_SEARCH_SEQUENTIAL_WINDOW);
    if sequential {
        final_score = (final_score * RICH_SEARCH_SEQUENTIAL_BOOST).min(1.0);
    }

    let strategy = if matched_count == total { "fuzzy:all-words" } else { "fuzzy:partial" };

    let excerpt = raw_field_for_excerpt
        .map(|(value, pos)| excerpt_around(value, pos, 1))
        .unwrap_or_default();

    Some(RichSearchHit {
        attestation_id: attestation.id.clone(),
        score: final_score,
        strategy,
        matched_words,
        excerpt,
    })
}

fn excerpt_around(text: &str, byte_pos: usize, match_len: usize) -> String {
    let len = text.len();
    let half_window = RICH_SEARCH_EXCERPT_LEN / 2;
    let start = byte_pos.saturating_sub(half_window);
    let end = (byte_pos + match_len + half_window).min(len);

    let start = next_char_boundary(text, start);
    let end = prev_char_boundary(text, end);

    let mut excerpt = text[start..end].to_string();
    if start > 0 {
        excerpt = format!("...{excerpt}");
    }
    if end < len {
        excerpt = format!("{excerpt}...");
    }
    excerpt
}

fn next_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn prev_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_query_drops_single_character_tokens() {
        let tokens = tokenize_query("a fuzzy word, please!");
        assert_eq!(tokens, vec!["fuzzy".to_string(), "word".to_string(), "please".to_string()]);
    }

    #[test]
    fn excerpt_adds_ellipses_on_truncation() {
        let text = "x".repeat(400);
        let excerpt = excerpt_around(&text, 200, 1);
        assert!(excerpt.starts_with("..."));
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn excerpt_has_no_leading_ellipsis_at_start() {
        let excerpt = excerpt_around("short text here", 0, 5);
        assert!(!excerpt.starts_with("..."));
    }
}
