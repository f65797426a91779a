//! Turns a [`Filter`] into rows: alias expansion, natural-language mapping,
//! OVER comparison, WHERE construction, execution (§4.6).

use crate::alias::AliasResolver;
use crate::constants::{DEFAULT_EXECUTOR_LIMIT, GLOBAL_RETRIEVAL_CAP};
use crate::error::Result;
use crate::query::{build_facet_filter, build_over_filter, build_temporal_filters, QueryParam};
use crate::traits::{AliasBackend, AttestationBackend, QueryExpander};
use crate::types::{Conflict, Filter, QueryResult};
use async_trait::async_trait;
use std::sync::Arc;

/// A post-query conflict-detection pass (evolution/verification/conflict
/// labelling, §4.6 step 5, §9 Open Question). The default implementation
/// never produces any conflicts.
#[async_trait]
pub trait ConflictPass: Send + Sync {
    /// Inspect `attestations` and return any conflicts found among them.
    async fn detect(&self, attestations: &[crate::types::Attestation]) -> Vec<Conflict>;
}

/// A [`ConflictPass`] that always returns an empty conflict list.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConflictDetection;

#[async_trait]
impl ConflictPass for NoConflictDetection {
    async fn detect(&self, _attestations: &[crate::types::Attestation]) -> Vec<Conflict> {
        Vec::new()
    }
}

/// Runs the filter-to-rows pipeline over an attestation backend, alias
/// resolver, query expander, and conflict pass.
pub struct QueryExecutor<B, A, X, C = NoConflictDetection> {
    backend: Arc<B>,
    aliases: AliasResolver<A>,
    expander: X,
    conflicts: C,
}

impl<B, A, X> QueryExecutor<B, A, X, NoConflictDetection>
where
    B: AttestationBackend,
    A: AliasBackend,
    X: QueryExpander,
{
    /// Wrap the pipeline's dependencies, using the no-op conflict pass.
    pub fn new(backend: Arc<B>, aliases: AliasResolver<A>, expander: X) -> Self {
        Self { backend, aliases, expander, conflicts: NoConflictDetection }
    }
}

impl<B, A, X, C> QueryExecutor<B, A, X, C>
where
    B: AttestationBackend,
    A: AliasBackend,
    X: QueryExpander,
    C: ConflictPass,
{
    /// Wrap the pipeline's dependencies with an explicit conflict pass.
    pub fn with_conflict_pass(backend: Arc<B>, aliases: AliasResolver<A>, expander: X, conflicts: C) -> Self {
        Self { backend, aliases, expander, conflicts }
    }

    /// Run the full pipeline for `filter`.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn execute(&self, filter: Filter) -> Result<QueryResult> {
        let mut filter = filter;

        // Step 1: alias expansion over subjects, actors, contexts.
        filter.subjects = self.expand_facet(&filter.subjects).await?;
        filter.actors = self.expand_facet(&filter.actors).await?;
        filter.contexts = self.expand_facet(&filter.contexts).await?;

        // Step 2: natural-language mapping.
        let mut nl_expansions: Vec<(String, String)> = Vec::new();
        if let Some(first_predicate) = filter.predicates.first() {
            if self
                .expander
                .natural_language_predicates()
                .iter()
                .any(|p| p.eq_ignore_ascii_case(first_predicate))
            {
                nl_expansions = self.expander.expand_predicate(first_predicate, &filter.predicates);
                if !nl_expansions.is_empty() {
                    filter.predicates.clear();
                }
            }
        }

        // Step 3 + 4: compose WHERE body and bound params.
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<QueryParam> = Vec::new();
        let mut has_over = false;

        if !filter.subjects.is_empty() {
            let fragment = build_facet_filter("subjects", &filter.subjects, false);
            clauses.push(fragment.sql);
            params.extend(fragment.params);
        }
        if !nl_expansions.is_empty() {
            let fragment = crate::query::build_natural_language_filter(&nl_expansions, &[]);
            clauses.push(fragment.sql);
            params.extend(fragment.params);
        } else if !filter.predicates.is_empty() {
            let fragment = build_facet_filter("predicates", &filter.predicates, false);
            clauses.push(fragment.sql);
            params.extend(fragment.params);
        }
        if !filter.contexts.is_empty() {
            let fragment = build_facet_filter("contexts", &filter.contexts, true);
            clauses.push(fragment.sql);
            params.extend(fragment.params);
        }
        if !filter.actors.is_empty() {
            let fragment = build_facet_filter("actors", &filter.actors, false);
            clauses.push(fragment.sql);
            params.extend(fragment.params);
        }

        let temporal = build_temporal_filters(
            filter.time_start.map(|t| t.timestamp()),
            filter.time_end.map(|t| t.timestamp()),
        );
        if !temporal.sql.is_empty() {
            clauses.push(temporal.sql);
            params.extend(temporal.params);
        }

        if let Some(over) = &filter.over_comparison {
            has_over = true;
            let whitelist = self.expander.numeric_predicates();
            let fragment = build_over_filter(&whitelist, over.canonical_threshold(), over.operator.as_sql(), !clauses.is_empty());
            if !fragment.sql.is_empty() {
                clauses.push(fragment.sql);
                params.extend(fragment.params);
            }
        }

        let where_sql = if clauses.is_empty() { "1=1".to_string() } else { clauses.join(" AND ") };

        let limit = if has_over {
            GLOBAL_RETRIEVAL_CAP
        } else {
            let requested = filter.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_EXECUTOR_LIMIT);
            requested.min(GLOBAL_RETRIEVAL_CAP)
        };

        // Step 5: execution.
        let attestations = self.backend.query(&where_sql, &params, limit).await?;
        let conflicts = self.conflicts.detect(&attestations).await;

        Ok(QueryResult::new(attestations, conflicts))
    }

    async fn expand_facet(&self, values: &[String]) -> Result<Vec<String>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let mut expanded = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for value in values {
            for candidate in self.aliases.resolve(value).await? {
                if seen.insert(candidate.clone()) {
                    expanded.push(candidate);
                }
            }
        }
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NullExpander;
    use crate::types::Alias;
    use crate::types::Attestation;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct EmptyAliasBackend;

    #[async_trait]
    impl AliasBackend for EmptyAliasBackend {
        async fn insert_pair(&self, _: &Alias, _: &Alias) -> Result<()> {
            Ok(())
        }
        async fn resolve_one(&self, _: &str) -> Result<Option<Alias>> {
            Ok(None)
        }
        async fn all_for(&self, _: &str) -> Result<Vec<Alias>> {
            Ok(Vec::new())
        }
        async fn remove_all_for(&self, _: &str) -> Result<usize> {
            Ok(0)
        }
        async fn remove_pair(&self, _: &str, _: &str) -> Result<usize> {
            Ok(0)
        }
    }

    struct RecordingBackend {
        last_where: tokio::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl AttestationBackend for RecordingBackend {
        async fn insert(&self, _: &Attestation) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _: &str) -> Result<Option<Attestation>> {
            Ok(None)
        }
        async fn query(&self, where_sql: &str, _: &[QueryParam], _: i64) -> Result<Vec<Attestation>> {
            *self.last_where.lock().await = Some(where_sql.to_string());
            Ok(Vec::new())
        }
        async fn delete_many(&self, _: &[String]) -> Result<usize> {
            Ok(0)
        }
        async fn count_actor_context(&self, _: &str, _: &str) -> Result<i64> {
            Ok(0)
        }
        async fn actor_context_usage(&self, _: &str) -> Result<Vec<(String, Vec<String>, DateTime<Utc>)>> {
            Ok(Vec::new())
        }
        async fn subject_actor_recency(&self, _: &str) -> Result<Vec<(String, Vec<String>, DateTime<Utc>)>> {
            Ok(Vec::new())
        }
        async fn count_created_between(&self, _: &str, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<i64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn empty_filter_queries_without_clauses() {
        let backend = Arc::new(RecordingBackend { last_where: tokio::sync::Mutex::new(None) });
        let aliases = AliasResolver::new(Arc::new(EmptyAliasBackend));
        let executor = QueryExecutor::new(backend.clone(), aliases, NullExpander);

        executor.execute(Filter::default()).await.unwrap();
        assert_eq!(backend.last_where.lock().await.as_deref(), Some("1=1"));
    }

    #[tokio::test]
    async fn facet_filter_is_included_in_where_clause() {
        let backend = Arc::new(RecordingBackend { last_where: tokio::sync::Mutex::new(None) });
        let aliases = AliasResolver::new(Arc::new(EmptyAliasBackend));
        let executor = QueryExecutor::new(backend.clone(), aliases, NullExpander);

        let filter = Filter { subjects: vec!["ALICE".to_string()], ..Default::default() };
        executor.execute(filter).await.unwrap();
        let where_sql = backend.last_where.lock().await.clone().unwrap();
        assert!(where_sql.contains("subjects LIKE"));
    }
}
