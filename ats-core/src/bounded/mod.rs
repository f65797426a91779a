//! Bounded-retention enforcement (§4.5). Wraps an [`AttestationBackend`] and,
//! after every successful insert, enforces three independent quota
//! dimensions in order. Enforcement runs outside any transaction: a crash
//! mid-pass can leave the store transiently over quota, corrected on the
//! next insert touching the same dimension.

use crate::constants::{
    resolve_limit, DEFAULT_ACTOR_CONTEXTS_LIMIT, DEFAULT_ACTOR_CONTEXT_LIMIT,
    DEFAULT_ENTITY_ACTORS_LIMIT,
};
use crate::error::{Error, Result};
use crate::traits::{AttestationBackend, IdGenerator, IdSeed};
use crate::types::{Attestation, CreateAttestationCommand};
use crate::warnings::{self, Warning};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Configured quota limits. A negative value falls back to the built-in
/// default; zero is honoured literally ("zero means zero").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedStoreConfig {
    /// Max attestations per (actor, context) pair.
    pub actor_context_limit: i64,
    /// Max distinct context-arrays per actor.
    pub actor_contexts_limit: i64,
    /// Max distinct actors per subject.
    pub entity_actors_limit: i64,
}

impl Default for BoundedStoreConfig {
    fn default() -> Self {
        Self {
            actor_context_limit: DEFAULT_ACTOR_CONTEXT_LIMIT,
            actor_contexts_limit: DEFAULT_ACTOR_CONTEXTS_LIMIT,
            entity_actors_limit: DEFAULT_ENTITY_ACTORS_LIMIT,
        }
    }
}

impl BoundedStoreConfig {
    /// Resolve negative limits to their built-in defaults.
    #[must_use]
    pub fn resolved(&self) -> Self {
        Self {
            actor_context_limit: resolve_limit(self.actor_context_limit, DEFAULT_ACTOR_CONTEXT_LIMIT),
            actor_contexts_limit: resolve_limit(self.actor_contexts_limit, DEFAULT_ACTOR_CONTEXTS_LIMIT),
            entity_actors_limit: resolve_limit(self.entity_actors_limit, DEFAULT_ENTITY_ACTORS_LIMIT),
        }
    }
}

/// Wraps an [`AttestationBackend`], enforcing bounded retention after every
/// insert.
pub struct BoundedStore<B> {
    backend: Arc<B>,
    config: BoundedStoreConfig,
}

impl<B: AttestationBackend> BoundedStore<B> {
    /// Wrap `backend`, resolving any negative configured limits to defaults.
    pub fn new(backend: Arc<B>, config: BoundedStoreConfig) -> Self {
        Self {
            backend,
            config: config.resolved(),
        }
    }

    /// Insert `attestation`, then enforce all three quota dimensions for its
    /// facets. Enforcement failures are logged and swallowed; the insert
    /// always stands.
    pub async fn create(&self, attestation: &Attestation) -> Result<Vec<Warning>> {
        self.backend.insert(attestation).await?;

        if attestation.is_self_certifying() {
            debug!(id = %attestation.id, "self-certifying attestation exempt from quota enforcement");
            return Ok(Vec::new());
        }

        let mut warnings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for actor in &attestation.actors {
            for context in &attestation.contexts {
                if !seen.insert((actor.clone(), context.clone())) {
                    continue;
                }
                if let Err(err) = self.enforce_actor_context(actor, context).await {
                    warn!(actor, context, stage = "actor_context", error = %err, "quota enforcement failed");
                }
                if let Err(err) = self.enforce_actor_contexts(actor).await {
                    warn!(actor, stage = "actor_contexts", error = %err, "quota enforcement failed");
                }
                match warnings::evaluate(&*self.backend, actor, context, self.config.actor_context_limit).await {
                    Ok(Some(w)) => warnings.push(w),
                    Ok(None) => {}
                    Err(err) => warn!(actor, context, stage = "warnings", error = %err, "predictive warning computation failed"),
                }
            }
        }

        for subject in &attestation.subjects {
            if let Err(err) = self.enforce_entity_actors(subject).await {
                warn!(subject, stage = "entity_actors", error = %err, "quota enforcement failed");
            }
        }

        Ok(warnings)
    }

    /// Boolean existence check. A missing row or any backend error is
    /// observationally equivalent to absent (§4.3).
    pub async fn exists(&self, id: &str) -> bool {
        matches!(self.backend.get(id).await, Ok(Some(_)))
    }

    /// Fetch one attestation by ID.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the row does not exist, or propagates
    /// any backend error.
    pub async fn get(&self, id: &str) -> Result<Attestation> {
        self.backend.get(id).await?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Allocate a vanity ID via `id_generator` (retrying on collision, via
    /// [`Self::exists`]), force the attestation to be self-certifying, then
    /// create it (§4.3 `generate_and_create`).
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn generate_and_create<I: IdGenerator>(
        &self,
        cmd: CreateAttestationCommand,
        id_generator: &I,
    ) -> Result<(Attestation, Vec<Warning>)> {
        let seed = IdSeed {
            subject: cmd.subjects.first().map_or("", String::as_str),
            predicate: cmd.predicates.first().map_or("", String::as_str),
            source_prefix: &cmd.source,
            actor_seed: cmd.actors.first().map_or("", String::as_str),
        };

        let mut id = id_generator.generate(seed);
        while self.exists(&id).await {
            id = id_generator.generate(seed);
        }

        let mut attestation = Attestation {
            id,
            subjects: cmd.subjects,
            predicates: cmd.predicates,
            contexts: cmd.contexts,
            actors: cmd.actors,
            timestamp: cmd.timestamp,
            source: cmd.source,
            attributes: cmd.attributes,
            created_at: Utc::now(),
        };
        attestation.make_self_certifying();

        let warnings = self.create(&attestation).await?;
        Ok((attestation, warnings))
    }

    /// Dimension 1: at most `actor_context_limit` attestations per (actor,
    /// context). Deletes the oldest rows exceeding the limit.
    async fn enforce_actor_context(&self, actor: &str, context: &str) -> Result<()> {
        let limit = self.config.actor_context_limit;
        let count = self.backend.count_actor_context(actor, context).await?;
        if count <= limit {
            return Ok(());
        }
        // `actor_context_usage` returns oldest-first; the excess rows whose
        // facets include this context are the ones to evict.
        let rows = self.backend.actor_context_usage(actor).await?;
        let matching: Vec<&(String, Vec<String>, DateTime<Utc>)> = rows
            .iter()
            .filter(|(_, contexts, _)| contexts.iter().any(|c| c.eq_ignore_ascii_case(context)))
            .collect();
        let excess = (count - limit).max(0) as usize;
        let to_delete: Vec<String> = matching.iter().take(excess).map(|(id, ..)| id.clone()).collect();
        if !to_delete.is_empty() {
            self.backend.delete_many(&to_delete).await?;
        }
        Ok(())
    }

    /// Dimension 2: at most `actor_contexts_limit` distinct context-arrays
    /// per actor. Retains the top-`limit` by usage count, ties broken by
    /// most recent; deletes attestations carrying the least-used arrays.
    async fn enforce_actor_contexts(&self, actor: &str) -> Result<()> {
        let limit = self.config.actor_contexts_limit;
        let rows = self.backend.actor_context_usage(actor).await?;

        let mut usage: HashMap<Vec<String>, (usize, DateTime<Utc>, Vec<String>)> = HashMap::new();
        for (id, contexts, created_at) in &rows {
            let key = contexts.clone();
            let entry = usage.entry(key).or_insert((0, *created_at, Vec::new()));
            entry.0 += 1;
            if *created_at > entry.1 {
                entry.1 = *created_at;
            }
            entry.2.push(id.clone());
        }

        if (usage.len() as i64) <= limit {
            return Ok(());
        }

        let mut ranked: Vec<(Vec<String>, usize, DateTime<Utc>, Vec<String>)> = usage
            .into_iter()
            .map(|(contexts, (count, recency, ids))| (contexts, count, recency, ids))
            .collect();
        // Highest usage first, ties broken by most recent.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

        let keep = limit.max(0) as usize;
        let mut to_delete = Vec::new();
        for (_, _, _, ids) in ranked.into_iter().skip(keep) {
            to_delete.extend(ids);
        }
        if !to_delete.is_empty() {
            self.backend.delete_many(&to_delete).await?;
        }
        Ok(())
    }

    /// Dimension 3: at most `entity_actors_limit` distinct actors per
    /// subject. Deletes attestations by the least-recent actors.
    async fn enforce_entity_actors(&self, subject: &str) -> Result<()> {
        let limit = self.config.entity_actors_limit;
        let rows = self.backend.subject_actor_recency(subject).await?;

        let mut by_actor: HashMap<String, (DateTime<Utc>, Vec<String>)> = HashMap::new();
        for (id, actors, created_at) in &rows {
            let Some(actor) = actors.first() else { continue };
            let entry = by_actor
                .entry(actor.clone())
                .or_insert((*created_at, Vec::new()));
            if *created_at > entry.0 {
                entry.0 = *created_at;
            }
            entry.1.push(id.clone());
        }

        if (by_actor.len() as i64) <= limit {
            return Ok(());
        }

        let mut ranked: Vec<(String, DateTime<Utc>, Vec<String>)> =
            by_actor.into_iter().map(|(actor, (recency, ids))| (actor, recency, ids)).collect();
        // Most recent first; least-recent actors are dropped beyond `limit`.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let keep = limit.max(0) as usize;
        let mut to_delete = Vec::new();
        for (_, _, ids) in ranked.into_iter().skip(keep) {
            to_delete.extend(ids);
        }
        if !to_delete.is_empty() {
            self.backend.delete_many(&to_delete).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_config_resolves_to_defaults() {
        let config = BoundedStoreConfig {
            actor_context_limit: -1,
            actor_contexts_limit: -1,
            entity_actors_limit: -1,
        }
        .resolved();
        assert_eq!(config.actor_context_limit, DEFAULT_ACTOR_CONTEXT_LIMIT);
        assert_eq!(config.actor_contexts_limit, DEFAULT_ACTOR_CONTEXTS_LIMIT);
        assert_eq!(config.entity_actors_limit, DEFAULT_ENTITY_ACTORS_LIMIT);
    }

    #[test]
    fn zero_config_means_zero() {
        let config = BoundedStoreConfig {
            actor_context_limit: 0,
            actor_contexts_limit: 0,
            entity_actors_limit: 0,
        }
        .resolved();
        assert_eq!(config.actor_context_limit, 0);
        assert_eq!(config.actor_contexts_limit, 0);
        assert_eq!(config.entity_actors_limit, 0);
    }

    use crate::query::QueryParam;
    use crate::traits::IdSeed;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct FakeBackend {
        rows: AsyncMutex<Vec<Attestation>>,
    }

    #[async_trait]
    impl AttestationBackend for FakeBackend {
        async fn insert(&self, attestation: &Attestation) -> Result<()> {
            let mut rows = self.rows.lock().await;
            if rows.iter().any(|a| a.id == attestation.id) {
                return Err(Error::ConstraintViolation(format!("duplicate id {}", attestation.id)));
            }
            rows.push(attestation.clone());
            Ok(())
        }
        async fn get(&self, id: &str) -> Result<Option<Attestation>> {
            Ok(self.rows.lock().await.iter().find(|a| a.id == id).cloned())
        }
        async fn query(&self, _: &str, _: &[QueryParam], _: i64) -> Result<Vec<Attestation>> {
            Ok(Vec::new())
        }
        async fn delete_many(&self, ids: &[String]) -> Result<usize> {
            let mut rows = self.rows.lock().await;
            let before = rows.len();
            rows.retain(|a| !ids.contains(&a.id));
            Ok(before - rows.len())
        }
        async fn count_actor_context(&self, actor: &str, context: &str) -> Result<i64> {
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .filter(|a| a.actors.iter().any(|x| x == actor) && a.contexts.iter().any(|c| c.eq_ignore_ascii_case(context)))
                .count() as i64)
        }
        async fn actor_context_usage(&self, actor: &str) -> Result<Vec<(String, Vec<String>, DateTime<Utc>)>> {
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .filter(|a| a.actors.iter().any(|x| x == actor))
                .map(|a| (a.id.clone(), a.contexts.clone(), a.timestamp))
                .collect())
        }
        async fn subject_actor_recency(&self, subject: &str) -> Result<Vec<(String, Vec<String>, DateTime<Utc>)>> {
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .filter(|a| a.subjects.iter().any(|s| s == subject))
                .map(|a| (a.id.clone(), a.actors.clone(), a.timestamp))
                .collect())
        }
        async fn count_created_between(&self, _: &str, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<i64> {
            Ok(0)
        }
    }

    struct CountingIdGenerator(AtomicUsize);

    impl IdGenerator for CountingIdGenerator {
        fn generate(&self, _seed: IdSeed<'_>) -> String {
            format!("AS-{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn exists_is_false_for_missing_row() {
        let store = BoundedStore::new(Arc::new(FakeBackend::default()), BoundedStoreConfig::default());
        assert!(!store.exists("AS-1").await);
    }

    #[tokio::test]
    async fn generate_and_create_forces_self_certifying() {
        let store = BoundedStore::new(Arc::new(FakeBackend::default()), BoundedStoreConfig::default());
        let generator = CountingIdGenerator(AtomicUsize::new(0));
        let cmd = CreateAttestationCommand {
            subjects: vec!["ALICE".to_string()],
            predicates: vec!["speaks".to_string()],
            contexts: vec!["Dutch".to_string()],
            actors: vec!["u@x".to_string()],
            timestamp: Utc::now(),
            source: "t".to_string(),
            attributes: None,
        };
        let (attestation, _warnings) = store.generate_and_create(cmd, &generator).await.unwrap();
        assert_eq!(attestation.actors, vec![attestation.id.clone()]);
        assert!(store.exists(&attestation.id).await);
    }
}
