//! Converts external ingestion items into attestations and persists them
//! through the bounded store, reporting per-item outcomes (§4.9).

use crate::bounded::BoundedStore;
use crate::traits::{AttestationBackend, IdGenerator, IdSeed};
use crate::types::{Attestation, PersistenceResult};
use crate::warnings::Warning;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// One external ingestion item: a (subject, predicate, object/context)
/// triple plus a free-form metadata map.
#[derive(Debug, Clone)]
pub struct IngestionItem {
    /// The subject the item is about.
    pub subject: String,
    /// The predicate the item asserts.
    pub predicate: String,
    /// The object/context of the assertion.
    pub object: String,
    /// The actor responsible for the assertion; empty means self-certifying.
    pub actor: String,
    /// Free-form origin tag used to seed ID generation.
    pub source_prefix: String,
    /// Free-form metadata, persisted as the attestation's attributes.
    pub meta: HashMap<String, Value>,
}

/// Converts ingestion items to attestations and persists them via the
/// bounded store.
pub struct BatchPersister<B, I> {
    store: Arc<BoundedStore<B>>,
    id_generator: Arc<I>,
    source: String,
}

impl<B: AttestationBackend, I: IdGenerator> BatchPersister<B, I> {
    /// Wrap a bounded store and ID generator. `source` is stamped onto every
    /// attestation produced.
    pub fn new(store: Arc<BoundedStore<B>>, id_generator: Arc<I>, source: impl Into<String>) -> Self {
        Self { store, id_generator, source: source.into() }
    }

    /// Persist a batch of ingestion items, collecting per-item success or
    /// failure into a [`PersistenceResult`]. Warnings are deduplicated by
    /// `actor|context`.
    pub async fn persist(&self, items: Vec<IngestionItem>) -> PersistenceResult {
        let mut result = PersistenceResult::default();
        let mut seen_warning_keys = HashSet::new();

        for item in items {
            match self.persist_one(&item).await {
                Ok(warnings) => {
                    result.persisted_count += 1;
                    for warning in warnings {
                        let key = format!("{}|{}", warning.actor, warning.context);
                        if seen_warning_keys.insert(key) {
                            result.warnings.push(warning);
                        }
                    }
                }
                Err(message) => {
                    warn!(subject = %item.subject, predicate = %item.predicate, error = %message, "ingestion item failed");
                    result.failure_count += 1;
                    result.errors.push(message);
                }
            }
        }

        result.recompute_success_rate();
        result
    }

    async fn persist_one(&self, item: &IngestionItem) -> Result<Vec<Warning>, String> {
        let seed = IdSeed {
            subject: &item.subject,
            predicate: &item.predicate,
            source_prefix: &item.source_prefix,
            actor_seed: &item.actor,
        };
        let id = self.id_generator.generate(seed);
        let actor = if item.actor.is_empty() { id.clone() } else { item.actor.clone() };

        let attestation = Attestation {
            id,
            subjects: vec![item.subject.clone()],
            predicates: vec![item.predicate.clone()],
            contexts: vec![item.object.clone()],
            actors: vec![actor],
            timestamp: Utc::now(),
            source: self.source.clone(),
            attributes: Some(item.meta.clone()),
            created_at: Utc::now(),
        };

        self.store.create(&attestation).await.map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded::BoundedStoreConfig;
    use crate::error::Result;
    use crate::query::QueryParam;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct CountingIdGenerator(AtomicUsize);

    impl IdGenerator for CountingIdGenerator {
        fn generate(&self, _seed: IdSeed<'_>) -> String {
            format!("AS-{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        rows: AsyncMutex<Vec<Attestation>>,
    }

    #[async_trait]
    impl AttestationBackend for FakeBackend {
        async fn insert(&self, attestation: &Attestation) -> Result<()> {
            self.rows.lock().await.push(attestation.clone());
            Ok(())
        }
        async fn get(&self, _: &str) -> Result<Option<Attestation>> {
            Ok(None)
        }
        async fn query(&self, _: &str, _: &[QueryParam], _: i64) -> Result<Vec<Attestation>> {
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

    fn item(subject: &str, actor: &str) -> IngestionItem {
        IngestionItem {
            subject: subject.to_string(),
            predicate: "speaks".to_string(),
            object: "Dutch".to_string(),
            actor: actor.to_string(),
            source_prefix: "test".to_string(),
            meta: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn empty_actor_becomes_self_certifying() {
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(BoundedStore::new(backend.clone(), BoundedStoreConfig::default()));
        let generator = Arc::new(CountingIdGenerator(AtomicUsize::new(0)));
        let persister = BatchPersister::new(store, generator, "test");

        let result = persister.persist(vec![item("ALICE", "")]).await;
        assert_eq!(result.persisted_count, 1);
        assert_eq!(result.failure_count, 0);

        let rows = backend.rows.lock().await;
        assert_eq!(rows[0].actors, vec![rows[0].id.clone()]);
    }

    #[tokio::test]
    async fn success_rate_is_computed_as_percent() {
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(BoundedStore::new(backend, BoundedStoreConfig::default()));
        let generator = Arc::new(CountingIdGenerator(AtomicUsize::new(0)));
        let persister = BatchPersister::new(store, generator, "test");

        let result = persister.persist(vec![item("ALICE", "u@x"), item("BOB", "u@x")]).await;
        assert!((result.success_rate - 100.0).abs() < f64::EPSILON);
    }
}
