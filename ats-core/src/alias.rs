//! Bidirectional alias resolution (§4.4).

use crate::error::{Error, Result};
use crate::traits::AliasBackend;
use crate::types::Alias;
use chrono::Utc;
use std::sync::Arc;

/// Wraps an [`AliasBackend`], providing the case-insensitive union/dedup
/// semantics the engine requires on top of raw storage.
pub struct AliasResolver<B> {
    backend: Arc<B>,
}

impl<B: AliasBackend> AliasResolver<B> {
    /// Wrap `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Register `alias` ↔ `target`, writing both directions atomically.
    /// Rejects empty or case-insensitively identical inputs. Existing rows
    /// are silently preserved (insert-or-ignore semantics).
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if either side is empty or they are
    /// case-insensitively identical.
    pub async fn create(&self, alias: &str, target: &str, created_by: &str) -> Result<()> {
        if alias.trim().is_empty() {
            return Err(Error::invalid_input("alias", "must not be empty"));
        }
        if target.trim().is_empty() {
            return Err(Error::invalid_input("target", "must not be empty"));
        }
        if alias.eq_ignore_ascii_case(target) {
            return Err(Error::invalid_input("target", "must differ from alias"));
        }

        let now = Utc::now();
        let forward = Alias {
            alias: alias.to_string(),
            target: target.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
        };
        let reverse = Alias {
            alias: target.to_string(),
            target: alias.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
        };
        self.backend.insert_pair(&forward, &reverse).await
    }

    /// Resolve `identifier` to the union of itself and every direct target,
    /// case-insensitively, deduplicated preserving first occurrence.
    /// Transitive closure is not applied.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn resolve(&self, identifier: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut seen_lower = std::collections::HashSet::new();

        let mut push = |value: &str, out: &mut Vec<String>, seen_lower: &mut std::collections::HashSet<String>| {
            let lower = value.to_lowercase();
            if seen_lower.insert(lower) {
                out.push(value.to_string());
            }
        };

        push(identifier, &mut out, &mut seen_lower);

        for alias in self.backend.all_for(identifier).await? {
            if alias.alias.eq_ignore_ascii_case(identifier) {
                push(&alias.target, &mut out, &mut seen_lower);
            } else if alias.target.eq_ignore_ascii_case(identifier) {
                push(&alias.alias, &mut out, &mut seen_lower);
            }
        }

        Ok(out)
    }

    /// The full set of alias edges touching `identifier`.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn get_all(&self, identifier: &str) -> Result<Vec<Alias>> {
        self.backend.all_for(identifier).await
    }

    /// Remove both directions of the `alias` ↔ `target` edge, matched
    /// case-insensitively.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn remove(&self, alias: &str, target: &str) -> Result<()> {
        self.backend.remove_pair(alias, target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeBackend {
        edges: tokio::sync::Mutex<Vec<Alias>>,
    }

    #[async_trait]
    impl AliasBackend for FakeBackend {
        async fn insert_pair(&self, forward: &Alias, reverse: &Alias) -> Result<()> {
            let mut edges = self.edges.lock().await;
            edges.push(forward.clone());
            edges.push(reverse.clone());
            Ok(())
        }
        async fn resolve_one(&self, identifier: &str) -> Result<Option<Alias>> {
            let edges = self.edges.lock().await;
            Ok(edges.iter().find(|a| a.alias.eq_ignore_ascii_case(identifier)).cloned())
        }
        async fn all_for(&self, identifier: &str) -> Result<Vec<Alias>> {
            let edges = self.edges.lock().await;
            Ok(edges
                .iter()
                .filter(|a| a.alias.eq_ignore_ascii_case(identifier) || a.target.eq_ignore_ascii_case(identifier))
                .cloned()
                .collect())
        }
        async fn remove_all_for(&self, identifier: &str) -> Result<usize> {
            let mut edges = self.edges.lock().await;
            let before = edges.len();
            edges.retain(|a| !a.alias.eq_ignore_ascii_case(identifier) && !a.target.eq_ignore_ascii_case(identifier));
            Ok(before - edges.len())
        }
        async fn remove_pair(&self, alias: &str, target: &str) -> Result<usize> {
            let mut edges = self.edges.lock().await;
            let before = edges.len();
            edges.retain(|a| {
                let matches_forward = a.alias.eq_ignore_ascii_case(alias) && a.target.eq_ignore_ascii_case(target);
                let matches_reverse = a.alias.eq_ignore_ascii_case(target) && a.target.eq_ignore_ascii_case(alias);
                !matches_forward && !matches_reverse
            });
            Ok(before - edges.len())
        }
    }

    fn resolver() -> AliasResolver<FakeBackend> {
        AliasResolver::new(Arc::new(FakeBackend { edges: tokio::sync::Mutex::new(Vec::new()) }))
    }

    #[tokio::test]
    async fn resolve_without_aliases_returns_identifier_alone() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("BILL").await.unwrap(), vec!["BILL".to_string()]);
    }

    #[tokio::test]
    async fn resolve_returns_union_both_directions() {
        let resolver = resolver();
        resolver.create("BILL", "WILLIAM SMITH", "u").await.unwrap();
        assert_eq!(
            resolver.resolve("BILL").await.unwrap(),
            vec!["BILL".to_string(), "WILLIAM SMITH".to_string()]
        );
        assert_eq!(
            resolver.resolve("WILLIAM SMITH").await.unwrap(),
            vec!["WILLIAM SMITH".to_string(), "BILL".to_string()]
        );
    }

    #[tokio::test]
    async fn resolve_is_case_insensitive() {
        let resolver = resolver();
        resolver.create("BILL", "WILLIAM SMITH", "u").await.unwrap();
        assert_eq!(
            resolver.resolve("bill").await.unwrap(),
            vec!["bill".to_string(), "WILLIAM SMITH".to_string()]
        );
    }

    #[tokio::test]
    async fn transitive_closure_is_not_applied() {
        let resolver = resolver();
        resolver.create("BILL", "W", "u").await.unwrap();
        resolver.create("W", "WILLIAM", "u").await.unwrap();
        let resolved = resolver.resolve("BILL").await.unwrap();
        assert!(!resolved.contains(&"WILLIAM".to_string()));
    }

    #[tokio::test]
    async fn create_rejects_identical_case_insensitive_inputs() {
        let resolver = resolver();
        let err = resolver.create("BILL", "bill", "u").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn remove_restores_singleton_resolution() {
        let resolver = resolver();
        resolver.create("BILL", "W", "u").await.unwrap();
        resolver.remove("BILL", "W").await.unwrap();
        assert_eq!(resolver.resolve("BILL").await.unwrap(), vec!["BILL".to_string()]);
    }

    #[tokio::test]
    async fn remove_only_deletes_the_named_pair() {
        let resolver = resolver();
        resolver.create("BILL", "W", "u").await.unwrap();
        resolver.create("BILL", "WILLIAM", "u").await.unwrap();
        resolver.remove("BILL", "W").await.unwrap();

        assert_eq!(
            resolver.resolve("BILL").await.unwrap(),
            vec!["BILL".to_string(), "WILLIAM".to_string()]
        );
        assert_eq!(resolver.resolve("W").await.unwrap(), vec!["W".to_string()]);
    }
}
