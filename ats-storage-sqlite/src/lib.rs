#![allow(clippy::expect_used)]

//! # ats-storage-sqlite
//!
//! libSQL/SQLite storage backend for the attestation storage engine.
//!
//! This crate provides:
//! - Connection management for embedded and remote libSQL databases
//! - SQL schema creation (idempotent, additive-only migrations)
//! - Implementations of [`ats_core::traits::AttestationBackend`],
//!   [`ats_core::traits::AliasBackend`], [`ats_core::traits::EmbeddingBackend`],
//!   and [`ats_core::traits::WatcherBackend`]
//! - Connection pooling and circuit-breaker resilience
//!
//! `ats-core` never touches a connection directly; every domain operation in
//! that crate is expressed against the backend traits this crate implements.
//!
//! ## Example
//!
//! ```no_run
//! use ats_storage_sqlite::SqliteStorage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = SqliteStorage::new("file:attestations.db", "").await?;
//! storage.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

use ats_core::Error;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{debug, info};

mod codec;
pub mod pool;
mod schema;
pub mod storage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use pool::{ConnectionPool, PoolConfig, PoolStatistics};

mod circuit_breaker;

/// A checked-out connection, sourced either from the pool or dialed directly
/// when pooling is disabled. Held for the duration of one operation.
pub(crate) enum ConnGuard {
    Pooled(pool::PooledConnection),
    Direct(Connection),
}

impl ConnGuard {
    pub(crate) fn get(&self) -> ats_core::Result<&Connection> {
        match self {
            ConnGuard::Pooled(p) => p
                .connection()
                .ok_or_else(|| Error::backend("acquire_connection", "pooled connection already taken")),
            ConnGuard::Direct(c) => Ok(c),
        }
    }
}

/// libSQL/SQLite storage backend.
///
/// Implements every `*Backend` trait from `ats-core`; construct one and hand
/// it to the engine's components (executor, bounded-retention enforcer,
/// embedding store, watcher registry) as a trait object or generic
/// parameter.
pub struct SqliteStorage {
    db: Arc<Database>,
    pool: Option<Arc<ConnectionPool>>,
    circuit_breaker: Arc<CircuitBreaker>,
    config: SqliteStorageConfig,
}

/// Configuration for [`SqliteStorage`].
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Enable the bounded connection pool. Disabling it dials a fresh
    /// connection per operation, which is appropriate for single-threaded
    /// test harnesses.
    pub enable_pooling: bool,
    /// Circuit breaker configuration guarding every backend call.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            enable_pooling: true,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl SqliteStorage {
    /// Open a storage instance at `url`, initializing the schema.
    ///
    /// # Arguments
    ///
    /// * `url` - Database URL (only `libsql://`, `file:`, or `:memory:` are accepted)
    /// * `token` - Authentication token (required for `libsql://`, ignored otherwise)
    ///
    /// # Security
    ///
    /// Remote connections must use `libsql://` with a non-empty token;
    /// `http://`/`https://` are rejected outright.
    pub async fn new(url: &str, token: &str) -> ats_core::Result<Self> {
        Self::with_config(url, token, SqliteStorageConfig::default()).await
    }

    /// Wrap an already-open [`libsql::Database`] (e.g. an in-memory database
    /// built by a test) without dialing anything new. Pooling is disabled;
    /// the circuit breaker is still attached.
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            pool: None,
            circuit_breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            config: SqliteStorageConfig {
                enable_pooling: false,
                ..SqliteStorageConfig::default()
            },
        }
    }

    /// Open a storage instance with explicit configuration.
    pub async fn with_config(url: &str, token: &str, config: SqliteStorageConfig) -> ats_core::Result<Self> {
        info!(url, "opening sqlite storage");

        if !url.starts_with("libsql://") && !url.starts_with("file:") && !url.starts_with(":memory:") {
            return Err(Error::invalid_input(
                "url",
                format!("unsupported database URL scheme: {url} (only libsql://, file:, or :memory: are allowed)"),
            ));
        }

        if url.starts_with("libsql://") && token.trim().is_empty() {
            return Err(Error::invalid_input(
                "token",
                "authentication token required for remote libsql:// connections",
            ));
        }

        let db = if let Some(remote) = url.strip_prefix("libsql://") {
            Builder::new_remote(format!("libsql://{remote}"), token.to_string())
                .build()
                .await
                .map_err(|e| Error::backend("connect", e.to_string()))?
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            Builder::new_local(path)
                .build()
                .await
                .map_err(|e| Error::backend("connect", e.to_string()))?
        };

        let db = Arc::new(db);

        let pool = if config.enable_pooling {
            let pool_config = PoolConfig::default();
            let pool = ConnectionPool::new(Arc::clone(&db), pool_config).await?;
            info!("connection pool enabled");
            Some(Arc::new(pool))
        } else {
            info!("connection pooling disabled");
            None
        };

        let storage = Self {
            db,
            pool,
            circuit_breaker: Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            config,
        };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    /// Run every schema-creation statement. Idempotent: safe to call on an
    /// already-initialized database.
    pub async fn initialize_schema(&self) -> ats_core::Result<()> {
        debug!("initializing schema");
        let guard = self.acquire().await?;
        let conn = guard.get()?;

        for statement in schema::ALL_STATEMENTS {
            conn.execute(statement, ())
                .await
                .map_err(|e| Error::backend("initialize_schema", e.to_string()))?;
        }

        info!("schema initialized");
        Ok(())
    }

    /// Current pool statistics, if pooling is enabled.
    pub async fn pool_statistics(&self) -> Option<PoolStatistics> {
        match &self.pool {
            Some(pool) => Some(pool.statistics().await),
            None => None,
        }
    }

    /// Current circuit breaker statistics.
    pub async fn circuit_breaker_stats(&self) -> CircuitBreakerStats {
        self.circuit_breaker.stats().await
    }

    /// Gracefully drain the connection pool, if enabled.
    pub async fn shutdown(&self) -> ats_core::Result<()> {
        if let Some(pool) = &self.pool {
            pool.shutdown().await?;
        }
        Ok(())
    }

    async fn acquire(&self) -> ats_core::Result<ConnGuard> {
        if let Some(pool) = &self.pool {
            Ok(ConnGuard::Pooled(pool.get().await?))
        } else {
            let conn = self
                .db
                .connect()
                .map_err(|e| Error::backend("acquire_connection", e.to_string()))?;
            Ok(ConnGuard::Direct(conn))
        }
    }

    /// Run `op` against a freshly acquired connection guard, under
    /// circuit-breaker protection. `op` receives the guard itself (rather
    /// than a borrowed `Connection`) so the returned future owns everything
    /// it touches, with no lifetime tied back to `self`.
    pub(crate) async fn guarded<F, Fut, T>(&self, op: F) -> ats_core::Result<T>
    where
        F: FnOnce(ConnGuard) -> Fut + Send,
        Fut: std::future::Future<Output = ats_core::Result<T>> + Send,
        T: Send,
    {
        self.circuit_breaker
            .call(|| async {
                let guard = self.acquire().await?;
                op(guard).await
            })
            .await
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("pooled", &self.pool.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
