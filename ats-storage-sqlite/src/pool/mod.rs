//! Connection pool for the embedded libSQL/SQLite backend.
//!
//! libSQL's `Database` is already a connection factory; this pool adds a
//! concurrency cap via semaphore, optional health checks on checkout, and
//! checkout statistics for monitoring.

mod config;

pub use config::{PoolConfig, PoolStatistics, PooledConnection};

use ats_core::Error;
use libsql::{Connection, Database};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Connection pool for managing database connections.
pub struct ConnectionPool {
    db: Arc<Database>,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    stats: Arc<RwLock<PoolStatistics>>,
}

impl ConnectionPool {
    /// Build a pool over `db`, validating connectivity before returning.
    pub async fn new(db: Arc<Database>, config: PoolConfig) -> ats_core::Result<Self> {
        info!(max_connections = config.max_connections, "creating connection pool");

        let semaphore = Arc::new(Semaphore::new(config.max_connections));
        let stats = Arc::new(RwLock::new(PoolStatistics::default()));

        let pool = Self { db, config, semaphore, stats };
        pool.validate_database().await?;
        Ok(pool)
    }

    async fn validate_database(&self) -> ats_core::Result<()> {
        let conn = self
            .db
            .connect()
            .map_err(|e| Error::backend("pool_validate", e.to_string()))?;

        conn.query("SELECT 1", ())
            .await
            .map_err(|e| Error::backend("pool_validate", e.to_string()))?;

        Ok(())
    }

    async fn create_connection(&self) -> ats_core::Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| Error::backend("pool_connect", e.to_string()))?;

        self.stats.write().total_created += 1;
        Ok(conn)
    }

    /// Check out a connection, respecting the concurrency cap and optional
    /// health check.
    pub async fn get(&self) -> ats_core::Result<PooledConnection> {
        let start = Instant::now();

        let owned_permit_fut = self.semaphore.clone().acquire_owned();
        let permit = tokio::time::timeout(self.config.connection_timeout, owned_permit_fut)
            .await
            .map_err(|_| {
                Error::backend(
                    "pool_checkout",
                    format!(
                        "timeout after {:?}: max {} connections in use",
                        self.config.connection_timeout, self.config.max_connections
                    ),
                )
            })?
            .map_err(|e| Error::backend("pool_checkout", e.to_string()))?;

        let wait_time = start.elapsed();
        let conn = self.create_connection().await?;

        if self.config.enable_health_check {
            if let Err(e) = self.validate_connection_health(&conn).await {
                self.stats.write().total_health_checks_failed += 1;
                return Err(e);
            }
            self.stats.write().total_health_checks_passed += 1;
        }

        {
            let mut stats = self.stats.write();
            stats.total_checkouts += 1;
            stats.total_wait_time_ms += wait_time.as_millis() as u64;
            stats.active_connections += 1;
            stats.update_averages();
        }

        debug!(?wait_time, active = self.stats.read().active_connections, "connection acquired");

        Ok(PooledConnection {
            connection: Some(conn),
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    async fn validate_connection_health(&self, conn: &Connection) -> ats_core::Result<()> {
        tokio::time::timeout(self.config.health_check_timeout, conn.query("SELECT 1", ()))
            .await
            .map_err(|_| Error::backend("pool_health_check", "timeout"))?
            .map_err(|e| Error::backend("pool_health_check", e.to_string()))?;

        Ok(())
    }

    /// Current pool statistics.
    pub async fn statistics(&self) -> PoolStatistics {
        self.stats.read().clone()
    }

    /// Current pool utilization in `[0.0, 1.0]`.
    pub async fn utilization(&self) -> f32 {
        let stats = self.stats.read();
        if self.config.max_connections == 0 {
            return 0.0;
        }
        stats.active_connections as f32 / self.config.max_connections as f32
    }

    /// Number of connection slots currently free.
    pub async fn available_connections(&self) -> usize {
        let stats = self.stats.read();
        self.config.max_connections.saturating_sub(stats.active_connections)
    }

    /// Whether the pool has at least one free slot.
    pub async fn has_capacity(&self) -> bool {
        self.available_connections().await > 0
    }

    /// Wait (up to 30s) for active connections to be returned.
    pub async fn shutdown(&self) -> ats_core::Result<()> {
        info!("shutting down connection pool");

        let shutdown_timeout = Duration::from_secs(30);
        let start = Instant::now();

        while start.elapsed() < shutdown_timeout {
            let active = self.stats.read().active_connections;
            if active == 0 {
                break;
            }
            debug!(active, "waiting for active connections to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let final_active = self.stats.read().active_connections;
        if final_active > 0 {
            warn!(final_active, "shutdown completed with connections still in use");
        } else {
            info!("connection pool shutdown complete");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_pool() -> (ConnectionPool, TempDir) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let db = libsql::Builder::new_local(&db_path).build().await.unwrap();

        let config = PoolConfig {
            max_connections: 5,
            connection_timeout: Duration::from_secs(5),
            enable_health_check: true,
            health_check_timeout: Duration::from_secs(2),
        };

        let pool = ConnectionPool::new(Arc::new(db), config).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn pool_creation_has_no_active_connections() {
        let (pool, _dir) = create_test_pool().await;
        let stats = pool.statistics().await;
        assert_eq!(stats.total_checkouts, 0);
        assert_eq!(stats.active_connections, 0);
    }

    #[tokio::test]
    async fn checkout_increments_statistics() {
        let (pool, _dir) = create_test_pool().await;
        let conn = pool.get().await;
        assert!(conn.is_ok());

        let stats = pool.statistics().await;
        assert_eq!(stats.total_checkouts, 1);
        assert_eq!(stats.active_connections, 1);
    }

    #[tokio::test]
    async fn connection_returns_permit_on_drop() {
        let (pool, _dir) = create_test_pool().await;
        {
            let _conn = pool.get().await.unwrap();
            assert_eq!(pool.statistics().await.active_connections, 1);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.statistics().await.active_connections, 0);
    }

    #[tokio::test]
    async fn pool_enforces_connection_timeout() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let db = libsql::Builder::new_local(&db_path).build().await.unwrap();

        let config = PoolConfig {
            max_connections: 1,
            connection_timeout: Duration::from_millis(100),
            enable_health_check: false,
            health_check_timeout: Duration::from_secs(2),
        };

        let pool = ConnectionPool::new(Arc::new(db), config).await.unwrap();
        let _conn1 = pool.get().await.unwrap();

        let result = pool.get().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn has_capacity_reflects_checkouts() {
        let (pool, _dir) = create_test_pool().await;
        assert!(pool.has_capacity().await);

        let conns: Vec<_> = futures::future::join_all((0..5).map(|_| pool.get())).await;
        assert!(conns.iter().all(std::result::Result::is_ok));
        assert!(!pool.has_capacity().await);
    }
}
