//! Circuit breaker for storage resilience.
//!
//! Wraps backend calls so that a string of failures against the embedded
//! engine (or a remote libSQL endpoint) fails fast instead of piling up
//! retries, then probes for recovery after a cooldown.
//!
//! ## States
//!
//! - **Closed**: normal operation, all calls pass through.
//! - **Open**: too many consecutive failures; calls are rejected immediately.
//! - **`HalfOpen`**: timeout elapsed; the next call is allowed through as a
//!   recovery probe.

use ats_core::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through.
    Closed,
    /// Requests are rejected immediately.
    Open,
    /// The next request is allowed through as a recovery probe.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Duration to wait before probing for recovery.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, timeout: Duration::from_secs(30) }
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerStats {
    /// Total calls attempted.
    pub total_calls: u64,
    /// Calls that returned `Ok`.
    pub successful_calls: u64,
    /// Calls that returned a recoverable `Err`.
    pub failed_calls: u64,
    /// Calls rejected while the circuit was open.
    pub rejected_calls: u64,
    /// Current consecutive-failure streak.
    pub consecutive_failures: u32,
    /// Number of times the circuit has opened.
    pub circuit_opened_count: u32,
}

struct State {
    circuit: CircuitState,
    stats: CircuitBreakerStats,
    last_failure_time: Option<Instant>,
}

impl Default for State {
    fn default() -> Self {
        Self { circuit: CircuitState::Closed, stats: CircuitBreakerStats::default(), last_failure_time: None }
    }
}

/// Protects calls to a storage backend against cascading failures.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<State>>,
}

impl CircuitBreaker {
    /// Build a circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        info!(threshold = config.failure_threshold, timeout = ?config.timeout, "circuit breaker initialized");
        Self { config, state: Arc::new(RwLock::new(State::default())) }
    }

    /// Run `operation` under circuit-breaker protection. Only errors for
    /// which [`Error::is_recoverable`] is true count toward the failure
    /// threshold.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.should_allow_request().await {
            self.state.write().await.stats.rejected_calls += 1;
            debug!("circuit breaker rejecting request: circuit is open");
            return Err(Error::backend("circuit_breaker", "circuit open"));
        }

        self.state.write().await.stats.total_calls += 1;

        let result = operation().await;
        self.on_result(&result).await;
        result
    }

    async fn should_allow_request(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.write().await;

        match state.circuit {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_failure) = state.last_failure_time {
                    if now.duration_since(last_failure) >= self.config.timeout {
                        info!("circuit breaker transitioning to half-open");
                        state.circuit = CircuitState::HalfOpen;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    async fn on_result<T>(&self, result: &Result<T>) {
        let mut state = self.state.write().await;
        match result {
            Ok(_) => {
                state.stats.successful_calls += 1;
                Self::on_success(&mut state);
            }
            Err(e) if e.is_recoverable() => {
                state.stats.failed_calls += 1;
                self.on_failure(&mut state);
            }
            Err(e) => debug!(error = %e, "non-recoverable error, not affecting circuit"),
        }
    }

    fn on_success(state: &mut State) {
        match state.circuit {
            CircuitState::HalfOpen => {
                info!("circuit breaker closing after successful recovery probe");
                state.circuit = CircuitState::Closed;
                state.stats.consecutive_failures = 0;
                state.last_failure_time = None;
            }
            CircuitState::Closed => state.stats.consecutive_failures = 0,
            CircuitState::Open => warn!("unexpected success while circuit open"),
        }
    }

    fn on_failure(&self, state: &mut State) {
        state.stats.consecutive_failures += 1;
        state.last_failure_time = Some(Instant::now());

        match state.circuit {
            CircuitState::Closed if state.stats.consecutive_failures >= self.config.failure_threshold => {
                warn!(failures = state.stats.consecutive_failures, "circuit breaker opening");
                state.circuit = CircuitState::Open;
                state.stats.circuit_opened_count += 1;
            }
            CircuitState::HalfOpen => {
                warn!("circuit breaker reopening after failed recovery probe");
                state.circuit = CircuitState::Open;
                state.stats.circuit_opened_count += 1;
            }
            _ => {}
        }
    }

    /// Current circuit state.
    pub async fn state(&self) -> CircuitState {
        self.state.read().await.circuit
    }

    /// Current statistics.
    pub async fn stats(&self) -> CircuitBreakerStats {
        self.state.read().await.stats.clone()
    }

    /// Reset to the closed state. Primarily for tests and manual recovery.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.circuit = CircuitState::Closed;
        state.stats.consecutive_failures = 0;
        state.last_failure_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 3, timeout: Duration::from_secs(30) });

        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>(Error::backend("op", "boom")) }).await;
        }

        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(cb.stats().await.circuit_opened_count, 1);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_calling_operation() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 1, timeout: Duration::from_secs(30) });
        let _ = cb.call(|| async { Err::<(), _>(Error::backend("op", "boom")) }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        let mut called = false;
        let result = cb
            .call(|| {
                called = true;
                async { Ok::<_, Error>(()) }
            })
            .await;

        assert!(result.is_err());
        assert!(!called);
    }

    #[tokio::test]
    async fn non_recoverable_errors_do_not_open_circuit() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 1, timeout: Duration::from_secs(30) });
        let _ = cb.call(|| async { Err::<(), _>(Error::NotFound("AS-1".to_string())) }).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 3, timeout: Duration::from_secs(30) });
        let _ = cb.call(|| async { Err::<(), _>(Error::backend("op", "boom")) }).await;
        let _ = cb.call(|| async { Ok::<_, Error>(()) }).await;
        assert_eq!(cb.stats().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 1, timeout: Duration::from_millis(10) });
        let _ = cb.call(|| async { Err::<(), _>(Error::backend("op", "boom")) }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let _ = cb.call(|| async { Err::<(), _>(Error::backend("op", "boom again")) }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(cb.stats().await.circuit_opened_count, 2);
    }
}
