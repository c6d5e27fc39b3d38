//! Named circuit breaker with closed/open/half-open FSM and sliding-window
//! failure rate, grounded on `sage_core/resilience/circuit_breaker.py`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            monitoring_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("circuit breaker '{0}' is open")]
pub struct BreakerOpenError(pub String);

struct Inner {
    state: CircuitState,
    failure_timestamps: Vec<Instant>,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_attempt_time: Option<Instant>,
}

/// A single named breaker. Cheaply cloneable (wraps an `Arc`), so it can be
/// shared between the retry policy's call site and the status/reset tools.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_timestamps: Vec::new(),
                success_count: 0,
                last_failure_time: None,
                last_attempt_time: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the "update state before every read" rule from the source:
    /// prunes the sliding window and checks for OPEN→HALF_OPEN and
    /// HALF_OPEN→CLOSED transitions.
    fn update_state(&self, inner: &mut Inner) {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.config.monitoring_window);
        inner.failure_timestamps.retain(|t| Some(*t) > cutoff || cutoff.is_none());

        match inner.state {
            CircuitState::Open => {
                if let Some(last) = inner.last_failure_time {
                    if now.duration_since(last) >= self.config.recovery_timeout {
                        self.transition_to_half_open(inner);
                    }
                }
            }
            CircuitState::HalfOpen => {
                if inner.success_count >= self.config.success_threshold {
                    self.transition_to_closed(inner);
                }
            }
            CircuitState::Closed => {}
        }
    }

    fn transition_to_open(&self, inner: &mut Inner) {
        if inner.state != CircuitState::Open {
            tracing::warn!(breaker = %self.name, failures = inner.failure_timestamps.len(), "circuit breaker opened");
            inner.state = CircuitState::Open;
            inner.last_failure_time = Some(Instant::now());
        }
    }

    fn transition_to_closed(&self, inner: &mut Inner) {
        if inner.state != CircuitState::Closed {
            tracing::info!(breaker = %self.name, "circuit breaker closed");
            inner.state = CircuitState::Closed;
            inner.success_count = 0;
            inner.failure_timestamps.clear();
        }
    }

    fn transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state != CircuitState::HalfOpen {
            tracing::info!(breaker = %self.name, "circuit breaker half-open, probing");
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.update_state(&mut inner);
        inner.state
    }

    fn record_success(&self, inner: &mut Inner) {
        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.config.success_threshold {
                self.transition_to_closed(inner);
            }
        }
    }

    fn record_failure(&self, inner: &mut Inner) {
        let now = Instant::now();
        inner.failure_timestamps.push(now);
        inner.last_failure_time = Some(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_timestamps.len() as u32 >= self.config.failure_threshold {
                    self.transition_to_open(inner);
                }
            }
            CircuitState::HalfOpen => self.transition_to_open(inner),
            CircuitState::Open => {}
        }
    }

    /// Run `op` through the breaker. Rejects immediately with
    /// `BreakerOpenError` while open; otherwise runs `op` and records the
    /// outcome.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock();
            self.update_state(&mut inner);
            if inner.state == CircuitState::Open {
                return Err(BreakerCallError::Open(BreakerOpenError(self.name.clone())));
            }
            inner.last_attempt_time = Some(Instant::now());
        }

        match op().await {
            Ok(v) => {
                let mut inner = self.inner.lock();
                self.record_success(&mut inner);
                Ok(v)
            }
            Err(e) => {
                let mut inner = self.inner.lock();
                self.record_failure(&mut inner);
                Err(BreakerCallError::Inner(e))
            }
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        tracing::info!(breaker = %self.name, "circuit breaker reset");
        inner.state = CircuitState::Closed;
        inner.success_count = 0;
        inner.failure_timestamps.clear();
        inner.last_failure_time = None;
        inner.last_attempt_time = None;
    }

    pub fn stats(&self) -> BreakerStats {
        let mut inner = self.inner.lock();
        self.update_state(&mut inner);

        let failure_rate_per_minute = if let Some(first) = inner.failure_timestamps.first() {
            let window = self
                .config
                .monitoring_window
                .as_secs_f64()
                .min(first.elapsed().as_secs_f64());
            if window > 0.0 {
                (inner.failure_timestamps.len() as f64 / window) * 60.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_timestamps.len(),
            success_count: inner.success_count,
            failure_rate_per_minute: (failure_rate_per_minute * 100.0).round() / 100.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerCallError<E> {
    #[error(transparent)]
    Open(BreakerOpenError),
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub success_count: u32,
    pub failure_rate_per_minute: f64,
}

/// Per-process registry mapping breaker name to instance (§4.1's "global
/// registry"), constructed explicitly by the composition root and threaded
/// to callers per the Design Notes' "avoid hidden global state" guidance.
#[derive(Clone, Default)]
pub struct BreakerRegistry {
    breakers: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> CircuitBreaker {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(name, config))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.lock().get(name).cloned()
    }

    pub fn all_stats(&self) -> Vec<BreakerStats> {
        self.breakers.lock().values().map(|b| b.stats()).collect()
    }

    pub fn reset_all(&self) {
        for b in self.breakers.lock().values() {
            b.reset();
        }
    }

    pub fn reset(&self, name: &str) -> bool {
        if let Some(b) = self.breakers.lock().get(name) {
            b.reset();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(20),
            success_threshold: 2,
            monitoring_window: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let b = CircuitBreaker::new("t", fast_config());
        for _ in 0..3 {
            let _: Result<(), BreakerCallError<&str>> = b.run(|| async { Err("boom") }).await;
        }
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn rejects_calls_while_open_without_invoking_op() {
        let b = CircuitBreaker::new("t", fast_config());
        for _ in 0..3 {
            let _: Result<(), BreakerCallError<&str>> = b.run(|| async { Err("boom") }).await;
        }
        let mut invoked = false;
        let result = b
            .run(|| {
                invoked = true;
                async { Ok::<_, &str>(1) }
            })
            .await;
        assert!(matches!(result, Err(BreakerCallError::Open(_))));
        assert!(!invoked);
    }

    #[tokio::test]
    async fn half_open_after_recovery_timeout_then_closes_on_successes() {
        let b = CircuitBreaker::new("t", fast_config());
        for _ in 0..3 {
            let _: Result<(), BreakerCallError<&str>> = b.run(|| async { Err("boom") }).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(b.state(), CircuitState::HalfOpen);

        let _: Result<i32, BreakerCallError<&str>> = b.run(|| async { Ok(1) }).await;
        let _: Result<i32, BreakerCallError<&str>> = b.run(|| async { Ok(1) }).await;
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let b = CircuitBreaker::new("t", fast_config());
        for _ in 0..3 {
            let _: Result<(), BreakerCallError<&str>> = b.run(|| async { Err("boom") }).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(b.state(), CircuitState::HalfOpen);

        let _: Result<(), BreakerCallError<&str>> = b.run(|| async { Err("boom") }).await;
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn registry_reset_all_clears_every_breaker() {
        let reg = BreakerRegistry::new();
        let b = reg.get_or_create("x", fast_config());
        {
            let mut inner = b.inner.lock();
            inner.state = CircuitState::Open;
            inner.failure_timestamps.push(Instant::now());
        }
        reg.reset_all();
        assert_eq!(b.state(), CircuitState::Closed);
    }
}
