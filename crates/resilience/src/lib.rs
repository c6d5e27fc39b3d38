//! Resilience primitives shared by the database pool and the embedding and
//! generator HTTP clients: retry policies and named circuit breakers,
//! composed with the breaker as the outer wrapper around a retried op.

pub mod breaker;
pub mod policy;
pub mod retry;

pub use breaker::{BreakerCallError, BreakerOpenError, BreakerRegistry, BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use policy::ResilientCall;
pub use retry::{Retryable, RetryPolicy, RetryStrategy};
