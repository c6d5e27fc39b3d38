//! Retry policy: fixed/linear/exponential/Fibonacci backoff with jitter,
//! grounded on `sage_core/resilience/retry_strategy.py`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    Fixed,
    Linear,
    Exponential,
    Fibonacci,
}

/// Which outcomes are worth retrying. Most callers classify their own error
/// type into this before calling `RetryPolicy::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryable {
    Yes,
    No,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
    pub strategy: RetryStrategy,
    fibonacci_cache: Vec<u64>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, strategy: RetryStrategy) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            exponential_base: 2.0,
            jitter: true,
            strategy,
            fibonacci_cache: vec![0, 1],
        }
    }

    /// `DATABASE_RETRY`: 5 attempts, 0.5-30s exponential (§4.1).
    pub fn database() -> Self {
        Self::new(
            5,
            Duration::from_millis(500),
            Duration::from_secs(30),
            RetryStrategy::Exponential,
        )
    }

    /// `NETWORK_RETRY`: 3 attempts, 1-10s exponential with jitter (§4.1).
    pub fn network() -> Self {
        Self::new(
            3,
            Duration::from_secs(1),
            Duration::from_secs(10),
            RetryStrategy::Exponential,
        )
    }

    fn fibonacci(&mut self, n: u32) -> u64 {
        let n = n as usize;
        while self.fibonacci_cache.len() <= n {
            let len = self.fibonacci_cache.len();
            let next = self.fibonacci_cache[len - 1] + self.fibonacci_cache[len - 2];
            self.fibonacci_cache.push(next);
        }
        self.fibonacci_cache[n]
    }

    /// Delay before attempt `n` (1-indexed), per §4.1's formulas.
    pub fn delay_for(&mut self, attempt: u32) -> Duration {
        let base_secs = self.initial_delay.as_secs_f64();
        let mut delay_secs = match self.strategy {
            RetryStrategy::Fixed => base_secs,
            RetryStrategy::Linear => base_secs * attempt as f64,
            RetryStrategy::Exponential => base_secs * self.exponential_base.powi(attempt as i32 - 1),
            RetryStrategy::Fibonacci => base_secs * self.fibonacci(attempt) as f64,
        };

        let max_secs = self.max_delay.as_secs_f64();
        if delay_secs > max_secs {
            delay_secs = max_secs;
        }

        if self.jitter {
            let factor = 0.5 + rand::thread_rng().gen::<f64>() * 0.5;
            delay_secs *= factor;
        }

        Duration::from_secs_f64(delay_secs.max(0.0))
    }

    /// Run `op`, retrying per this policy while `classify` returns
    /// `Retryable::Yes` and attempts remain. On the final failed attempt the
    /// underlying error is returned unchanged.
    pub async fn run<T, E, F, Fut>(
        &mut self,
        mut op: F,
        classify: impl Fn(&E) -> Retryable,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let retry = classify(&e) == Retryable::Yes && attempt < self.max_attempts;
                    if !retry {
                        if attempt >= self.max_attempts {
                            tracing::error!(attempt, max = self.max_attempts, "retry attempts exhausted");
                        }
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::warn!(attempt, max = self.max_attempts, delay_ms = delay.as_millis() as u64, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let mut p = RetryPolicy::new(5, Duration::from_secs(2), Duration::from_secs(60), RetryStrategy::Fixed);
        p.jitter = false;
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
    }

    #[test]
    fn linear_delay_scales_with_attempt() {
        let mut p = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60), RetryStrategy::Linear);
        p.jitter = false;
        assert_eq!(p.delay_for(3), Duration::from_secs(3));
    }

    #[test]
    fn exponential_delay_doubles() {
        let mut p = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60), RetryStrategy::Exponential);
        p.jitter = false;
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn exponential_delay_caps_at_max() {
        let mut p = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), RetryStrategy::Exponential);
        p.jitter = false;
        assert_eq!(p.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn fibonacci_delay_matches_sequence() {
        let mut p = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(600), RetryStrategy::Fibonacci);
        p.jitter = false;
        // fib: [0,1,1,2,3,5,8,...] indexed from attempt=1 -> fib(1)=1
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(4), Duration::from_secs(2));
        assert_eq!(p.delay_for(6), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_half_to_full_range() {
        let mut p = RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(60), RetryStrategy::Fixed);
        for _ in 0..50 {
            let d = p.delay_for(1);
            assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_retries_until_success() {
        let mut policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100), RetryStrategy::Fixed);
        let mut calls = 0;
        let result: Result<i32, &str> = policy
            .run(
                || {
                    calls += 1;
                    let attempt = calls;
                    async move {
                        if attempt < 3 {
                            Err("transient")
                        } else {
                            Ok(42)
                        }
                    }
                },
                |_| Retryable::Yes,
            )
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_retrying_when_not_retryable() {
        let mut policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(10), RetryStrategy::Fixed);
        let mut calls = 0;
        let result: Result<i32, &str> = policy
            .run(
                || {
                    calls += 1;
                    async { Err("fatal") }
                },
                |_| Retryable::No,
            )
            .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_exhausts_after_max_attempts() {
        let mut policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10), RetryStrategy::Fixed);
        let mut calls = 0;
        let result: Result<i32, &str> = policy
            .run(
                || {
                    calls += 1;
                    async { Err("down") }
                },
                |_| Retryable::Yes,
            )
            .await;
        assert_eq!(result, Err("down"));
        assert_eq!(calls, 3);
    }
}
