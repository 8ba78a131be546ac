use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{with_timeout, SharedCounter, StoreError};
use crate::utils::{CircuitBreaker, CircuitBreakerError};

// ============================================================================
// Guarded Counter
// ============================================================================
//
// Wraps a shared counter in a circuit breaker. The timeout runs inside the
// breaker call, so a hanging backend is recorded as a failure and eventually
// opens the circuit. While open, increments fail immediately.
//
// ============================================================================

pub(crate) fn breaker_error(name: &str, e: CircuitBreakerError<StoreError>) -> StoreError {
    match e {
        CircuitBreakerError::CircuitOpen => StoreError::Unavailable(format!("{} circuit open", name)),
        CircuitBreakerError::OperationFailed(e) => e,
    }
}

#[derive(Clone)]
pub struct GuardedCounter {
    inner: Arc<dyn SharedCounter>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl GuardedCounter {
    pub fn new(inner: Arc<dyn SharedCounter>, breaker: CircuitBreaker, timeout: Duration) -> Self {
        Self {
            inner,
            breaker,
            timeout,
        }
    }
}

#[async_trait]
impl SharedCounter for GuardedCounter {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        self.breaker
            .call(with_timeout(self.timeout, self.inner.increment(key)))
            .await
            .map_err(|e| breaker_error(self.breaker.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCounter;
    use crate::utils::{CircuitBreakerConfig, CircuitState};
    use std::time::Instant;

    struct HangingCounter;

    #[async_trait]
    impl SharedCounter for HangingCounter {
        async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test_counter",
            CircuitBreakerConfig {
                failure_threshold: 2,
                open_for: Duration::from_secs(60),
                success_threshold: 1,
            },
        )
    }

    #[test]
    fn test_open_circuit_reads_as_unavailable() {
        let err = breaker_error("redis_counter", CircuitBreakerError::CircuitOpen);
        assert!(matches!(err, StoreError::Unavailable(msg) if msg.contains("redis_counter")));
    }

    #[tokio::test]
    async fn test_increments_pass_through() {
        let counter = GuardedCounter::new(Arc::new(MemoryCounter::new()), breaker(), Duration::from_secs(1));
        assert_eq!(counter.increment("k").await.unwrap(), 1);
        assert_eq!(counter.increment("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_hanging_counter_trips_breaker() {
        let breaker = breaker();
        let counter = GuardedCounter::new(Arc::new(HangingCounter), breaker.clone(), Duration::from_millis(20));

        for _ in 0..2 {
            let err = counter.increment("k").await.unwrap_err();
            assert!(matches!(err, StoreError::Timeout(_)));
        }
        assert_eq!(breaker.state().await, CircuitState::Open);

        let started = Instant::now();
        let err = counter.increment("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_millis(20));
    }
}
