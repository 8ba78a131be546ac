use async_trait::async_trait;
use std::sync::Arc;

use super::{AssignmentError, AssignmentStrategy, ChefAssigner};
use crate::domain::outcome::Outcome;
use crate::models::{ChefId, RestaurantId};
use crate::store::{ChefDirectory, SharedCounter};

/// Counter key holding a restaurant's round-robin cursor.
pub fn cursor_key(restaurant_id: RestaurantId) -> String {
    format!("chef_rr:{}", restaurant_id)
}

/// Index chosen by the `cursor`-th increment (1-based) over `chef_count` chefs.
pub fn cursor_index(cursor: i64, chef_count: usize) -> usize {
    (cursor - 1).rem_euclid(chef_count as i64) as usize
}

/// Cycles through the active chefs using a shared, atomically incremented
/// cursor per restaurant, so concurrent service instances never hand out the
/// same slot twice. The counter bounds its own latency (see
/// [`GuardedCounter`](crate::store::GuardedCounter)).
pub struct RoundRobinAssigner {
    chefs: Arc<dyn ChefDirectory>,
    counter: Arc<dyn SharedCounter>,
}

impl RoundRobinAssigner {
    pub fn new(chefs: Arc<dyn ChefDirectory>, counter: Arc<dyn SharedCounter>) -> Self {
        Self { chefs, counter }
    }
}

#[async_trait]
impl ChefAssigner for RoundRobinAssigner {
    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::RoundRobin
    }

    async fn assign(&self, restaurant_id: RestaurantId) -> Result<Outcome<Option<ChefId>>, AssignmentError> {
        let chefs = self
            .chefs
            .active_chefs(restaurant_id)
            .await
            .map_err(AssignmentError::ActiveChefs)?;

        if chefs.is_empty() {
            return Ok(Outcome::Exact(None));
        }

        let key = cursor_key(restaurant_id);
        match self.counter.increment(&key).await {
            Ok(cursor) => {
                let index = cursor_index(cursor, chefs.len());
                tracing::debug!(restaurant_id, cursor, index, "Round-robin cursor advanced");
                Ok(Outcome::Exact(Some(chefs[index].id)))
            }
            Err(e) => Ok(Outcome::degraded(
                Some(chefs[0].id),
                format!("round-robin counter unavailable, using first chef: {}", e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryCounter, MemoryStore};
    use crate::store::{GuardedCounter, StoreError};
    use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    use std::time::{Duration, Instant};

    struct DeadCounter;

    #[async_trait]
    impl SharedCounter for DeadCounter {
        async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("redis down".into()))
        }
    }

    fn three_chefs() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_chef(1, 30, true);
        store.add_chef(1, 10, true);
        store.add_chef(1, 20, true);
        store
    }

    #[test]
    fn test_cursor_index_cycles() {
        let visited: Vec<usize> = (1..=7).map(|cursor| cursor_index(cursor, 3)).collect();
        assert_eq!(visited, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_sequential_assignments_visit_chefs_in_order() {
        let assigner = RoundRobinAssigner::new(three_chefs(), Arc::new(MemoryCounter::new()));

        let mut picked = Vec::new();
        for _ in 0..7 {
            picked.push(assigner.assign(1).await.unwrap().into_value().unwrap());
        }

        assert_eq!(picked, vec![10, 20, 30, 10, 20, 30, 10]);
    }

    #[tokio::test]
    async fn test_cursor_is_per_restaurant() {
        let store = three_chefs();
        store.add_chef(2, 40, true);
        store.add_chef(2, 50, true);
        let counter = Arc::new(MemoryCounter::new());
        let assigner = RoundRobinAssigner::new(store, counter.clone());

        assigner.assign(1).await.unwrap();
        assigner.assign(1).await.unwrap();
        let first_of_two = assigner.assign(2).await.unwrap().into_value();

        assert_eq!(first_of_two, Some(40));
        assert_eq!(counter.current(&cursor_key(1)), 2);
    }

    #[tokio::test]
    async fn test_counter_failure_falls_back_to_first_chef() {
        let assigner = RoundRobinAssigner::new(three_chefs(), Arc::new(DeadCounter));

        let outcome = assigner.assign(1).await.unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(outcome.into_value(), Some(10));
    }

    struct HangingCounter;

    #[async_trait]
    impl SharedCounter for HangingCounter {
        async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_hanging_counter_opens_circuit_and_degrades_fast() {
        let breaker = CircuitBreaker::new(
            "redis_counter",
            CircuitBreakerConfig {
                failure_threshold: 2,
                open_for: Duration::from_secs(60),
                success_threshold: 1,
            },
        );
        let counter = GuardedCounter::new(Arc::new(HangingCounter), breaker.clone(), Duration::from_millis(20));
        let assigner = RoundRobinAssigner::new(three_chefs(), Arc::new(counter));

        for _ in 0..2 {
            let outcome = assigner.assign(1).await.unwrap();
            assert!(outcome.is_degraded());
        }
        assert_eq!(breaker.state().await, CircuitState::Open);

        let started = Instant::now();
        let outcome = assigner.assign(1).await.unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(outcome.into_value(), Some(10));
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_concurrent_assignments_share_the_cursor() {
        let counter = Arc::new(MemoryCounter::new());
        let assigner = Arc::new(RoundRobinAssigner::new(three_chefs(), counter.clone()));

        let mut tasks = Vec::new();
        for _ in 0..30 {
            let assigner = assigner.clone();
            tasks.push(tokio::spawn(async move { assigner.assign(1).await.unwrap().into_value() }));
        }

        let mut per_chef = std::collections::HashMap::new();
        for task in tasks {
            *per_chef.entry(task.await.unwrap()).or_insert(0) += 1;
        }

        assert_eq!(counter.current(&cursor_key(1)), 30);
        assert!(per_chef.values().all(|&n| n == 10));
    }
}
