use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::value_objects::OrderItem;
use crate::domain::outcome::Outcome;
use crate::models::{ChefId, ProductId, RestaurantId};
use crate::store::{with_timeout, LoadQuery, ProductStore};

/// Prep minutes assumed for products without a positive prep time.
pub const DEFAULT_PREP_MINUTES: i64 = 5;

/// Upper bound for a single estimate (one week).
pub const MAX_ESTIMATE_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEstimate {
    pub minutes: i64,
    pub ready_at: DateTime<Utc>,
}

/// Longest prep time among the items. Items of one order are prepared in
/// parallel, so the slowest dish bounds the order.
pub fn max_prep_minutes(items: &[OrderItem], prep_times: &HashMap<ProductId, i32>) -> i64 {
    items
        .iter()
        .map(|item| match prep_times.get(&item.product_id) {
            Some(&minutes) if minutes > 0 => i64::from(minutes),
            _ => DEFAULT_PREP_MINUTES,
        })
        .max()
        .unwrap_or(DEFAULT_PREP_MINUTES)
}

/// Linear backlog model: every order already queued for the chef is assumed
/// to take up to `max_prep` more minutes. Saturates instead of overflowing.
pub fn estimated_minutes(max_prep: i64, queue_depth: i64) -> i64 {
    queue_depth
        .max(0)
        .saturating_add(1)
        .saturating_mul(max_prep)
}

/// Ready time for `minutes` from `now`, capped at `MAX_ESTIMATE_MINUTES`.
/// The second value is set when the cap had to be applied.
fn bounded_estimate(now: DateTime<Utc>, minutes: i64) -> (ReadyEstimate, Option<String>) {
    let ready_at = |minutes| TimeDelta::try_minutes(minutes).and_then(|delta| now.checked_add_signed(delta));

    if minutes <= MAX_ESTIMATE_MINUTES {
        if let Some(ready_at) = ready_at(minutes) {
            return (ReadyEstimate { minutes, ready_at }, None);
        }
    }

    let capped = ReadyEstimate {
        minutes: MAX_ESTIMATE_MINUTES,
        ready_at: ready_at(MAX_ESTIMATE_MINUTES).unwrap_or(now),
    };
    (capped, Some(format!("estimate of {} minutes capped", minutes)))
}

/// Derives ready-time estimates from product prep times and the assigned
/// chef's queue depth. Lookups are best-effort; an estimate is always produced.
#[derive(Clone)]
pub struct ReadyTimeEstimator {
    products: Arc<dyn ProductStore>,
    loads: Arc<dyn LoadQuery>,
    store_timeout: Duration,
}

impl ReadyTimeEstimator {
    pub fn new(products: Arc<dyn ProductStore>, loads: Arc<dyn LoadQuery>, store_timeout: Duration) -> Self {
        Self {
            products,
            loads,
            store_timeout,
        }
    }

    /// Estimate for an order that is about to be created. The queue depth is
    /// read before the order exists, so it never counts the order itself.
    pub async fn estimate(
        &self,
        restaurant_id: RestaurantId,
        items: &[OrderItem],
        chef_id: Option<ChefId>,
        now: DateTime<Utc>,
    ) -> Outcome<ReadyEstimate> {
        let mut seen = HashSet::new();
        let product_ids: Vec<ProductId> = items
            .iter()
            .map(|item| item.product_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let prep_lookup = with_timeout(
            self.store_timeout,
            self.products.prep_times(restaurant_id, &product_ids),
        );
        let depth_lookup = async {
            match chef_id {
                Some(chef_id) => with_timeout(self.store_timeout, self.loads.chef_active_order_count(chef_id))
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (prep_times, queue_depth) = join(prep_lookup, depth_lookup).await;
        let mut degraded = Vec::new();

        let prep_times = prep_times.unwrap_or_else(|e| {
            tracing::warn!(restaurant_id, error = %e, "Failed to get prep times, using defaults");
            degraded.push(format!("prep times unavailable: {}", e));
            HashMap::new()
        });

        let queue_depth = match queue_depth {
            Ok(depth) => depth.unwrap_or(0),
            Err(e) => {
                tracing::warn!(restaurant_id, chef_id = ?chef_id, error = %e, "Failed to get chef active order count");
                degraded.push(format!("queue depth unavailable: {}", e));
                0
            }
        };

        let max_prep = max_prep_minutes(items, &prep_times);
        let minutes = estimated_minutes(max_prep, queue_depth);
        let (estimate, capped) = bounded_estimate(now, minutes);
        if let Some(reason) = capped {
            tracing::warn!(restaurant_id, chef_id = ?chef_id, minutes, "Ready estimate out of range, capping");
            degraded.push(reason);
        }

        tracing::debug!(
            restaurant_id,
            chef_id = ?chef_id,
            max_prep,
            queue_depth,
            minutes = estimate.minutes,
            "Estimated ready time"
        );

        if degraded.is_empty() {
            Outcome::Exact(estimate)
        } else {
            Outcome::degraded(estimate, degraded.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChefLoad, Staff, CHEF_ROLE};
    use crate::store::memory::MemoryStore;
    use crate::store::StoreError;
    use async_trait::async_trait;

    fn item(product_id: ProductId) -> OrderItem {
        OrderItem {
            product_id,
            name: format!("dish-{}", product_id),
            price: 8.0,
            quantity: 1,
            veg: false,
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ProductStore for BrokenStore {
        async fn prep_times(&self, _: RestaurantId, _: &[ProductId]) -> Result<HashMap<ProductId, i32>, StoreError> {
            Err(StoreError::Unavailable("products offline".into()))
        }
    }

    #[async_trait]
    impl LoadQuery for BrokenStore {
        async fn chef_loads(&self, _: RestaurantId) -> Result<Vec<ChefLoad>, StoreError> {
            Err(StoreError::Unavailable("orders offline".into()))
        }
        async fn chef_active_order_count(&self, _: ChefId) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("orders offline".into()))
        }
        async fn least_recently_assigned_chef(&self, _: RestaurantId, _: &[ChefId]) -> Result<Option<ChefId>, StoreError> {
            Err(StoreError::Unavailable("orders offline".into()))
        }
    }

    #[test]
    fn test_backlog_formula() {
        let prep = HashMap::from([(1, 10), (2, 20), (3, 5)]);
        let max_prep = max_prep_minutes(&[item(1), item(2), item(3)], &prep);
        assert_eq!(max_prep, 20);
        assert_eq!(estimated_minutes(max_prep, 2), 60);
        assert_eq!(estimated_minutes(max_prep, 0), 20);
    }

    #[test]
    fn test_missing_and_non_positive_prep_times_default() {
        let prep = HashMap::from([(1, 0), (2, -3)]);
        assert_eq!(max_prep_minutes(&[item(1), item(2), item(3)], &prep), DEFAULT_PREP_MINUTES);
        assert_eq!(max_prep_minutes(&[], &prep), DEFAULT_PREP_MINUTES);
    }

    #[tokio::test]
    async fn test_estimate_uses_chef_queue_depth() {
        let store = Arc::new(MemoryStore::new());
        store.add_staff(Staff {
            id: 7,
            restaurant_id: 1,
            username: "ravi".into(),
            role: CHEF_ROLE.into(),
            active: true,
        });
        store.set_prep_time(1, 1, 10);
        store.set_prep_time(1, 2, 20);
        store.set_prep_time(1, 3, 5);
        store.seed_active_orders(1, 7, 2);

        let estimator = ReadyTimeEstimator::new(store.clone(), store.clone(), Duration::from_secs(1));
        let now = Utc::now();
        let outcome = estimator
            .estimate(1, &[item(1), item(2), item(3), item(2)], Some(7), now)
            .await;

        assert!(!outcome.is_degraded());
        let estimate = outcome.into_value();
        assert_eq!(estimate.minutes, 60);
        assert_eq!(estimate.ready_at, now + TimeDelta::minutes(60));
    }

    #[tokio::test]
    async fn test_no_chef_means_empty_queue() {
        let store = Arc::new(MemoryStore::new());
        store.set_prep_time(1, 1, 12);

        let estimator = ReadyTimeEstimator::new(store.clone(), store.clone(), Duration::from_secs(1));
        let estimate = estimator.estimate(1, &[item(1)], None, Utc::now()).await.into_value();

        assert_eq!(estimate.minutes, 12);
    }

    #[tokio::test]
    async fn test_lookup_failures_degrade_to_defaults() {
        let broken = Arc::new(BrokenStore);
        let estimator = ReadyTimeEstimator::new(broken.clone(), broken, Duration::from_secs(1));

        let outcome = estimator.estimate(1, &[item(1), item(2)], Some(3), Utc::now()).await;

        assert!(outcome.is_degraded());
        assert_eq!(outcome.value().minutes, DEFAULT_PREP_MINUTES);
    }

    #[test]
    fn test_backlog_formula_saturates() {
        assert_eq!(estimated_minutes(i64::from(i32::MAX), i64::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn test_huge_prep_time_and_deep_queue_are_capped() {
        let store = Arc::new(MemoryStore::new());
        store.add_staff(Staff {
            id: 7,
            restaurant_id: 1,
            username: "ravi".into(),
            role: CHEF_ROLE.into(),
            active: true,
        });
        store.set_prep_time(1, 1, 2_000_000_000);
        store.seed_active_orders(1, 7, 100);

        let estimator = ReadyTimeEstimator::new(store.clone(), store.clone(), Duration::from_secs(1));
        let now = Utc::now();
        let outcome = estimator.estimate(1, &[item(1)], Some(7), now).await;

        assert!(outcome.is_degraded());
        let estimate = outcome.into_value();
        assert_eq!(estimate.minutes, MAX_ESTIMATE_MINUTES);
        assert_eq!(estimate.ready_at, now + TimeDelta::minutes(MAX_ESTIMATE_MINUTES));
    }
}
