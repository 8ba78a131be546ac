use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{AssignmentError, AssignmentStrategy, ChefAssigner};
use crate::domain::outcome::Outcome;
use crate::models::{Chef, ChefId, ChefLoad, RestaurantId};
use crate::store::{ChefDirectory, LoadQuery};

/// Chef with the strictly smallest load. Chefs missing from `loads` carry no
/// load; ties go to the earliest chef in `chefs`.
pub fn pick_least_loaded(chefs: &[Chef], loads: &[ChefLoad]) -> Option<ChefId> {
    let load_of: HashMap<ChefId, i64> = loads.iter().map(|l| (l.chef_id, l.order_count)).collect();

    let mut best: Option<(ChefId, i64)> = None;
    for chef in chefs {
        let load = load_of.get(&chef.id).copied().unwrap_or(0);
        match best {
            Some((_, min)) if load >= min => {}
            _ => best = Some((chef.id, load)),
        }
    }

    best.map(|(id, _)| id)
}

/// Sends the order to the chef with the fewest pending/preparing orders.
///
/// Load is read without a lock, so two simultaneous orders may both land on
/// the same chef.
pub struct LeastLoadedAssigner {
    chefs: Arc<dyn ChefDirectory>,
    loads: Arc<dyn LoadQuery>,
}

impl LeastLoadedAssigner {
    pub fn new(chefs: Arc<dyn ChefDirectory>, loads: Arc<dyn LoadQuery>) -> Self {
        Self { chefs, loads }
    }
}

#[async_trait]
impl ChefAssigner for LeastLoadedAssigner {
    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::LeastLoaded
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

        let loads = self
            .loads
            .chef_loads(restaurant_id)
            .await
            .map_err(AssignmentError::ChefLoads)?;

        Ok(Outcome::Exact(pick_least_loaded(&chefs, &loads)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::store::memory::MemoryStore;
    use crate::store::StoreError;

    fn chef(id: ChefId) -> Chef {
        Chef {
            id,
            restaurant_id: 1,
            username: format!("chef-{}", id),
        }
    }

    fn load(chef_id: ChefId, order_count: i64) -> ChefLoad {
        ChefLoad { chef_id, order_count }
    }

    #[test]
    fn test_picks_chef_with_zero_load() {
        let chefs = [chef(1), chef(2), chef(3)];
        let loads = [load(1, 3), load(2, 1), load(3, 0)];
        assert_eq!(pick_least_loaded(&chefs, &loads), Some(3));
    }

    #[test]
    fn test_chefs_absent_from_loads_count_as_idle() {
        let chefs = [chef(1), chef(2), chef(3)];
        let loads = [load(1, 3), load(2, 1)];
        assert_eq!(pick_least_loaded(&chefs, &loads), Some(3));
    }

    #[test]
    fn test_no_load_data_picks_first_chef() {
        assert_eq!(pick_least_loaded(&[chef(4), chef(5)], &[]), Some(4));
    }

    #[test]
    fn test_ties_go_to_first_in_list() {
        let chefs = [chef(1), chef(2), chef(3)];
        let loads = [load(1, 2), load(2, 1), load(3, 1)];
        assert_eq!(pick_least_loaded(&chefs, &loads), Some(2));
    }

    #[test]
    fn test_empty_chef_list() {
        assert_eq!(pick_least_loaded(&[], &[load(1, 0)]), None);
    }

    #[tokio::test]
    async fn test_assign_reads_loads_from_active_orders() {
        let store = Arc::new(MemoryStore::new());
        store.add_chef(1, 1, true);
        store.add_chef(1, 2, true);
        store.seed_active_orders(1, 1, 2);
        store.seed_orders(1, 2, OrderStatus::Completed, 5);

        let assigner = LeastLoadedAssigner::new(store.clone(), store);
        assert_eq!(assigner.assign(1).await.unwrap(), Outcome::Exact(Some(2)));
    }

    struct OfflineLoads;

    #[async_trait]
    impl LoadQuery for OfflineLoads {
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

    #[tokio::test]
    async fn test_no_active_chefs_skips_load_query() {
        let assigner = LeastLoadedAssigner::new(Arc::new(MemoryStore::new()), Arc::new(OfflineLoads));
        assert_eq!(assigner.assign(1).await.unwrap(), Outcome::Exact(None));
    }

    #[tokio::test]
    async fn test_load_failure_with_chefs_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.add_chef(1, 1, true);

        let assigner = LeastLoadedAssigner::new(store, Arc::new(OfflineLoads));
        assert!(matches!(assigner.assign(1).await, Err(AssignmentError::ChefLoads(_))));
    }
}
