use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;

use super::{AssignmentError, AssignmentStrategy, ChefAssigner};
use crate::domain::outcome::Outcome;
use crate::models::{ChefId, RestaurantId};
use crate::store::ChefDirectory;

/// Uniform pick among the active chefs.
pub struct RandomAssigner {
    chefs: Arc<dyn ChefDirectory>,
}

impl RandomAssigner {
    pub fn new(chefs: Arc<dyn ChefDirectory>) -> Self {
        Self { chefs }
    }
}

#[async_trait]
impl ChefAssigner for RandomAssigner {
    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::Random
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

        let index = rand::rng().random_range(0..chefs.len());
        Ok(Outcome::Exact(Some(chefs[index].id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_random_picks_only_active_chefs() {
        let store = Arc::new(MemoryStore::new());
        store.add_chef(1, 10, true);
        store.add_chef(1, 11, false);
        store.add_chef(1, 12, true);
        store.add_chef(2, 13, true);

        let assigner = RandomAssigner::new(store);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let chef = assigner.assign(1).await.unwrap().into_value().unwrap();
            seen.insert(chef);
        }

        assert_eq!(seen, HashSet::from([10, 12]));
    }

    #[tokio::test]
    async fn test_random_without_chefs_assigns_nobody() {
        let assigner = RandomAssigner::new(Arc::new(MemoryStore::new()));
        assert_eq!(assigner.assign(1).await.unwrap(), Outcome::Exact(None));
    }
}
