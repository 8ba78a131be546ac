use async_trait::async_trait;

use super::{AssignmentError, AssignmentStrategy, ChefAssigner};
use crate::domain::outcome::Outcome;
use crate::models::{ChefId, RestaurantId};

/// Leaves the order unassigned; staff pick chefs by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualAssigner;

#[async_trait]
impl ChefAssigner for ManualAssigner {
    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::Manual
    }

    async fn assign(&self, _restaurant_id: RestaurantId) -> Result<Outcome<Option<ChefId>>, AssignmentError> {
        Ok(Outcome::Exact(None))
    }
}
