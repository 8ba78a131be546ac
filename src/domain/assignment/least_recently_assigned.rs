use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::{AssignmentError, AssignmentStrategy, ChefAssigner};
use crate::domain::outcome::Outcome;
use crate::models::{ChefId, RestaurantId};
use crate::store::{ChefDirectory, LoadQuery};

/// Candidate whose latest assignment is oldest. Never-assigned candidates
/// win over any candidate with history; ties go to the lower id.
pub fn pick_least_recently_assigned(
    candidates: &[ChefId],
    last_assigned: &HashMap<ChefId, DateTime<Utc>>,
) -> Option<ChefId> {
    candidates
        .iter()
        .copied()
        .min_by_key(|id| (last_assigned.get(id).copied(), *id))
}

/// Spreads orders by time: the chef who has waited longest since their last
/// order gets the next one.
pub struct LeastRecentlyAssignedAssigner {
    chefs: Arc<dyn ChefDirectory>,
    history: Arc<dyn LoadQuery>,
}

impl LeastRecentlyAssignedAssigner {
    pub fn new(chefs: Arc<dyn ChefDirectory>, history: Arc<dyn LoadQuery>) -> Self {
        Self { chefs, history }
    }
}

#[async_trait]
impl ChefAssigner for LeastRecentlyAssignedAssigner {
    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::LeastRecentlyAssigned
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

        let candidates: Vec<ChefId> = chefs.iter().map(|c| c.id).collect();
        let chosen = self
            .history
            .least_recently_assigned_chef(restaurant_id, &candidates)
            .await
            .map_err(AssignmentError::AssignmentHistory)?;

        Ok(Outcome::Exact(chosen))
    }
}
