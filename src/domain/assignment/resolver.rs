use std::sync::Arc;
use std::time::Duration;

use super::{
    AssignmentStrategy, ChefAssigner, LeastLoadedAssigner, LeastRecentlyAssignedAssigner, ManualAssigner,
    RandomAssigner, RoundRobinAssigner,
};
use crate::models::{setting_keys, RestaurantId};
use crate::store::{with_timeout, ChefDirectory, LoadQuery, SettingsStore, SharedCounter};

/// Maps a restaurant's `chef_assignment_strategy` setting to a policy.
#[derive(Clone)]
pub struct StrategyResolver {
    settings: Arc<dyn SettingsStore>,
    chefs: Arc<dyn ChefDirectory>,
    loads: Arc<dyn LoadQuery>,
    counter: Arc<dyn SharedCounter>,
    store_timeout: Duration,
    counter_timeout: Duration,
}

impl StrategyResolver {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        chefs: Arc<dyn ChefDirectory>,
        loads: Arc<dyn LoadQuery>,
        counter: Arc<dyn SharedCounter>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            chefs,
            loads,
            counter,
            store_timeout,
            counter_timeout: store_timeout,
        }
    }

    /// Latency bound the shared counter enforces on itself.
    pub fn with_counter_timeout(mut self, counter_timeout: Duration) -> Self {
        self.counter_timeout = counter_timeout;
        self
    }

    /// Time allowed for one policy run: the chef lookup plus one follow-up,
    /// which is either a store query or a counter increment.
    pub fn assignment_budget(&self) -> Duration {
        self.store_timeout + self.store_timeout.max(self.counter_timeout)
    }

    /// Strategy configured for the restaurant. A missing setting, a failed
    /// read or an unrecognised value all resolve to `Manual`.
    pub async fn strategy_for(&self, restaurant_id: RestaurantId) -> AssignmentStrategy {
        let setting = with_timeout(
            self.store_timeout,
            self.settings
                .get_by_key(restaurant_id, setting_keys::CHEF_ASSIGNMENT_STRATEGY),
        )
        .await;

        match setting {
            Ok(setting) => setting.value.parse::<AssignmentStrategy>().unwrap_or_else(|e| {
                tracing::warn!(restaurant_id, error = %e, "Unrecognised assignment strategy, using manual");
                AssignmentStrategy::Manual
            }),
            Err(e) if e.is_not_found() => AssignmentStrategy::Manual,
            Err(e) => {
                tracing::warn!(restaurant_id, error = %e, "Failed to read assignment strategy, using manual");
                AssignmentStrategy::Manual
            }
        }
    }

    pub fn build(&self, strategy: AssignmentStrategy) -> Arc<dyn ChefAssigner> {
        match strategy {
            AssignmentStrategy::Manual => Arc::new(ManualAssigner),
            AssignmentStrategy::RoundRobin => {
                Arc::new(RoundRobinAssigner::new(self.chefs.clone(), self.counter.clone()))
            }
            AssignmentStrategy::LeastLoaded => {
                Arc::new(LeastLoadedAssigner::new(self.chefs.clone(), self.loads.clone()))
            }
            AssignmentStrategy::Random => Arc::new(RandomAssigner::new(self.chefs.clone())),
            AssignmentStrategy::LeastRecentlyAssigned => Arc::new(LeastRecentlyAssignedAssigner::new(
                self.chefs.clone(),
                self.loads.clone(),
            )),
        }
    }

    /// Exactly one policy per call; never fails.
    pub async fn resolve(&self, restaurant_id: RestaurantId) -> Arc<dyn ChefAssigner> {
        let strategy = self.strategy_for(restaurant_id).await;
        tracing::debug!(restaurant_id, strategy = %strategy, "Resolved chef assignment strategy");
        self.build(strategy)
    }
}
