// ============================================================================
// Chef Assignment - Pluggable per-restaurant policies
// ============================================================================
//
// Every policy implements `ChefAssigner`. The `StrategyResolver` reads the
// restaurant's `chef_assignment_strategy` setting and hands back one policy;
// anything it cannot read or recognise becomes `Manual`, so assignment can
// never block order placement.
//
// ============================================================================

pub mod least_loaded;
pub mod least_recently_assigned;
pub mod manual;
pub mod random;
pub mod resolver;
pub mod round_robin;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::domain::outcome::Outcome;
use crate::models::{ChefId, RestaurantId};
use crate::store::StoreError;

pub use least_loaded::LeastLoadedAssigner;
pub use least_recently_assigned::{pick_least_recently_assigned, LeastRecentlyAssignedAssigner};
pub use manual::ManualAssigner;
pub use random::RandomAssigner;
pub use resolver::StrategyResolver;
pub use round_robin::RoundRobinAssigner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentStrategy {
    Manual,
    RoundRobin,
    LeastLoaded,
    Random,
    LeastRecentlyAssigned,
}

impl AssignmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::Manual => "manual",
            AssignmentStrategy::RoundRobin => "round_robin",
            AssignmentStrategy::LeastLoaded => "least_loaded",
            AssignmentStrategy::Random => "random",
            AssignmentStrategy::LeastRecentlyAssigned => "least_recently_assigned",
        }
    }
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown assignment strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for AssignmentStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(AssignmentStrategy::Manual),
            "round_robin" => Ok(AssignmentStrategy::RoundRobin),
            "least_loaded" => Ok(AssignmentStrategy::LeastLoaded),
            "random" => Ok(AssignmentStrategy::Random),
            "least_recently_assigned" => Ok(AssignmentStrategy::LeastRecentlyAssigned),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("Failed to get active chefs: {0}")]
    ActiveChefs(#[source] StoreError),

    #[error("Failed to get chef loads: {0}")]
    ChefLoads(#[source] StoreError),

    #[error("Failed to get assignment history: {0}")]
    AssignmentHistory(#[source] StoreError),
}

/// Chooses the chef responsible for a new order.
///
/// `Ok(Outcome::Exact(None))` means nobody is available (or the restaurant
/// assigns manually). `Outcome::Degraded` carries a fallback choice made
/// because a dependency misbehaved; `Err` is a hard lookup failure that the
/// caller treats as "no chef".
#[async_trait]
pub trait ChefAssigner: Send + Sync {
    fn strategy(&self) -> AssignmentStrategy;

    async fn assign(&self, restaurant_id: RestaurantId) -> Result<Outcome<Option<ChefId>>, AssignmentError>;
}
