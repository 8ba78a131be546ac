// ============================================================================
// Store Layer - Collaborator interfaces consumed by the ordering core
// ============================================================================
//
// The core never talks to Postgres or Redis directly. It depends on the
// traits below; `postgres` and `redis` hold the production implementations,
// `memory` holds in-process ones used by tests and local runs.
//
// ============================================================================

pub mod guarded;
pub mod memory;
pub mod postgres;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::domain::order::{Order, OrderChanges, OrderDraft, OrderStatus};
use crate::models::{
    Chef, ChefId, ChefLoad, CustomerSession, OrderId, OtpRecord, ProductId, RestaurantId, Setting,
};
use crate::utils::IsTransient;

pub use self::guarded::GuardedCounter;
pub use self::memory::{MemoryCounter, MemorySessionStore, MemoryStore};
pub use self::postgres::PgStore;
pub use self::redis::{RedisCounter, RedisSessionStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Unavailable(_) => true,
            StoreError::Redis(e) => e.is_timeout() || e.is_connection_dropped() || e.is_io_error(),
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StoreError::NotFound(_)
            | StoreError::Serialization(_)
            | StoreError::InvalidData(_)
            | StoreError::Conflict(_) => false,
        }
    }
}

/// Bound a store call by `limit`. An elapsed timer drops the in-flight call
/// and surfaces as [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Active chefs of a restaurant, ascending by id. Inactive staff and other
/// roles are excluded.
#[async_trait]
pub trait ChefDirectory: Send + Sync {
    async fn active_chefs(&self, restaurant_id: RestaurantId) -> Result<Vec<Chef>, StoreError>;
}

#[async_trait]
pub trait LoadQuery: Send + Sync {
    /// Loads for chefs holding at least one pending or preparing order.
    async fn chef_loads(&self, restaurant_id: RestaurantId) -> Result<Vec<ChefLoad>, StoreError>;

    async fn chef_active_order_count(&self, chef_id: ChefId) -> Result<i64, StoreError>;

    /// Candidate with the oldest latest assignment. Candidates that were never
    /// assigned sort first; ties go to the lower id.
    async fn least_recently_assigned_chef(
        &self,
        restaurant_id: RestaurantId,
        candidates: &[ChefId],
    ) -> Result<Option<ChefId>, StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns [`StoreError::NotFound`] when the key is not set.
    async fn get_by_key(&self, restaurant_id: RestaurantId, key: &str) -> Result<Setting, StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Prep minutes per product. Unknown products are simply absent.
    async fn prep_times(
        &self,
        restaurant_id: RestaurantId,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, i32>, StoreError>;
}

/// Atomic increment-and-get on a shared, externally persisted counter.
#[async_trait]
pub trait SharedCounter: Send + Sync {
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, token: &str) -> Result<Option<CustomerSession>, StoreError>;

    async fn put_session(
        &self,
        token: &str,
        session: &CustomerSession,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn invalidate_session(&self, token: &str) -> Result<(), StoreError>;
}

/// OTP bookkeeping keyed by phone number.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// The pending OTP and its remaining lifetime.
    async fn get_otp(&self, phone: &str) -> Result<Option<(OtpRecord, Duration)>, StoreError>;

    async fn put_otp(&self, phone: &str, record: &OtpRecord, ttl: Duration) -> Result<(), StoreError>;

    async fn delete_otp(&self, phone: &str) -> Result<(), StoreError>;

    async fn cooldown_remaining(&self, phone: &str) -> Result<Option<Duration>, StoreError>;

    async fn start_cooldown(&self, phone: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Requests recorded for `phone` in the current rate-limit window.
    async fn otp_request_count(&self, phone: &str) -> Result<u32, StoreError>;

    /// Record one request. The window starts with the first request.
    async fn record_otp_request(&self, phone: &str, window: Duration) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, draft: &OrderDraft, now: DateTime<Utc>) -> Result<Order, StoreError>;

    async fn get(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<Order, StoreError>;

    /// Writes exactly the fields present in `changes` plus `updated_at`, and
    /// only while the stored status is still `expected`. A status that moved
    /// in the meantime fails with [`StoreError::Conflict`] and writes nothing.
    async fn update_fields(
        &self,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        expected: OrderStatus,
        changes: &OrderChanges,
        now: DateTime<Utc>,
    ) -> Result<Order, StoreError>;

    async fn delete(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<(), StoreError>;

    /// Newest first.
    async fn list(&self, restaurant_id: RestaurantId) -> Result<Vec<Order>, StoreError>;

    async fn list_by_status(
        &self,
        restaurant_id: RestaurantId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError>;

    async fn list_by_phone(&self, restaurant_id: RestaurantId, phone: &str) -> Result<Vec<Order>, StoreError>;
}
