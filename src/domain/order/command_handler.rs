use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::aggregate::{validate_items, Order, OrderChanges, OrderDraft};
use super::commands::{non_empty, NewOrder, OrderUpdate};
use super::errors::OrderError;
use super::estimate::ReadyTimeEstimator;
use super::value_objects::{compute_total, OrderStatus};
use crate::domain::assignment::StrategyResolver;
use crate::domain::customer::{CustomerSessionService, SessionError};
use crate::domain::outcome::Outcome;
use crate::metrics::{assignment_outcome, Metrics};
use crate::models::{setting_keys, ChefId, OrderId, RestaurantId};
use crate::store::{with_timeout, OrderRepository, SettingsStore, StoreError};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates placement: items → customer session → total → chef policy →
// ready estimate → single insert. And partial updates: load → lifecycle
// rules → write of the changed fields only.
//
// ============================================================================

/// Invalidates a consumed customer session when placement ends.
///
/// The normal path awaits [`SessionConsumption::finish`]. If the placing
/// future is dropped first, `Drop` hands the invalidation to the runtime so
/// the session still cannot be replayed.
struct SessionConsumption {
    sessions: Arc<CustomerSessionService>,
    token: Option<String>,
}

impl SessionConsumption {
    fn new(sessions: Arc<CustomerSessionService>, token: String) -> Self {
        Self {
            sessions,
            token: Some(token),
        }
    }

    async fn finish(mut self) {
        if let Some(token) = self.token.take() {
            invalidate(&self.sessions, &token).await;
        }
    }
}

impl Drop for SessionConsumption {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let sessions = self.sessions.clone();
                handle.spawn(async move { invalidate(&sessions, &token).await });
            }
            Err(_) => tracing::error!("No runtime available to invalidate abandoned customer session"),
        }
    }
}

async fn invalidate(sessions: &CustomerSessionService, token: &str) {
    if let Err(e) = sessions.invalidate_session(token).await {
        tracing::error!(error = %e, "Failed to invalidate consumed customer session");
    }
}

/// Customer identity settled for a new order.
struct VerifiedCustomer {
    phone: String,
    consumption: Option<SessionConsumption>,
}

/// Read-plan-write rounds before a contended update gives up.
const MAX_UPDATE_ATTEMPTS: usize = 3;

fn order_store_error(order_id: OrderId) -> impl Fn(StoreError) -> OrderError {
    move |e| {
        if e.is_not_found() {
            OrderError::NotFound(order_id)
        } else {
            OrderError::Store(e)
        }
    }
}

fn session_error(e: SessionError) -> OrderError {
    match e {
        SessionError::Store(e) => OrderError::Store(e),
        other => OrderError::InvalidSession(other),
    }
}

pub struct OrderCommandHandler {
    orders: Arc<dyn OrderRepository>,
    settings: Arc<dyn SettingsStore>,
    sessions: Arc<CustomerSessionService>,
    resolver: StrategyResolver,
    estimator: ReadyTimeEstimator,
    metrics: Arc<Metrics>,
    store_timeout: Duration,
}

impl OrderCommandHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        settings: Arc<dyn SettingsStore>,
        sessions: Arc<CustomerSessionService>,
        resolver: StrategyResolver,
        estimator: ReadyTimeEstimator,
        metrics: Arc<Metrics>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            orders,
            settings,
            sessions,
            resolver,
            estimator,
            metrics,
            store_timeout,
        }
    }

    /// Place a new order. A customer session used for placement is consumed
    /// whatever the outcome.
    pub async fn create(&self, restaurant_id: RestaurantId, new: NewOrder) -> Result<Order, OrderError> {
        let result = self.place(restaurant_id, new).await;

        match &result {
            Ok(order) => {
                self.metrics.record_order_created();
                tracing::info!(
                    restaurant_id,
                    order_id = order.id,
                    chef_id = ?order.assigned_chef_id,
                    total = order.total,
                    "Order created"
                );
            }
            Err(e) => self.reject("create", restaurant_id, e),
        }

        result
    }

    async fn place(&self, restaurant_id: RestaurantId, new: NewOrder) -> Result<Order, OrderError> {
        validate_items(&new.items)?;

        let customer = self.verify_customer(restaurant_id, &new).await?;
        let result = self.assemble_and_insert(restaurant_id, new, customer.phone).await;

        if let Some(consumption) = customer.consumption {
            consumption.finish().await;
        }

        result
    }

    async fn customer_auth_required(&self, restaurant_id: RestaurantId) -> bool {
        let setting = with_timeout(
            self.store_timeout,
            self.settings
                .get_by_key(restaurant_id, setting_keys::CUSTOMER_AUTH_REQUIRED),
        )
        .await;

        match setting {
            Ok(setting) => setting.value == "true",
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!(restaurant_id, error = %e, "Failed to read customer auth setting, treating as not required");
                false
            }
        }
    }

    async fn verify_customer(&self, restaurant_id: RestaurantId, new: &NewOrder) -> Result<VerifiedCustomer, OrderError> {
        let auth_required = self.customer_auth_required(restaurant_id).await;

        let token = match non_empty(&new.session_token) {
            Some(token) => token,
            None if auth_required => return Err(OrderError::CustomerAuthRequired),
            None => {
                let phone = non_empty(&new.customer_phone).ok_or(OrderError::CustomerPhoneRequired)?;
                return Ok(VerifiedCustomer {
                    phone: phone.to_string(),
                    consumption: None,
                });
            }
        };

        let session = tokio::time::timeout(self.store_timeout, self.sessions.get_session(token))
            .await
            .map_err(|_| OrderError::Store(StoreError::Timeout(self.store_timeout)))?
            .map_err(session_error)?;

        if session.restaurant_id != restaurant_id {
            return Err(OrderError::SessionRestaurantMismatch);
        }

        tracing::debug!(restaurant_id, auth_required, "Customer session accepted for order");

        Ok(VerifiedCustomer {
            phone: session.phone_number,
            consumption: Some(SessionConsumption::new(self.sessions.clone(), token.to_string())),
        })
    }

    async fn assemble_and_insert(
        &self,
        restaurant_id: RestaurantId,
        new: NewOrder,
        customer_phone: String,
    ) -> Result<Order, OrderError> {
        let total = compute_total(&new.items);
        let status = new.status.unwrap_or(OrderStatus::Pending);

        let chef_id = self.assign_chef(restaurant_id).await;

        let now = Utc::now();
        let estimate = self.estimator.estimate(restaurant_id, &new.items, chef_id, now).await;
        if let Some(reason) = estimate.reason() {
            tracing::warn!(restaurant_id, reason, "Ready estimate degraded");
        }
        let estimate = estimate.into_value();
        self.metrics.observe_estimate(estimate.minutes);

        let draft = OrderDraft {
            restaurant_id,
            table_number: non_empty(&new.table_number).map(str::to_string),
            customer_phone,
            customer_name: new.customer_name.unwrap_or_default(),
            items: new.items,
            special_instructions: new.special_instructions.unwrap_or_default(),
            total,
            status,
            assigned_chef_id: chef_id,
            estimated_ready_at: Some(estimate.ready_at),
        };

        let order = with_timeout(self.store_timeout, self.orders.insert(&draft, now)).await?;
        Ok(order)
    }

    /// Best-effort chef choice. Any failure leaves the order unassigned.
    async fn assign_chef(&self, restaurant_id: RestaurantId) -> Option<ChefId> {
        let assigner = self.resolver.resolve(restaurant_id).await;
        let strategy = assigner.strategy();

        let budget = self.resolver.assignment_budget();
        let assigned = match tokio::time::timeout(budget, assigner.assign(restaurant_id)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("assignment timed out after {:?}", budget)),
        };

        let (chef_id, outcome) = match assigned {
            Ok(Outcome::Exact(Some(chef_id))) => (Some(chef_id), assignment_outcome::ASSIGNED),
            Ok(Outcome::Exact(None)) => (None, assignment_outcome::NONE),
            Ok(Outcome::Degraded { value, reason }) => {
                tracing::warn!(restaurant_id, strategy = %strategy, reason = %reason, "Chef assignment degraded");
                (value, assignment_outcome::DEGRADED)
            }
            Err(e) => {
                tracing::error!(restaurant_id, strategy = %strategy, error = %e, "Chef auto-assignment failed");
                (None, assignment_outcome::FAILED)
            }
        };

        self.metrics.record_assignment(strategy.as_str(), outcome);
        tracing::info!(restaurant_id, strategy = %strategy, chef_id = ?chef_id, "Chef assignment decided");
        chef_id
    }

    /// Apply a partial update under the lifecycle rules. An update that
    /// changes nothing returns the stored order without writing.
    pub async fn update(
        &self,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order, OrderError> {
        let result = self.apply_update(restaurant_id, order_id, &update).await;
        if let Err(e) = &result {
            self.reject("update", restaurant_id, e);
        }
        result
    }

    async fn apply_update(
        &self,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        update: &OrderUpdate,
    ) -> Result<Order, OrderError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let existing = self.get(restaurant_id, order_id).await?;
            let changes = existing.plan_update(update)?;

            if changes.is_empty() {
                tracing::debug!(restaurant_id, order_id, "Order update changes nothing");
                return Ok(existing);
            }

            // The write only lands while the status is still the one planned against
            let written = with_timeout(
                self.store_timeout,
                self.orders
                    .update_fields(restaurant_id, order_id, existing.status, &changes, Utc::now()),
            )
            .await;

            match written {
                Ok(updated) => {
                    self.record_update(restaurant_id, order_id, existing.status, &changes);
                    return Ok(updated);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(restaurant_id, order_id, attempt, error = %e, "Order changed underneath update, re-planning");
                }
                Err(e) => return Err(order_store_error(order_id)(e)),
            }
        }

        Err(OrderError::ConcurrentUpdate(order_id))
    }

    fn record_update(
        &self,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        from: OrderStatus,
        changes: &OrderChanges,
    ) {
        if let Some(to) = changes.status {
            self.metrics.record_status_transition(from.as_str(), to.as_str());
            tracing::info!(restaurant_id, order_id, from = %from, to = %to, "Order status changed");
        }
        if let Some(chef_id) = changes.assigned_chef_id {
            tracing::info!(restaurant_id, order_id, chef_id, "Chef assigned to order");
        }
    }

    pub async fn get(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<Order, OrderError> {
        with_timeout(self.store_timeout, self.orders.get(restaurant_id, order_id))
            .await
            .map_err(order_store_error(order_id))
    }

    /// All orders of the restaurant, newest first.
    pub async fn list(&self, restaurant_id: RestaurantId) -> Result<Vec<Order>, OrderError> {
        Ok(with_timeout(self.store_timeout, self.orders.list(restaurant_id)).await?)
    }

    pub async fn list_by_status(
        &self,
        restaurant_id: RestaurantId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, OrderError> {
        Ok(with_timeout(self.store_timeout, self.orders.list_by_status(restaurant_id, status)).await?)
    }

    /// Order history of one customer at the restaurant.
    pub async fn list_by_phone(&self, restaurant_id: RestaurantId, phone: &str) -> Result<Vec<Order>, OrderError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(OrderError::CustomerPhoneRequired);
        }
        Ok(with_timeout(self.store_timeout, self.orders.list_by_phone(restaurant_id, phone)).await?)
    }

    pub async fn delete(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<(), OrderError> {
        let result = with_timeout(self.store_timeout, self.orders.delete(restaurant_id, order_id))
            .await
            .map_err(order_store_error(order_id));

        match &result {
            Ok(()) => tracing::info!(restaurant_id, order_id, "Order deleted"),
            Err(e) => self.reject("delete", restaurant_id, e),
        }
        result
    }

    fn reject(&self, operation: &str, restaurant_id: RestaurantId, error: &OrderError) {
        self.metrics.record_rejection(error.kind());
        match error {
            OrderError::Store(_) => {
                tracing::error!(operation, restaurant_id, error = %error, "Order operation failed")
            }
            _ => tracing::warn!(operation, restaurant_id, error = %error, "Order operation rejected"),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
