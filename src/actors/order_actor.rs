use actix::prelude::*;
use std::sync::Arc;

use crate::domain::order::{NewOrder, Order, OrderCommandHandler, OrderError, OrderStatus, OrderUpdate};
use crate::models::{OrderId, RestaurantId};

// ============================================================================
// Actor Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<Order, OrderError>")]
pub struct CreateOrder {
    pub restaurant_id: RestaurantId,
    pub order: NewOrder,
}

#[derive(Message)]
#[rtype(result = "Result<Order, OrderError>")]
pub struct UpdateOrder {
    pub restaurant_id: RestaurantId,
    pub order_id: OrderId,
    pub update: OrderUpdate,
}

#[derive(Message)]
#[rtype(result = "Result<Order, OrderError>")]
pub struct GetOrder {
    pub restaurant_id: RestaurantId,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Default)]
pub enum OrderFilter {
    #[default]
    All,
    Status(OrderStatus),
    /// Customer order history
    Phone(String),
}

#[derive(Message)]
#[rtype(result = "Result<Vec<Order>, OrderError>")]
pub struct ListOrders {
    pub restaurant_id: RestaurantId,
    pub filter: OrderFilter,
}

#[derive(Message)]
#[rtype(result = "Result<(), OrderError>")]
pub struct DeleteOrder {
    pub restaurant_id: RestaurantId,
    pub order_id: OrderId,
}

// ============================================================================
// Order Actor - Front door to the order lifecycle
// ============================================================================
//
// Every message runs as its own future on the actor's arbiter, so a slow
// store call for one order never holds up another.
//
// ============================================================================

pub struct OrderActor {
    handler: Arc<OrderCommandHandler>,
}

impl OrderActor {
    pub fn new(handler: Arc<OrderCommandHandler>) -> Self {
        Self { handler }
    }
}

impl Actor for OrderActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("OrderActor started");
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<CreateOrder> for OrderActor {
    type Result = ResponseFuture<Result<Order, OrderError>>;

    fn handle(&mut self, msg: CreateOrder, _: &mut Self::Context) -> Self::Result {
        let handler = self.handler.clone();

        Box::pin(async move {
            tracing::debug!(
                restaurant_id = msg.restaurant_id,
                item_count = msg.order.items.len(),
                "Creating new order"
            );
            handler.create(msg.restaurant_id, msg.order).await
        })
    }
}

impl Handler<UpdateOrder> for OrderActor {
    type Result = ResponseFuture<Result<Order, OrderError>>;

    fn handle(&mut self, msg: UpdateOrder, _: &mut Self::Context) -> Self::Result {
        let handler = self.handler.clone();

        Box::pin(async move {
            tracing::debug!(
                restaurant_id = msg.restaurant_id,
                order_id = msg.order_id,
                status = ?msg.update.status,
                "Updating order"
            );
            handler.update(msg.restaurant_id, msg.order_id, msg.update).await
        })
    }
}

impl Handler<GetOrder> for OrderActor {
    type Result = ResponseFuture<Result<Order, OrderError>>;

    fn handle(&mut self, msg: GetOrder, _: &mut Self::Context) -> Self::Result {
        let handler = self.handler.clone();
        Box::pin(async move { handler.get(msg.restaurant_id, msg.order_id).await })
    }
}

impl Handler<ListOrders> for OrderActor {
    type Result = ResponseFuture<Result<Vec<Order>, OrderError>>;

    fn handle(&mut self, msg: ListOrders, _: &mut Self::Context) -> Self::Result {
        let handler = self.handler.clone();

        Box::pin(async move {
            match msg.filter {
                OrderFilter::All => handler.list(msg.restaurant_id).await,
                OrderFilter::Status(status) => handler.list_by_status(msg.restaurant_id, status).await,
                OrderFilter::Phone(phone) => handler.list_by_phone(msg.restaurant_id, &phone).await,
            }
        })
    }
}

impl Handler<DeleteOrder> for OrderActor {
    type Result = ResponseFuture<Result<(), OrderError>>;

    fn handle(&mut self, msg: DeleteOrder, _: &mut Self::Context) -> Self::Result {
        let handler = self.handler.clone();
        Box::pin(async move { handler.delete(msg.restaurant_id, msg.order_id).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assignment::StrategyResolver;
    use crate::domain::customer::{CustomerSessionService, LoggingOtpSender, SessionPolicy};
    use crate::domain::order::{OrderItem, ReadyTimeEstimator};
    use crate::metrics::Metrics;
    use crate::models::setting_keys;
    use crate::store::memory::{MemoryCounter, MemorySessionStore, MemoryStore};
    use std::time::Duration;

    fn start_actor(store: Arc<MemoryStore>) -> Addr<OrderActor> {
        let timeout = Duration::from_secs(1);
        let sessions = Arc::new(MemorySessionStore::new());
        let session_service = Arc::new(CustomerSessionService::new(
            sessions.clone(),
            sessions,
            Arc::new(LoggingOtpSender),
            SessionPolicy::default(),
        ));
        let resolver = StrategyResolver::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(MemoryCounter::new()),
            timeout,
        );
        let estimator = ReadyTimeEstimator::new(store.clone(), store.clone(), timeout);
        let handler = OrderCommandHandler::new(
            store.clone(),
            store,
            session_service,
            resolver,
            estimator,
            Arc::new(Metrics::new().unwrap()),
            timeout,
        );
        OrderActor::new(Arc::new(handler)).start()
    }

    fn new_order(phone: &str) -> NewOrder {
        NewOrder {
            customer_phone: Some(phone.to_string()),
            items: vec![OrderItem {
                product_id: 1,
                name: "paneer tikka".to_string(),
                price: 9.5,
                quantity: 2,
                veg: true,
            }],
            ..Default::default()
        }
    }

    #[actix::test]
    async fn test_order_lifecycle_through_actor() {
        let store = Arc::new(MemoryStore::new());
        store.add_chef(1, 4, true);
        store.set_setting(1, setting_keys::CHEF_ASSIGNMENT_STRATEGY, "least_loaded");
        let actor = start_actor(store);

        let order = actor
            .send(CreateOrder {
                restaurant_id: 1,
                order: new_order("+15550100"),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.total, 19.0);
        assert_eq!(order.assigned_chef_id, Some(4));

        let updated = actor
            .send(UpdateOrder {
                restaurant_id: 1,
                order_id: order.id,
                update: OrderUpdate {
                    status: Some(OrderStatus::Preparing),
                    ..Default::default()
                },
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Preparing);

        let fetched = actor
            .send(GetOrder {
                restaurant_id: 1,
                order_id: order.id,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, updated);

        let preparing = actor
            .send(ListOrders {
                restaurant_id: 1,
                filter: OrderFilter::Status(OrderStatus::Preparing),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(preparing.len(), 1);

        let history = actor
            .send(ListOrders {
                restaurant_id: 1,
                filter: OrderFilter::Phone("+15550100".to_string()),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.len(), 1);

        actor
            .send(DeleteOrder {
                restaurant_id: 1,
                order_id: order.id,
            })
            .await
            .unwrap()
            .unwrap();

        let all = actor
            .send(ListOrders {
                restaurant_id: 1,
                filter: OrderFilter::All,
            })
            .await
            .unwrap()
            .unwrap();
        assert!(all.is_empty());
    }

    #[actix::test]
    async fn test_rejections_travel_back_as_errors() {
        let actor = start_actor(Arc::new(MemoryStore::new()));

        let result = actor
            .send(GetOrder {
                restaurant_id: 1,
                order_id: 99,
            })
            .await
            .unwrap();

        assert!(matches!(result, Err(OrderError::NotFound(99))));
    }
}
