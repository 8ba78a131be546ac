use super::value_objects::OrderStatus;
use crate::domain::customer::SessionError;
use crate::models::{OrderId, ProductId};
use crate::store::StoreError;

// ============================================================================
// Order Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    // Validation
    #[error("Order must have at least one item")]
    EmptyItems,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    #[error("Customer mobile is required")]
    CustomerPhoneRequired,

    #[error("Customer authentication is required: please verify your phone number first")]
    CustomerAuthRequired,

    #[error("Invalid or expired session: {0}")]
    InvalidSession(#[source] SessionError),

    #[error("Session is not valid for this restaurant")]
    SessionRestaurantMismatch,

    // Not found
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    // Guards
    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Chef can only be assigned when order is in pending state (current: {0})")]
    ChefAssignmentNotPending(OrderStatus),

    #[error("Order {0} kept changing concurrently, update not applied")]
    ConcurrentUpdate(OrderId),

    // Mandatory store calls
    #[error("Order store failure: {0}")]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Coarse class used for logging and rejection metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::EmptyItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::CustomerPhoneRequired
            | OrderError::CustomerAuthRequired
            | OrderError::InvalidSession(_)
            | OrderError::SessionRestaurantMismatch => "validation",
            OrderError::NotFound(_) => "not_found",
            OrderError::InvalidStatusTransition { .. }
            | OrderError::ChefAssignmentNotPending(_)
            | OrderError::ConcurrentUpdate(_) => "guard",
            OrderError::Store(_) => "store",
        }
    }
}
