// ============================================================================
// Order Domain - Business Logic for the Order Lifecycle
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderItem, OrderStatus)
// - Commands (NewOrder, OrderUpdate)
// - Errors (OrderError enum)
// - Aggregate (Order with transition and chef-assignment rules)
// - Ready-time estimation (ReadyTimeEstimator)
// - Command Handler (OrderCommandHandler)
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod estimate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use estimate::*;
pub use command_handler::*;
