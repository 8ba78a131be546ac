// ============================================================================
// Actors Module
// ============================================================================
//
// The order actor is the in-process entry point to the order lifecycle.
// Business rules stay in `domain::order::OrderCommandHandler`; the actor only
// maps messages onto it.
//
// ============================================================================

mod order_actor;

pub use order_actor::{CreateOrder, DeleteOrder, GetOrder, ListOrders, OrderActor, OrderFilter, UpdateOrder};
