// ============================================================================
// dinein_orders - Dine-in ordering core
// ============================================================================
//
// Multi-tenant order lifecycle with per-restaurant chef auto-assignment,
// ready-time estimates and OTP-verified customer sessions.
//
// ============================================================================

pub mod actors;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod models;
pub mod store;
pub mod utils;
