// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each area has its own subdirectory:
// - order: lifecycle rules, ready estimates, placement and update handling
// - assignment: per-restaurant chef assignment policies
// - customer: OTP-verified customer sessions
//
// Store access goes through the traits in `crate::store` only.
//
// ============================================================================

pub mod assignment;
pub mod customer;
pub mod order;
pub mod outcome;
