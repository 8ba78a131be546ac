// ============================================================================
// Customer Domain - OTP-verified ordering sessions
// ============================================================================
//
// - Value objects (PhoneNumber, OtpReceipt, VerifiedSession)
// - Errors (SessionError)
// - OTP delivery seam (OtpSender)
// - Session service (CustomerSessionService)
//
// ============================================================================

pub mod errors;
pub mod sender;
pub mod service;
pub mod value_objects;

pub use errors::*;
pub use sender::*;
pub use service::*;
pub use value_objects::*;
