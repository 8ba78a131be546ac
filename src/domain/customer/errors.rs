use crate::store::StoreError;

// ============================================================================
// Customer Session Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Phone number is required")]
    PhoneRequired,

    #[error("Restaurant ID is required")]
    RestaurantRequired,

    #[error("OTP is required")]
    OtpRequired,

    #[error("Session token is required")]
    TokenRequired,

    #[error("Too many OTP requests. Please try again later")]
    RateLimited,

    #[error("Please wait {0} seconds before requesting another OTP")]
    Cooldown(u64),

    #[error("OTP expired or not found. Please request a new OTP")]
    OtpExpired,

    #[error("Too many failed attempts. Please request a new OTP")]
    TooManyAttempts,

    #[error("Invalid OTP. {0} attempts remaining")]
    InvalidOtp(u32),

    #[error("Session expired or invalid")]
    Expired,

    #[error("Session store failure: {0}")]
    Store(#[from] StoreError),
}
