use async_trait::async_trait;

/// Delivers a one-time password to the customer. SMS provider integration
/// lives outside this crate.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send_otp(&self, phone: &str, otp: &str) -> anyhow::Result<()>;
}

/// Development sender: logs the code instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingOtpSender;

#[async_trait]
impl OtpSender for LoggingOtpSender {
    async fn send_otp(&self, phone: &str, otp: &str) -> anyhow::Result<()> {
        tracing::info!(phone = %phone, otp = %otp, "[DEV] OTP not delivered, SMS sender disabled");
        Ok(())
    }
}
