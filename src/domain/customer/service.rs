use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::errors::SessionError;
use super::sender::OtpSender;
use super::value_objects::{OtpReceipt, PhoneNumber, VerifiedSession};
use crate::models::{CustomerSession, OtpRecord, RestaurantId};
use crate::store::{OtpStore, SessionStore};
use crate::utils::{retry_on_transient, RetryConfig};

/// Limits governing OTP issuance and session lifetime.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub otp_length: usize,
    pub otp_ttl: Duration,
    pub session_ttl: Duration,
    pub max_attempts: u32,
    pub resend_cooldown: Duration,
    pub max_otp_per_window: u32,
    pub rate_window: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            otp_length: 6,
            otp_ttl: Duration::from_secs(5 * 60),
            session_ttl: Duration::from_secs(30 * 60),
            max_attempts: 5,
            resend_cooldown: Duration::from_secs(60),
            max_otp_per_window: 5,
            rate_window: Duration::from_secs(60 * 60),
        }
    }
}

fn generate_otp(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// OTP-verified customer sessions. A session binds a phone number to one
/// restaurant and is consumed by the order it authorises.
pub struct CustomerSessionService {
    sessions: Arc<dyn SessionStore>,
    otps: Arc<dyn OtpStore>,
    sender: Arc<dyn OtpSender>,
    policy: SessionPolicy,
    retry: RetryConfig,
}

impl CustomerSessionService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        otps: Arc<dyn OtpStore>,
        sender: Arc<dyn OtpSender>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            sessions,
            otps,
            sender,
            policy,
            retry: RetryConfig::conservative(),
        }
    }

    pub async fn send_otp(&self, phone: &str, restaurant_id: RestaurantId) -> Result<OtpReceipt, SessionError> {
        let phone = PhoneNumber::parse(phone).ok_or(SessionError::PhoneRequired)?;
        if restaurant_id <= 0 {
            return Err(SessionError::RestaurantRequired);
        }

        if self.otps.otp_request_count(phone.as_str()).await? >= self.policy.max_otp_per_window {
            return Err(SessionError::RateLimited);
        }

        if let Some(remaining) = self.otps.cooldown_remaining(phone.as_str()).await? {
            return Err(SessionError::Cooldown(remaining.as_secs().max(1)));
        }

        let otp = generate_otp(self.policy.otp_length);
        let record = OtpRecord {
            otp: otp.clone(),
            attempts: 0,
        };
        self.otps.put_otp(phone.as_str(), &record, self.policy.otp_ttl).await?;
        self.otps
            .start_cooldown(phone.as_str(), self.policy.resend_cooldown)
            .await?;
        self.otps
            .record_otp_request(phone.as_str(), self.policy.rate_window)
            .await?;

        tracing::info!(phone = %phone.as_str(), restaurant_id, "OTP generated");

        let sender = self.sender.clone();
        let destination = phone.as_str().to_string();
        tokio::spawn(async move {
            if let Err(e) = sender.send_otp(&destination, &otp).await {
                tracing::warn!(phone = %destination, error = %e, "Failed to deliver OTP");
            }
        });

        Ok(OtpReceipt {
            message: "OTP sent successfully".to_string(),
            expires_in: self.policy.otp_ttl.as_secs(),
        })
    }

    pub async fn verify_otp(
        &self,
        phone: &str,
        otp: &str,
        restaurant_id: RestaurantId,
    ) -> Result<VerifiedSession, SessionError> {
        let phone = PhoneNumber::parse(phone).ok_or(SessionError::PhoneRequired)?;
        if otp.is_empty() {
            return Err(SessionError::OtpRequired);
        }
        if restaurant_id <= 0 {
            return Err(SessionError::RestaurantRequired);
        }

        let (mut record, remaining) = self
            .otps
            .get_otp(phone.as_str())
            .await?
            .ok_or(SessionError::OtpExpired)?;

        if record.attempts >= self.policy.max_attempts {
            self.otps.delete_otp(phone.as_str()).await?;
            return Err(SessionError::TooManyAttempts);
        }

        if record.otp != otp {
            record.attempts += 1;
            // Wrong guesses do not extend the OTP lifetime
            self.otps
                .put_otp(phone.as_str(), &record, remaining.max(Duration::from_secs(1)))
                .await?;
            return Err(SessionError::InvalidOtp(
                self.policy.max_attempts.saturating_sub(record.attempts),
            ));
        }

        self.otps.delete_otp(phone.as_str()).await?;

        let token = Uuid::new_v4().to_string();
        let session = CustomerSession {
            phone_number: phone.as_str().to_string(),
            restaurant_id,
            verified: true,
        };
        self.sessions
            .put_session(&token, &session, self.policy.session_ttl)
            .await?;

        let ttl_secs = i64::try_from(self.policy.session_ttl.as_secs()).unwrap_or(i64::MAX);
        tracing::info!(phone = %phone.as_str(), restaurant_id, "Customer phone verified");

        Ok(VerifiedSession {
            session_token: token,
            expires_at: Utc::now().timestamp().saturating_add(ttl_secs),
            phone_number: session.phone_number,
        })
    }

    pub async fn get_session(&self, token: &str) -> Result<CustomerSession, SessionError> {
        if token.is_empty() {
            return Err(SessionError::TokenRequired);
        }

        self.sessions
            .get_session(token)
            .await?
            .ok_or(SessionError::Expired)
    }

    /// Consume a session. Transient store failures are retried so a placed
    /// order does not leave a reusable session behind.
    pub async fn invalidate_session(&self, token: &str) -> Result<(), SessionError> {
        if token.is_empty() {
            return Err(SessionError::TokenRequired);
        }

        retry_on_transient("invalidate_session", &self.retry, |_attempt| {
            self.sessions.invalidate_session(token)
        })
        .await
        .into_result()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::LoggingOtpSender;
    use crate::store::memory::MemorySessionStore;

    fn service_with(policy: SessionPolicy) -> (CustomerSessionService, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let service = CustomerSessionService::new(store.clone(), store.clone(), Arc::new(LoggingOtpSender), policy);
        (service, store)
    }

    async fn issued_otp(store: &MemorySessionStore, phone: &str) -> String {
        store.get_otp(phone).await.unwrap().unwrap().0.otp
    }

    #[test]
    fn test_generated_otp_is_numeric() {
        let otp = generate_otp(6);
        assert_eq!(otp.len(), 6);
        assert!(otp.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_otp_round_trip_issues_session() {
        let (service, store) = service_with(SessionPolicy::default());

        let receipt = service.send_otp("+15550100", 3).await.unwrap();
        assert_eq!(receipt.expires_in, 300);

        let otp = issued_otp(&store, "+15550100").await;
        let verified = service.verify_otp("+15550100", &otp, 3).await.unwrap();

        let session = service.get_session(&verified.session_token).await.unwrap();
        assert_eq!(session.phone_number, "+15550100");
        assert_eq!(session.restaurant_id, 3);
        assert!(store.get_otp("+15550100").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resend_cooldown() {
        let (service, _store) = service_with(SessionPolicy::default());

        service.send_otp("+15550100", 3).await.unwrap();
        let err = service.send_otp("+15550100", 3).await.unwrap_err();
        assert!(matches!(err, SessionError::Cooldown(secs) if secs > 0 && secs <= 60));
    }

    #[tokio::test]
    async fn test_rate_limit_per_window() {
        let policy = SessionPolicy {
            resend_cooldown: Duration::ZERO,
            max_otp_per_window: 2,
            ..SessionPolicy::default()
        };
        let (service, _store) = service_with(policy);

        service.send_otp("+15550100", 3).await.unwrap();
        service.send_otp("+15550100", 3).await.unwrap();
        assert!(matches!(
            service.send_otp("+15550100", 3).await,
            Err(SessionError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_wrong_codes_count_down_then_lock() {
        let policy = SessionPolicy {
            max_attempts: 2,
            ..SessionPolicy::default()
        };
        let (service, store) = service_with(policy);
        service.send_otp("+15550100", 3).await.unwrap();
        let otp = issued_otp(&store, "+15550100").await;
        let wrong = if otp == "000000" { "111111" } else { "000000" };

        assert!(matches!(
            service.verify_otp("+15550100", wrong, 3).await,
            Err(SessionError::InvalidOtp(1))
        ));
        assert!(matches!(
            service.verify_otp("+15550100", wrong, 3).await,
            Err(SessionError::InvalidOtp(0))
        ));
        assert!(matches!(
            service.verify_otp("+15550100", &otp, 3).await,
            Err(SessionError::TooManyAttempts)
        ));
        assert!(matches!(
            service.verify_otp("+15550100", &otp, 3).await,
            Err(SessionError::OtpExpired)
        ));
    }

    #[tokio::test]
    async fn test_invalidated_session_is_gone() {
        let (service, store) = service_with(SessionPolicy::default());
        service.send_otp("+15550100", 3).await.unwrap();
        let otp = issued_otp(&store, "+15550100").await;
        let verified = service.verify_otp("+15550100", &otp, 3).await.unwrap();

        service.invalidate_session(&verified.session_token).await.unwrap();

        assert!(matches!(
            service.get_session(&verified.session_token).await,
            Err(SessionError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_required_inputs() {
        let (service, _store) = service_with(SessionPolicy::default());

        assert!(matches!(service.send_otp(" ", 3).await, Err(SessionError::PhoneRequired)));
        assert!(matches!(service.send_otp("+15550100", 0).await, Err(SessionError::RestaurantRequired)));
        assert!(matches!(service.verify_otp("+15550100", "", 3).await, Err(SessionError::OtpRequired)));
        assert!(matches!(service.get_session("").await, Err(SessionError::TokenRequired)));
    }
}
