use serde::{Deserialize, Serialize};

// ============================================================================
// Customer Value Objects
// ============================================================================

/// Customer phone number as entered; only blank input is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(phone: &str) -> Option<Self> {
        let trimmed = phone.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returned after an OTP was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpReceipt {
    pub message: String,
    /// Seconds until the OTP expires
    pub expires_in: u64,
}

/// Returned after a successful OTP check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSession {
    pub session_token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub phone_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_number_trims_and_rejects_blank() {
        assert_eq!(PhoneNumber::parse("  +15550100 ").unwrap().as_str(), "+15550100");
        assert!(PhoneNumber::parse("   ").is_none());
        assert!(PhoneNumber::parse("").is_none());
    }
}
