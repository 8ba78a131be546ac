use serde::{Deserialize, Serialize};

use super::value_objects::{OrderItem, OrderStatus};
use crate::models::ChefId;

// ============================================================================
// Order Commands - Represent caller intent
// ============================================================================

/// Order placement request. Any client-supplied total is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default)]
    pub table_number: Option<String>,
    /// Used only when no session token is supplied
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    /// Verified-phone session from the OTP flow; consumed by placement
    #[serde(default)]
    pub session_token: Option<String>,
}

/// Partial order update. `None`, empty strings and empty item lists leave the
/// field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub assigned_chef_id: Option<ChefId>,
    #[serde(default)]
    pub table_number: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<OrderItem>>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
