use serde::{Deserialize, Serialize};

// ============================================================================
// Shared Models
// ============================================================================
//
// Records exchanged with the collaborator stores. Order-specific types live
// in `domain::order`; these are the small, store-shaped values the core reads.
//
// ============================================================================

pub type RestaurantId = i64;
pub type OrderId = i64;
pub type ChefId = i64;
pub type ProductId = i64;

/// Staff role eligible for order assignment.
pub const CHEF_ROLE: &str = "chef";

/// Restaurant setting keys read by the ordering core.
pub mod setting_keys {
    pub const CHEF_ASSIGNMENT_STRATEGY: &str = "chef_assignment_strategy";
    pub const CUSTOMER_AUTH_REQUIRED: &str = "customer_auth_required";
}

/// An active chef as yielded by the chef directory.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chef {
    pub id: ChefId,
    pub restaurant_id: RestaurantId,
    pub username: String,
}

/// A staff member. Only `role == "chef"` and `active` staff are chefs for
/// assignment purposes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: ChefId,
    pub restaurant_id: RestaurantId,
    pub username: String,
    pub role: String,
    pub active: bool,
}

impl Staff {
    pub fn is_assignable_chef(&self) -> bool {
        self.active && self.role == CHEF_ROLE
    }
}

/// Number of active (pending/preparing) orders currently held by a chef.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChefLoad {
    pub chef_id: ChefId,
    pub order_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub restaurant_id: RestaurantId,
    pub key: String,
    pub value: String,
}

/// Verified customer session, created after a successful OTP check.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSession {
    pub phone_number: String,
    pub restaurant_id: RestaurantId,
    pub verified: bool,
}

/// Pending one-time password and the number of failed attempts against it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OtpRecord {
    pub otp: String,
    pub attempts: u32,
}
