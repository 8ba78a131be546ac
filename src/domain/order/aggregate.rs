use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::commands::{non_empty, OrderUpdate};
use super::errors::OrderError;
use super::value_objects::{compute_total, OrderItem, OrderStatus};
use crate::models::{ChefId, OrderId, RestaurantId};

// ============================================================================
// Order - Lifecycle rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub restaurant_id: RestaurantId,

    // Customer
    pub table_number: Option<String>,
    pub customer_phone: String,
    pub customer_name: String,

    // Contents
    pub items: Vec<OrderItem>,
    pub special_instructions: String,
    pub total: f64,

    // Kitchen
    pub status: OrderStatus,
    pub assigned_chef_id: Option<ChefId>,
    pub estimated_ready_at: Option<DateTime<Utc>>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fully resolved order that has not been persisted yet. Chef and estimate
/// are already decided, so the row is written once and complete.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub restaurant_id: RestaurantId,
    pub table_number: Option<String>,
    pub customer_phone: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub special_instructions: String,
    pub total: f64,
    pub status: OrderStatus,
    pub assigned_chef_id: Option<ChefId>,
    pub estimated_ready_at: Option<DateTime<Utc>>,
}

impl OrderDraft {
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            id,
            restaurant_id: self.restaurant_id,
            table_number: self.table_number,
            customer_phone: self.customer_phone,
            customer_name: self.customer_name,
            items: self.items,
            special_instructions: self.special_instructions,
            total: self.total,
            status: self.status,
            assigned_chef_id: self.assigned_chef_id,
            estimated_ready_at: self.estimated_ready_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields that differ from the stored order. `items` and `total` always travel
/// together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub assigned_chef_id: Option<ChefId>,
    pub table_number: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_name: Option<String>,
    pub items: Option<(Vec<OrderItem>, f64)>,
    pub special_instructions: Option<String>,
}

impl OrderChanges {
    pub fn is_empty(&self) -> bool {
        *self == OrderChanges::default()
    }

    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(chef_id) = self.assigned_chef_id {
            order.assigned_chef_id = Some(chef_id);
        }
        if let Some(table) = &self.table_number {
            order.table_number = Some(table.clone());
        }
        if let Some(phone) = &self.customer_phone {
            order.customer_phone = phone.clone();
        }
        if let Some(name) = &self.customer_name {
            order.customer_name = name.clone();
        }
        if let Some((items, total)) = &self.items {
            order.items = items.clone();
            order.total = *total;
        }
        if let Some(instructions) = &self.special_instructions {
            order.special_instructions = instructions.clone();
        }
        order.updated_at = now;
    }
}

pub fn validate_items(items: &[OrderItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyItems);
    }

    for item in items {
        if item.quantity <= 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }
    }

    Ok(())
}

impl Order {
    /// Check `update` against the lifecycle rules and reduce it to the fields
    /// that actually change.
    ///
    /// Chef (re)assignment is only legal while the order is pending, whatever
    /// status the same update asks for. A status equal to the current one is
    /// not a transition and is dropped silently.
    pub fn plan_update(&self, update: &OrderUpdate) -> Result<OrderChanges, OrderError> {
        if update.assigned_chef_id.is_some() && self.status != OrderStatus::Pending {
            return Err(OrderError::ChefAssignmentNotPending(self.status));
        }

        let mut changes = OrderChanges::default();

        if let Some(next) = update.status {
            if next != self.status {
                if !self.status.can_transition_to(next) {
                    return Err(OrderError::InvalidStatusTransition {
                        from: self.status,
                        to: next,
                    });
                }
                changes.status = Some(next);
            }
        }

        if let Some(chef_id) = update.assigned_chef_id {
            if self.assigned_chef_id != Some(chef_id) {
                changes.assigned_chef_id = Some(chef_id);
            }
        }

        if let Some(items) = update.items.as_ref().filter(|items| !items.is_empty()) {
            validate_items(items)?;
            if *items != self.items {
                changes.items = Some((items.clone(), compute_total(items)));
            }
        }

        if let Some(table) = non_empty(&update.table_number) {
            if self.table_number.as_deref() != Some(table) {
                changes.table_number = Some(table.to_string());
            }
        }
        if let Some(phone) = non_empty(&update.customer_phone) {
            if self.customer_phone != phone {
                changes.customer_phone = Some(phone.to_string());
            }
        }
        if let Some(name) = non_empty(&update.customer_name) {
            if self.customer_name != name {
                changes.customer_name = Some(name.to_string());
            }
        }
        if let Some(instructions) = non_empty(&update.special_instructions) {
            if self.special_instructions != instructions {
                changes.special_instructions = Some(instructions.to_string());
            }
        }

        Ok(changes)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: i64, price: f64, quantity: i32) -> OrderItem {
        OrderItem {
            product_id,
            name: format!("dish-{}", product_id),
            price,
            quantity,
            veg: true,
        }
    }

    fn order_in(status: OrderStatus) -> Order {
        let now = Utc::now();
        OrderDraft {
            restaurant_id: 1,
            table_number: Some("4".to_string()),
            customer_phone: "+15550100".to_string(),
            customer_name: "Asha".to_string(),
            items: vec![item(1, 5.0, 2)],
            special_instructions: String::new(),
            total: 10.0,
            status,
            assigned_chef_id: None,
            estimated_ready_at: None,
        }
        .into_order(42, now)
    }

    #[test]
    fn test_chef_assignment_rejected_outside_pending_for_every_target() {
        for current in [OrderStatus::Preparing, OrderStatus::Completed, OrderStatus::Cancelled] {
            let order = order_in(current);
            for target in OrderStatus::ALL.into_iter().map(Some).chain([None]) {
                let update = OrderUpdate {
                    status: target,
                    assigned_chef_id: Some(9),
                    ..Default::default()
                };
                let err = order.plan_update(&update).unwrap_err();
                assert!(
                    matches!(err, OrderError::ChefAssignmentNotPending(s) if s == current),
                    "{} with target {:?} gave {:?}",
                    current,
                    target,
                    err
                );
            }
        }
    }

    #[test]
    fn test_chef_assignment_allowed_while_pending() {
        let order = order_in(OrderStatus::Pending);
        let update = OrderUpdate {
            status: Some(OrderStatus::Preparing),
            assigned_chef_id: Some(9),
            ..Default::default()
        };

        let changes = order.plan_update(&update).unwrap();
        assert_eq!(changes.assigned_chef_id, Some(9));
        assert_eq!(changes.status, Some(OrderStatus::Preparing));
    }

    #[test]
    fn test_every_transition_outcome() {
        for from in OrderStatus::ALL {
            let order = order_in(from);
            for to in OrderStatus::ALL {
                let update = OrderUpdate {
                    status: Some(to),
                    ..Default::default()
                };
                let result = order.plan_update(&update);

                if from == to {
                    assert!(result.unwrap().is_empty(), "{} -> {} must be a no-op", from, to);
                } else if from.can_transition_to(to) {
                    assert_eq!(result.unwrap().status, Some(to));
                } else {
                    assert!(matches!(
                        result,
                        Err(OrderError::InvalidStatusTransition { from: f, to: t }) if f == from && t == to
                    ));
                }
            }
        }
    }

    #[test]
    fn test_new_items_recompute_total() {
        let order = order_in(OrderStatus::Pending);
        let update = OrderUpdate {
            items: Some(vec![item(1, 5.0, 1), item(2, 7.25, 4)]),
            ..Default::default()
        };

        let changes = order.plan_update(&update).unwrap();
        let (items, total) = changes.items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(total, 34.0);
    }

    #[test]
    fn test_blank_and_unchanged_fields_are_ignored() {
        let order = order_in(OrderStatus::Pending);
        let update = OrderUpdate {
            table_number: Some("4".to_string()),
            customer_name: Some(String::new()),
            items: Some(vec![]),
            special_instructions: None,
            ..Default::default()
        };

        assert!(order.plan_update(&update).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_items_rejected_on_update() {
        let order = order_in(OrderStatus::Pending);
        let update = OrderUpdate {
            items: Some(vec![item(1, 5.0, 0)]),
            ..Default::default()
        };

        assert!(matches!(
            order.plan_update(&update),
            Err(OrderError::InvalidQuantity { product_id: 1, quantity: 0 })
        ));
    }

    #[test]
    fn test_apply_merges_only_present_fields() {
        let mut order = order_in(OrderStatus::Pending);
        let before = order.clone();
        let later = before.updated_at + chrono::Duration::seconds(30);

        let changes = OrderChanges {
            status: Some(OrderStatus::Preparing),
            special_instructions: Some("no onions".to_string()),
            ..Default::default()
        };
        changes.apply_to(&mut order, later);

        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.special_instructions, "no onions");
        assert_eq!(order.items, before.items);
        assert_eq!(order.total, before.total);
        assert_eq!(order.created_at, before.created_at);
        assert_eq!(order.updated_at, later);
    }

    #[test]
    fn test_validate_items() {
        assert!(matches!(validate_items(&[]), Err(OrderError::EmptyItems)));
        assert!(validate_items(&[item(1, 1.0, 1)]).is_ok());
        assert!(validate_items(&[item(1, 1.0, -2)]).is_err());
    }
}
