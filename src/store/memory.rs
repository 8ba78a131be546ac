use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{
    ChefDirectory, LoadQuery, OrderRepository, OtpStore, ProductStore, SessionStore, SettingsStore,
    SharedCounter, StoreError,
};
use crate::domain::assignment::pick_least_recently_assigned;
use crate::domain::order::{Order, OrderChanges, OrderDraft, OrderItem, OrderStatus};
use crate::models::{
    Chef, ChefId, ChefLoad, CustomerSession, OrderId, OtpRecord, ProductId, RestaurantId, Setting, Staff,
    CHEF_ROLE,
};

// ============================================================================
// In-Memory Stores
// ============================================================================
//
// Process-local implementations of every store trait. Used by the unit tests
// and for running the service without Postgres or Redis.
//
// ============================================================================

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked writer leaves plain data behind; keep serving it.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Tables {
    staff: Vec<Staff>,
    settings: HashMap<(RestaurantId, String), String>,
    prep_times: HashMap<(RestaurantId, ProductId), i32>,
    orders: BTreeMap<OrderId, Order>,
    next_order_id: OrderId,
}

impl Tables {
    fn insert_order(&mut self, draft: OrderDraft, now: DateTime<Utc>) -> Order {
        self.next_order_id += 1;
        let order = draft.into_order(self.next_order_id, now);
        self.orders.insert(order.id, order.clone());
        order
    }

    fn restaurant_orders(&self, restaurant_id: RestaurantId) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(move |o| o.restaurant_id == restaurant_id)
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

/// Staff, settings, products and orders for any number of restaurants.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_staff(&self, staff: Staff) {
        lock(&self.tables).staff.push(staff);
    }

    pub fn add_chef(&self, restaurant_id: RestaurantId, chef_id: ChefId, active: bool) {
        self.add_staff(Staff {
            id: chef_id,
            restaurant_id,
            username: format!("chef-{}", chef_id),
            role: CHEF_ROLE.to_string(),
            active,
        });
    }

    pub fn set_setting(&self, restaurant_id: RestaurantId, key: &str, value: &str) {
        lock(&self.tables)
            .settings
            .insert((restaurant_id, key.to_string()), value.to_string());
    }

    pub fn set_prep_time(&self, restaurant_id: RestaurantId, product_id: ProductId, minutes: i32) {
        lock(&self.tables)
            .prep_times
            .insert((restaurant_id, product_id), minutes);
    }

    /// Seed `count` pending orders held by `chef_id`.
    pub fn seed_active_orders(&self, restaurant_id: RestaurantId, chef_id: ChefId, count: usize) {
        self.seed_orders(restaurant_id, chef_id, OrderStatus::Pending, count);
    }

    /// Seed `count` single-item orders held by `chef_id`, created now.
    pub fn seed_orders(&self, restaurant_id: RestaurantId, chef_id: ChefId, status: OrderStatus, count: usize) {
        let mut tables = lock(&self.tables);
        for _ in 0..count {
            let draft = OrderDraft {
                restaurant_id,
                table_number: None,
                customer_phone: "seed".to_string(),
                customer_name: String::new(),
                items: vec![OrderItem {
                    product_id: 0,
                    name: "seed".to_string(),
                    price: 0.0,
                    quantity: 1,
                    veg: false,
                }],
                special_instructions: String::new(),
                total: 0.0,
                status,
                assigned_chef_id: Some(chef_id),
                estimated_ready_at: None,
            };
            tables.insert_order(draft, Utc::now());
        }
    }

    pub fn order_count(&self) -> usize {
        lock(&self.tables).orders.len()
    }
}

#[async_trait]
impl ChefDirectory for MemoryStore {
    async fn active_chefs(&self, restaurant_id: RestaurantId) -> Result<Vec<Chef>, StoreError> {
        let tables = lock(&self.tables);
        let mut chefs: Vec<Chef> = tables
            .staff
            .iter()
            .filter(|s| s.restaurant_id == restaurant_id && s.is_assignable_chef())
            .map(|s| Chef {
                id: s.id,
                restaurant_id: s.restaurant_id,
                username: s.username.clone(),
            })
            .collect();
        chefs.sort_by_key(|c| c.id);
        Ok(chefs)
    }
}

#[async_trait]
impl LoadQuery for MemoryStore {
    async fn chef_loads(&self, restaurant_id: RestaurantId) -> Result<Vec<ChefLoad>, StoreError> {
        let tables = lock(&self.tables);
        let mut counts: BTreeMap<ChefId, i64> = BTreeMap::new();
        for order in tables.restaurant_orders(restaurant_id).filter(|o| o.status.is_active()) {
            if let Some(chef_id) = order.assigned_chef_id {
                *counts.entry(chef_id).or_insert(0) += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(chef_id, order_count)| ChefLoad { chef_id, order_count })
            .collect())
    }

    async fn chef_active_order_count(&self, chef_id: ChefId) -> Result<i64, StoreError> {
        let tables = lock(&self.tables);
        let count = tables
            .orders
            .values()
            .filter(|o| o.assigned_chef_id == Some(chef_id) && o.status.is_active())
            .count();
        Ok(count as i64)
    }

    async fn least_recently_assigned_chef(
        &self,
        restaurant_id: RestaurantId,
        candidates: &[ChefId],
    ) -> Result<Option<ChefId>, StoreError> {
        let tables = lock(&self.tables);
        let mut last_assigned: HashMap<ChefId, DateTime<Utc>> = HashMap::new();
        for order in tables.restaurant_orders(restaurant_id) {
            if let Some(chef_id) = order.assigned_chef_id {
                let latest = last_assigned.entry(chef_id).or_insert(order.created_at);
                if order.created_at > *latest {
                    *latest = order.created_at;
                }
            }
        }
        Ok(pick_least_recently_assigned(candidates, &last_assigned))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_by_key(&self, restaurant_id: RestaurantId, key: &str) -> Result<Setting, StoreError> {
        let tables = lock(&self.tables);
        tables
            .settings
            .get(&(restaurant_id, key.to_string()))
            .map(|value| Setting {
                restaurant_id,
                key: key.to_string(),
                value: value.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(format!("setting {} for restaurant {}", key, restaurant_id)))
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn prep_times(
        &self,
        restaurant_id: RestaurantId,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, i32>, StoreError> {
        let tables = lock(&self.tables);
        Ok(product_ids
            .iter()
            .filter_map(|id| tables.prep_times.get(&(restaurant_id, *id)).map(|m| (*id, *m)))
            .collect())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, draft: &OrderDraft, now: DateTime<Utc>) -> Result<Order, StoreError> {
        Ok(lock(&self.tables).insert_order(draft.clone(), now))
    }

    async fn get(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<Order, StoreError> {
        lock(&self.tables)
            .orders
            .get(&order_id)
            .filter(|o| o.restaurant_id == restaurant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))
    }

    async fn update_fields(
        &self,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        expected: OrderStatus,
        changes: &OrderChanges,
        now: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        let mut tables = lock(&self.tables);
        let order = tables
            .orders
            .get_mut(&order_id)
            .filter(|o| o.restaurant_id == restaurant_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;
        if order.status != expected {
            return Err(StoreError::Conflict(format!(
                "order {} is {}, expected {}",
                order_id, order.status, expected
            )));
        }
        changes.apply_to(order, now);
        Ok(order.clone())
    }

    async fn delete(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables);
        match tables.orders.get(&order_id) {
            Some(order) if order.restaurant_id == restaurant_id => {
                tables.orders.remove(&order_id);
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("order {}", order_id))),
        }
    }

    async fn list(&self, restaurant_id: RestaurantId) -> Result<Vec<Order>, StoreError> {
        let tables = lock(&self.tables);
        Ok(newest_first(tables.restaurant_orders(restaurant_id).cloned().collect()))
    }

    async fn list_by_status(
        &self,
        restaurant_id: RestaurantId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError> {
        let tables = lock(&self.tables);
        Ok(newest_first(
            tables
                .restaurant_orders(restaurant_id)
                .filter(|o| o.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_phone(&self, restaurant_id: RestaurantId, phone: &str) -> Result<Vec<Order>, StoreError> {
        let tables = lock(&self.tables);
        Ok(newest_first(
            tables
                .restaurant_orders(restaurant_id)
                .filter(|o| o.customer_phone == phone)
                .cloned()
                .collect(),
        ))
    }
}

/// Named counters with atomic increment-and-get.
#[derive(Default)]
pub struct MemoryCounter {
    values: Mutex<HashMap<String, i64>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, key: &str) -> i64 {
        lock(&self.values).get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SharedCounter for MemoryCounter {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut values = lock(&self.values);
        let value = values.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

/// Value with a deadline. Entries are dropped lazily when read after expiry.
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        let left = self.expires_at.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }
}

fn live<'a, T>(map: &'a mut HashMap<String, Expiring<T>>, key: &str) -> Option<&'a mut Expiring<T>> {
    if map.get(key).is_some_and(|entry| entry.remaining().is_none()) {
        map.remove(key);
    }
    map.get_mut(key)
}

#[derive(Default)]
struct SessionTables {
    sessions: HashMap<String, Expiring<CustomerSession>>,
    otps: HashMap<String, Expiring<OtpRecord>>,
    cooldowns: HashMap<String, Expiring<()>>,
    otp_requests: HashMap<String, Expiring<u32>>,
}

/// Customer sessions and OTP bookkeeping with per-entry expiry.
#[derive(Default)]
pub struct MemorySessionStore {
    tables: Mutex<SessionTables>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_session(&self, token: &str) -> Result<Option<CustomerSession>, StoreError> {
        let mut tables = lock(&self.tables);
        Ok(live(&mut tables.sessions, token).map(|entry| entry.value.clone()))
    }

    async fn put_session(
        &self,
        token: &str,
        session: &CustomerSession,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        lock(&self.tables)
            .sessions
            .insert(token.to_string(), Expiring::new(session.clone(), ttl));
        Ok(())
    }

    async fn invalidate_session(&self, token: &str) -> Result<(), StoreError> {
        lock(&self.tables).sessions.remove(token);
        Ok(())
    }
}

#[async_trait]
impl OtpStore for MemorySessionStore {
    async fn get_otp(&self, phone: &str) -> Result<Option<(OtpRecord, Duration)>, StoreError> {
        let mut tables = lock(&self.tables);
        Ok(live(&mut tables.otps, phone)
            .and_then(|entry| entry.remaining().map(|left| (entry.value.clone(), left))))
    }

    async fn put_otp(&self, phone: &str, record: &OtpRecord, ttl: Duration) -> Result<(), StoreError> {
        lock(&self.tables)
            .otps
            .insert(phone.to_string(), Expiring::new(record.clone(), ttl));
        Ok(())
    }

    async fn delete_otp(&self, phone: &str) -> Result<(), StoreError> {
        lock(&self.tables).otps.remove(phone);
        Ok(())
    }

    async fn cooldown_remaining(&self, phone: &str) -> Result<Option<Duration>, StoreError> {
        let mut tables = lock(&self.tables);
        Ok(live(&mut tables.cooldowns, phone).and_then(|entry| entry.remaining()))
    }

    async fn start_cooldown(&self, phone: &str, ttl: Duration) -> Result<(), StoreError> {
        lock(&self.tables)
            .cooldowns
            .insert(phone.to_string(), Expiring::new((), ttl));
        Ok(())
    }

    async fn otp_request_count(&self, phone: &str) -> Result<u32, StoreError> {
        let mut tables = lock(&self.tables);
        Ok(live(&mut tables.otp_requests, phone).map_or(0, |entry| entry.value))
    }

    async fn record_otp_request(&self, phone: &str, window: Duration) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables);
        match live(&mut tables.otp_requests, phone) {
            Some(entry) => entry.value += 1,
            None => {
                tables
                    .otp_requests
                    .insert(phone.to_string(), Expiring::new(1, window));
            }
        }
        Ok(())
    }
}
