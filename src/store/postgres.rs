use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;

use super::{ChefDirectory, LoadQuery, OrderRepository, ProductStore, SettingsStore, StoreError};
use crate::domain::order::{Order, OrderChanges, OrderDraft, OrderItem, OrderStatus};
use crate::models::{Chef, ChefId, ChefLoad, OrderId, ProductId, RestaurantId, Setting, CHEF_ROLE};

// ============================================================================
// Postgres Store
// ============================================================================
//
// Tables used: staff, settings, products, orders. Order items are stored as
// a JSONB snapshot; the schema itself is managed outside this crate.
//
// ============================================================================

const ORDER_COLUMNS: &str = "id, restaurant_id, table_number, customer_mobile, customer_name, items, status, \
     special_instructions, total, assigned_chef_id, estimated_ready_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    restaurant_id: i64,
    table_number: Option<String>,
    customer_mobile: String,
    customer_name: String,
    items: Json<Vec<OrderItem>>,
    status: String,
    special_instructions: String,
    total: f64,
    assigned_chef_id: Option<i64>,
    estimated_ready_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::InvalidData(format!("order {}: {}", row.id, e)))?;

        Ok(Order {
            id: row.id,
            restaurant_id: row.restaurant_id,
            table_number: row.table_number,
            customer_phone: row.customer_mobile,
            customer_name: row.customer_name,
            items: row.items.0,
            special_instructions: row.special_instructions,
            total: row.total,
            status,
            assigned_chef_id: row.assigned_chef_id,
            estimated_ready_at: row.estimated_ready_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
    rows.into_iter().map(Order::try_from).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    async fn fetch_orders(
        &self,
        filter: &str,
        restaurant_id: RestaurantId,
        extra: Option<&str>,
    ) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE restaurant_id = $1{} ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS, filter
        );
        let mut query = sqlx::query_as::<_, OrderRow>(&sql).bind(restaurant_id);
        if let Some(extra) = extra {
            query = query.bind(extra);
        }
        into_orders(query.fetch_all(&self.pool).await?)
    }

    /// Explains a guarded update that matched no row: either the order is
    /// gone or its status moved past `expected`.
    async fn missed_update(
        &self,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        expected: OrderStatus,
    ) -> Result<StoreError, StoreError> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 AND restaurant_id = $2")
                .bind(order_id)
                .bind(restaurant_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match current {
            Some(status) => StoreError::Conflict(format!(
                "order {} is {}, expected {}",
                order_id, status, expected
            )),
            None => StoreError::NotFound(format!("order {}", order_id)),
        })
    }
}

#[async_trait]
impl ChefDirectory for PgStore {
    async fn active_chefs(&self, restaurant_id: RestaurantId) -> Result<Vec<Chef>, StoreError> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT id, restaurant_id, username FROM staff \
             WHERE restaurant_id = $1 AND role = $2 AND active = TRUE ORDER BY id ASC",
        )
        .bind(restaurant_id)
        .bind(CHEF_ROLE)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, restaurant_id, username)| Chef {
                id,
                restaurant_id,
                username,
            })
            .collect())
    }
}

#[async_trait]
impl LoadQuery for PgStore {
    async fn chef_loads(&self, restaurant_id: RestaurantId) -> Result<Vec<ChefLoad>, StoreError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT assigned_chef_id, COUNT(*) FROM orders \
             WHERE restaurant_id = $1 AND status IN ('pending', 'preparing') AND assigned_chef_id IS NOT NULL \
             GROUP BY assigned_chef_id ORDER BY assigned_chef_id",
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(chef_id, order_count)| ChefLoad { chef_id, order_count })
            .collect())
    }

    async fn chef_active_order_count(&self, chef_id: ChefId) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE assigned_chef_id = $1 AND status IN ('pending', 'preparing')",
        )
        .bind(chef_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn least_recently_assigned_chef(
        &self,
        restaurant_id: RestaurantId,
        candidates: &[ChefId],
    ) -> Result<Option<ChefId>, StoreError> {
        if candidates.is_empty() {
            return Ok(None);
        }

        // Postgres sorts NULL last by default; never-assigned chefs go first.
        let chef_id: Option<i64> = sqlx::query_scalar(
            "SELECT s.id FROM staff s \
             LEFT JOIN ( \
                 SELECT assigned_chef_id, MAX(created_at) AS last_assigned \
                 FROM orders WHERE restaurant_id = $1 AND assigned_chef_id IS NOT NULL \
                 GROUP BY assigned_chef_id \
             ) o ON o.assigned_chef_id = s.id \
             WHERE s.id = ANY($2) \
             ORDER BY o.last_assigned ASC NULLS FIRST, s.id ASC LIMIT 1",
        )
        .bind(restaurant_id)
        .bind(candidates)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chef_id)
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn get_by_key(&self, restaurant_id: RestaurantId, key: &str) -> Result<Setting, StoreError> {
        let value: Option<String> = sqlx::query_scalar(
            r#"SELECT value FROM settings WHERE restaurant_id = $1 AND "key" = $2"#,
        )
        .bind(restaurant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        value
            .map(|value| Setting {
                restaurant_id,
                key: key.to_string(),
                value,
            })
            .ok_or_else(|| StoreError::NotFound(format!("setting {} for restaurant {}", key, restaurant_id)))
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn prep_times(
        &self,
        restaurant_id: RestaurantId,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, i32>, StoreError> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, Option<i32>)> =
            sqlx::query_as("SELECT id, prep_time FROM products WHERE restaurant_id = $1 AND id = ANY($2)")
                .bind(restaurant_id)
                .bind(product_ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, prep)| prep.map(|minutes| (id, minutes)))
            .collect())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, draft: &OrderDraft, now: DateTime<Utc>) -> Result<Order, StoreError> {
        let sql = format!(
            "INSERT INTO orders (restaurant_id, table_number, customer_mobile, customer_name, items, status, \
             special_instructions, total, assigned_chef_id, estimated_ready_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) RETURNING {}",
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(draft.restaurant_id)
            .bind(&draft.table_number)
            .bind(&draft.customer_phone)
            .bind(&draft.customer_name)
            .bind(Json(&draft.items))
            .bind(draft.status.as_str())
            .bind(&draft.special_instructions)
            .bind(draft.total)
            .bind(draft.assigned_chef_id)
            .bind(draft.estimated_ready_at)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Order::try_from(row)
    }

    async fn get(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<Order, StoreError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1 AND restaurant_id = $2", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .bind(restaurant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;

        Order::try_from(row)
    }

    async fn update_fields(
        &self,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        expected: OrderStatus,
        changes: &OrderChanges,
        now: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE orders SET updated_at = ");
        query.push_bind(now);

        if let Some(status) = changes.status {
            query.push(", status = ").push_bind(status.as_str());
        }
        if let Some(chef_id) = changes.assigned_chef_id {
            query.push(", assigned_chef_id = ").push_bind(chef_id);
        }
        if let Some(table) = &changes.table_number {
            query.push(", table_number = ").push_bind(table.clone());
        }
        if let Some(phone) = &changes.customer_phone {
            query.push(", customer_mobile = ").push_bind(phone.clone());
        }
        if let Some(name) = &changes.customer_name {
            query.push(", customer_name = ").push_bind(name.clone());
        }
        if let Some((items, total)) = &changes.items {
            query.push(", items = ").push_bind(Json(items.clone()));
            query.push(", total = ").push_bind(*total);
        }
        if let Some(instructions) = &changes.special_instructions {
            query.push(", special_instructions = ").push_bind(instructions.clone());
        }

        query.push(" WHERE id = ").push_bind(order_id);
        query.push(" AND restaurant_id = ").push_bind(restaurant_id);
        query.push(" AND status = ").push_bind(expected.as_str());
        query.push(" RETURNING ").push(ORDER_COLUMNS);

        let row = query
            .build_query_as::<OrderRow>()
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Order::try_from(row),
            None => Err(self.missed_update(restaurant_id, order_id, expected).await?),
        }
    }

    async fn delete(&self, restaurant_id: RestaurantId, order_id: OrderId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND restaurant_id = $2")
            .bind(order_id)
            .bind(restaurant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {}", order_id)));
        }
        Ok(())
    }

    async fn list(&self, restaurant_id: RestaurantId) -> Result<Vec<Order>, StoreError> {
        self.fetch_orders("", restaurant_id, None).await
    }

    async fn list_by_status(
        &self,
        restaurant_id: RestaurantId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError> {
        self.fetch_orders(" AND status = $2", restaurant_id, Some(status.as_str()))
            .await
    }

    async fn list_by_phone(&self, restaurant_id: RestaurantId, phone: &str) -> Result<Vec<Order>, StoreError> {
        self.fetch_orders(" AND customer_mobile = $2", restaurant_id, Some(phone))
            .await
    }
}
