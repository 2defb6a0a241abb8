//! Database operations for orders.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use threadline_core::cart::Cart;
use threadline_core::order::{NewOrder, Order, OrderItem, Payment, Shipment};
use threadline_core::{OrderId, Price, UserId};

use super::RepositoryError;
use super::carts::save_cart;

const ORDER_COLUMNS: &str = "id, user_id, items, total_price, payment, shipping, \
                             cancelled_at, created_at, updated_at, version";

/// Internal row type for `PostgreSQL` order queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    items: Json<Vec<OrderItem>>,
    total_price: i64,
    payment: Json<Payment>,
    shipping: Option<Json<Shipment>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            items: row.items.0,
            total_price: Price::new(row.total_price),
            payment: row.payment.0,
            shipping: row.shipping.map(|s| s.0),
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_order(&mut conn, &order, now).await
    }

    /// Insert a new order and save the cart its items came from.
    ///
    /// Both writes commit together; if the cart changed since it was read,
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart version is stale, or
    /// `RepositoryError::Database` if a query fails.
    pub async fn create_from_cart(
        &self,
        order: NewOrder,
        cart: &Cart,
        now: DateTime<Utc>,
    ) -> Result<(Order, Cart), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let saved_cart = save_cart(&mut tx, cart, now).await?;
        let created = insert_order(&mut tx, &order, now).await?;
        tx.commit().await?;

        Ok((created, saved_cart))
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Order::from))
    }

    /// List a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    /// List orders whose shipment is in transit.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_in_transit(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order \
             WHERE cancelled_at IS NULL AND shipping->>'status' = 'SHIPPING' \
             ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    /// Save an order's mutable records if its version still matches.
    ///
    /// Items and total price are never rewritten.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order changed since it was
    /// read, or `RepositoryError::Database` if the query fails.
    pub async fn save(&self, order: &Order) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE storefront.customer_order \
             SET payment = $2, shipping = $3, cancelled_at = $4, updated_at = $5, \
                 version = version + 1 \
             WHERE id = $1 AND version = $6 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.id.as_i32())
        .bind(Json(&order.payment))
        .bind(order.shipping.as_ref().map(Json))
        .bind(order.cancelled_at)
        .bind(order.updated_at)
        .bind(order.version)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::from).ok_or_else(|| {
            RepositoryError::Conflict(format!(
                "order {} is no longer at version {}",
                order.id, order.version
            ))
        })
    }
}

async fn insert_order(
    conn: &mut PgConnection,
    order: &NewOrder,
    now: DateTime<Utc>,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "INSERT INTO storefront.customer_order \
             (user_id, items, total_price, payment, shipping, created_at, updated_at, version) \
         VALUES ($1, $2, $3, $4, $5, $6, $6, 1) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order.user_id.as_i32())
    .bind(Json(&order.items))
    .bind(order.total_price.amount())
    .bind(Json(order.initial_payment()))
    .bind(Json(Shipment::unassigned()))
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}
