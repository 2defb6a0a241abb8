//! [`Store`] backed by `PostgreSQL`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use threadline_core::cart::Cart;
use threadline_core::catalog::Product;
use threadline_core::order::{NewOrder, Order};
use threadline_core::{OrderId, ProductId, UserId};

use super::{CartRepository, OrderRepository, ProductRepository, RepositoryError, Store};

/// `PostgreSQL` store delegating to the table repositories.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get(id).await
    }

    async fn products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get_many(ids).await
    }

    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        CartRepository::new(&self.pool).get(user_id).await
    }

    async fn save_cart(&self, cart: &Cart, now: DateTime<Utc>) -> Result<Cart, RepositoryError> {
        CartRepository::new(&self.pool).save(cart, now).await
    }

    async fn create_order(
        &self,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        OrderRepository::new(&self.pool).create(order, now).await
    }

    async fn create_order_from_cart(
        &self,
        order: NewOrder,
        cart: &Cart,
        now: DateTime<Utc>,
    ) -> Result<(Order, Cart), RepositoryError> {
        OrderRepository::new(&self.pool)
            .create_from_cart(order, cart, now)
            .await
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).get(id).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).list_for_user(user_id).await
    }

    async fn orders_in_transit(&self) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).list_in_transit().await
    }

    async fn save_order(&self, order: &Order) -> Result<Order, RepositoryError> {
        OrderRepository::new(&self.pool).save(order).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
