//! Storage for carts, orders, the catalog and sessions.
//!
//! # Schema: `storefront`
//!
//! ## Tables
//!
//! - `product` - Catalog, owned by the product service (read-only here)
//! - `cart` - One row per user, lines as JSONB
//! - `customer_order` - Orders with payment/shipping records as JSONB
//! - `session` - Tower-sessions storage (written by the auth service)
//!
//! Carts and orders carry a `version` column. Every save is a compare-and-swap
//! on that column; a stale save fails with [`RepositoryError::Conflict`] and
//! writes nothing.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p threadline-cli -- migrate
//! ```

pub mod carts;
pub mod memory;
pub mod orders;
pub mod postgres;
pub mod products;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use threadline_core::cart::Cart;
use threadline_core::catalog::Product;
use threadline_core::order::{NewOrder, Order};
use threadline_core::{OrderId, ProductId, UserId};

pub use carts::CartRepository;
pub use memory::MemoryStore;
pub use orders::OrderRepository;
pub use postgres::PgStore;
pub use products::ProductRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// The row changed since it was read (stale version).
    #[error("version conflict: {0}")]
    Conflict(String),
}

/// Persistent store used by the services.
///
/// Implemented by [`PgStore`] for production and [`MemoryStore`] for demos
/// and tests. Saves return the stored value with its new version.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Fetch one product.
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Fetch several products; missing ids are absent from the map.
    async fn products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError>;

    /// Fetch a user's cart.
    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Save a cart. Version 0 inserts; any other version must match the row.
    async fn save_cart(&self, cart: &Cart, now: DateTime<Utc>) -> Result<Cart, RepositoryError>;

    /// Insert an order.
    async fn create_order(
        &self,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError>;

    /// Insert an order and save the cart it was taken from, atomically.
    async fn create_order_from_cart(
        &self,
        order: NewOrder,
        cart: &Cart,
        now: DateTime<Utc>,
    ) -> Result<(Order, Cart), RepositoryError>;

    /// Fetch one order.
    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Orders whose shipment is in transit and that are not cancelled.
    async fn orders_in_transit(&self) -> Result<Vec<Order>, RepositoryError>;

    /// Save an order; its version must match the row.
    async fn save_order(&self, order: &Order) -> Result<Order, RepositoryError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Run the storefront migrations.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
