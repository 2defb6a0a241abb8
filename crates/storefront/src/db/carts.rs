//! Database operations for carts.
//!
//! A cart row holds the whole line sequence as JSONB, so every save replaces
//! all lines at once. The `version` column guards against lost updates.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use threadline_core::UserId;
use threadline_core::cart::{Cart, CartLine};

use super::RepositoryError;

/// Internal row type for `PostgreSQL` cart queries.
#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    user_id: i32,
    lines: Json<Vec<CartLine>>,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            user_id: UserId::new(row.user_id),
            lines: row.lines.0,
            version: row.version,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT user_id, lines, version, updated_at
            FROM storefront.cart
            WHERE user_id = $1
            ",
        )
        .bind(user_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Cart::from))
    }

    /// Save a cart (see [`save_cart`]).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart changed since it was read.
    pub async fn save(&self, cart: &Cart, now: DateTime<Utc>) -> Result<Cart, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        save_cart(&mut conn, cart, now).await
    }
}

/// Save a cart on an existing connection or transaction.
///
/// A cart with version 0 has never been stored and is inserted; otherwise the
/// row is updated only if its version still equals `cart.version`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if another writer got there first, or
/// `RepositoryError::Database` if the query fails.
pub async fn save_cart(
    conn: &mut PgConnection,
    cart: &Cart,
    now: DateTime<Utc>,
) -> Result<Cart, RepositoryError> {
    let row = if cart.version == 0 {
        sqlx::query_as::<_, CartRow>(
            r"
            INSERT INTO storefront.cart (user_id, lines, version, updated_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id, lines, version, updated_at
            ",
        )
        .bind(cart.user_id.as_i32())
        .bind(Json(&cart.lines))
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
    } else {
        sqlx::query_as::<_, CartRow>(
            r"
            UPDATE storefront.cart
            SET lines = $2, version = version + 1, updated_at = $3
            WHERE user_id = $1 AND version = $4
            RETURNING user_id, lines, version, updated_at
            ",
        )
        .bind(cart.user_id.as_i32())
        .bind(Json(&cart.lines))
        .bind(now)
        .bind(cart.version)
        .fetch_optional(&mut *conn)
        .await?
    };

    row.map(Cart::from).ok_or_else(|| {
        RepositoryError::Conflict(format!(
            "cart of user {} is no longer at version {}",
            cart.user_id, cart.version
        ))
    })
}
