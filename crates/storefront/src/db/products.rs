//! Catalog reads (and seeding for local development).

use std::collections::HashMap;

use sqlx::PgPool;
use sqlx::types::Json;

use threadline_core::catalog::{Product, Variant};
use threadline_core::{Price, ProductId};

use super::RepositoryError;

/// Internal row type for `PostgreSQL` product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    price: i64,
    images: Json<Vec<String>>,
    variants: Json<Vec<Variant>>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        if row.price < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "product {} has negative price {}",
                row.id, row.price
            )));
        }
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            price: Price::new(row.price),
            images: row.images.0,
            variants: row.variants.0,
        })
    }
}

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, price, images, variants
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Get several products by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();

        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, price, images, variants
            FROM storefront.product
            WHERE id = ANY($1)
            ",
        )
        .bind(raw)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Product::try_from(row).map(|p| (p.id, p)))
            .collect()
    }

    /// Insert or replace a product, keeping its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.product (id, name, price, images, variants)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                price = EXCLUDED.price,
                images = EXCLUDED.images,
                variants = EXCLUDED.variants,
                updated_at = NOW()
            ",
        )
        .bind(product.id.as_i32())
        .bind(&product.name)
        .bind(product.price.amount())
        .bind(Json(&product.images))
        .bind(Json(&product.variants))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Move the ID sequence past explicitly inserted IDs.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sync_id_sequence(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            SELECT setval(
                pg_get_serial_sequence('storefront.product', 'id'),
                GREATEST((SELECT MAX(id) FROM storefront.product), 1)
            )
            ",
        )
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
