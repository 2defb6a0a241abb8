//! Cart service.
//!
//! Validates requests against the catalog, applies the pure cart operations
//! from `threadline_core::cart` and saves the result with a version check.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use threadline_core::cart::{Cart, CartView, LineRef};
use threadline_core::catalog::{LineOption, OptionInput, Product};
use threadline_core::{CommerceError, ProductId, UserId};

use super::conflict_exhausted;
use crate::config::MergePolicy;
use crate::db::{RepositoryError, Store};
use crate::error::{AppError, Result};

/// One entry of a bulk merge, already parsed at the HTTP boundary.
///
/// Parse failures are carried through so they can be reported per entry.
#[derive(Debug, Clone)]
pub struct MergeEntry {
    pub product_id: std::result::Result<ProductId, CommerceError>,
    pub quantity: std::result::Result<i64, CommerceError>,
    pub option: Option<OptionInput>,
}

/// An entry dropped from a bulk merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub index: usize,
    pub error: &'static str,
}

/// Result of a bulk merge.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MergeOutcome {
    /// `skip` policy: the cart only.
    Cart(CartView),
    /// `report` policy: the cart and the dropped entries.
    Report {
        cart: CartView,
        skipped: Vec<SkippedEntry>,
    },
}

/// Cart service.
pub struct CartService<'a> {
    store: &'a dyn Store,
    attempts: u32,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, attempts: u32) -> Self {
        Self { store, attempts }
    }

    /// Get the user's cart, creating an empty one on first access.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if storage fails.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<CartView> {
        let cart = self.get_or_create(user_id).await?;
        self.hydrate(&cart).await
    }

    /// Add a product to the cart, merging with an identical line.
    ///
    /// # Errors
    ///
    /// - `BAD_QTY` if `quantity` is below 1
    /// - `NOT_FOUND` if the product does not exist
    /// - `OPTION_REQUIRED` if the product has variants and the option is
    ///   incomplete or unknown
    #[instrument(skip(self, option))]
    pub async fn add_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
        option: Option<&OptionInput>,
    ) -> Result<CartView> {
        let quantity = positive_quantity(quantity)?;
        let product = self.product(product_id).await?;
        let option = product.resolve_option(option)?;

        let cart = self
            .update(user_id, |cart| {
                cart.add_line(product_id, quantity, option.clone());
                Ok(())
            })
            .await?;
        self.hydrate(&cart).await
    }

    /// Replace the option of a line, merging into an identical line if one
    /// exists.
    ///
    /// # Errors
    ///
    /// - `NOT_IN_CART` if the line does not exist
    /// - `NOT_FOUND` if the line's product no longer exists
    /// - `OPTION_REQUIRED` if the option is incomplete or unknown
    #[instrument(skip(self, option))]
    pub async fn replace_option(
        &self,
        user_id: UserId,
        line: LineRef,
        option: Option<&OptionInput>,
    ) -> Result<CartView> {
        // Pin the line by id so a retry edits the same line.
        let current = self.get_or_create(user_id).await?;
        let position = current.position(line)?;
        let target = current
            .lines
            .get(position)
            .ok_or(CommerceError::NotInCart)?;
        let (line_id, product_id) = (target.id, target.product_id);

        let product = self.product(product_id).await?;
        let option: Option<LineOption> = product.resolve_option(option)?;

        let cart = self
            .update(user_id, |cart| {
                cart.replace_option(LineRef::Id(line_id), option.clone())?;
                Ok(())
            })
            .await?;
        self.hydrate(&cart).await
    }

    /// Overwrite a line's quantity; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `NOT_IN_CART` if the line does not exist.
    #[instrument(skip(self))]
    pub async fn set_quantity(&self, user_id: UserId, line: LineRef, quantity: i64) -> Result<CartView> {
        let cart = self
            .update(user_id, |cart| Ok(cart.set_quantity(line, quantity)?))
            .await?;
        self.hydrate(&cart).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `NOT_IN_CART` if the line does not exist.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, user_id: UserId, line: LineRef) -> Result<CartView> {
        let cart = self
            .update(user_id, |cart| {
                cart.remove_line(line)?;
                Ok(())
            })
            .await?;
        self.hydrate(&cart).await
    }

    /// Set the quantity of the first line holding a product.
    ///
    /// # Errors
    ///
    /// Returns `NOT_IN_CART` if no line holds the product.
    #[instrument(skip(self))]
    pub async fn set_quantity_by_product(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView> {
        let cart = self
            .update(user_id, |cart| {
                Ok(cart.set_quantity_by_product(product_id, quantity)?)
            })
            .await?;
        self.hydrate(&cart).await
    }

    /// Remove every line holding a product.
    ///
    /// # Errors
    ///
    /// Returns `NOT_IN_CART` if no line holds the product.
    #[instrument(skip(self))]
    pub async fn remove_product(&self, user_id: UserId, product_id: ProductId) -> Result<CartView> {
        let cart = self
            .update(user_id, |cart| {
                cart.remove_product(product_id)?;
                Ok(())
            })
            .await?;
        self.hydrate(&cart).await
    }

    /// Remove all lines. The cart itself is kept.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if storage fails.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<CartView> {
        let cart = self
            .update(user_id, |cart| {
                cart.clear();
                Ok(())
            })
            .await?;
        self.hydrate(&cart).await
    }

    /// Add several entries at once (typically a guest cart after login).
    ///
    /// Each entry follows add-line rules. Invalid entries are dropped; all
    /// valid entries are saved together.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if storage fails.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn merge(
        &self,
        user_id: UserId,
        entries: &[MergeEntry],
        policy: MergePolicy,
    ) -> Result<MergeOutcome> {
        let ids: Vec<ProductId> = entries
            .iter()
            .filter_map(|e| e.product_id.as_ref().ok().copied())
            .collect();
        let catalog = self.store.products(&ids).await?;

        let mut accepted = Vec::new();
        let mut skipped = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match validate_entry(entry, &catalog) {
                Ok(line) => accepted.push(line),
                Err(err) => {
                    tracing::debug!(index, code = err.code(), "Skipping merge entry");
                    skipped.push(SkippedEntry {
                        index,
                        error: err.code(),
                    });
                }
            }
        }

        let cart = self
            .update(user_id, |cart| {
                for (product_id, quantity, option) in &accepted {
                    cart.add_line(*product_id, *quantity, option.clone());
                }
                Ok(())
            })
            .await?;
        let view = self.hydrate(&cart).await?;

        Ok(match policy {
            MergePolicy::Skip => MergeOutcome::Cart(view),
            MergePolicy::Report => MergeOutcome::Report {
                cart: view,
                skipped,
            },
        })
    }

    /// Join a cart with current catalog data.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the catalog cannot be read.
    pub async fn hydrate(&self, cart: &Cart) -> Result<CartView> {
        let mut ids: Vec<ProductId> = cart.lines.iter().map(|l| l.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let catalog = self.store.products(&ids).await?;
        Ok(cart.hydrate(&catalog))
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        self.store
            .product(id)
            .await?
            .ok_or_else(|| CommerceError::NotFound.into())
    }

    async fn get_or_create(&self, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = self.store.cart(user_id).await? {
            return Ok(cart);
        }
        match self.store.save_cart(&Cart::new(user_id, Utc::now()), Utc::now()).await {
            Ok(cart) => Ok(cart),
            // Created concurrently by another request.
            Err(RepositoryError::Conflict(_)) => self
                .store
                .cart(user_id)
                .await?
                .ok_or(AppError::Database(RepositoryError::NotFound)),
            Err(e) => Err(e.into()),
        }
    }

    /// Load, transform and save the cart, retrying on version conflicts.
    ///
    /// `apply` runs on a fresh copy each attempt; on error nothing is saved.
    async fn update<F>(&self, user_id: UserId, mut apply: F) -> Result<Cart>
    where
        F: FnMut(&mut Cart) -> Result<()> + Send,
    {
        let mut last_conflict = String::new();
        for attempt in 1..=self.attempts {
            let mut cart = self
                .store
                .cart(user_id)
                .await?
                .unwrap_or_else(|| Cart::new(user_id, Utc::now()));
            apply(&mut cart)?;

            match self.store.save_cart(&cart, Utc::now()).await {
                Ok(saved) => return Ok(saved),
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "Cart save lost a race, retrying");
                    last_conflict = reason;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(conflict_exhausted("cart update", self.attempts, &last_conflict))
    }
}

fn positive_quantity(quantity: i64) -> std::result::Result<u32, CommerceError> {
    if quantity < 1 {
        return Err(CommerceError::BadQty);
    }
    u32::try_from(quantity).map_err(|_| CommerceError::BadQty)
}

fn validate_entry(
    entry: &MergeEntry,
    catalog: &HashMap<ProductId, Product>,
) -> std::result::Result<(ProductId, u32, Option<LineOption>), CommerceError> {
    let product_id = entry.product_id.clone()?;
    let quantity = positive_quantity(entry.quantity.clone()?)?;
    let product = catalog.get(&product_id).ok_or(CommerceError::NotFound)?;
    let option = product.resolve_option(entry.option.as_ref())?;
    Ok((product_id, quantity, option))
}
