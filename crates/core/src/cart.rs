//! Cart lines and line-merging operations.
//!
//! A cart is an ordered sequence of lines. Lines are addressed either by their
//! position (the public contract) or by a stable [`LineId`]. No two lines may
//! share a match key (see [`crate::catalog::match_key`]); every operation that
//! could create a duplicate merges instead.
//!
//! All operations here are pure in-memory transforms. Persisting the result is
//! the caller's job, guarded by [`Cart::version`].

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{LineOption, Product, match_key};
use crate::error::CommerceError;
use crate::types::{LineId, Price, ProductId, UserId};

/// One cart entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: LineId,
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<LineOption>,
}

impl CartLine {
    /// Create a new line with a fresh id.
    #[must_use]
    pub fn new(product_id: ProductId, quantity: u32, option: Option<LineOption>) -> Self {
        Self {
            id: LineId::generate(),
            product_id,
            quantity,
            option,
        }
    }

    /// Match key of this line.
    #[must_use]
    pub fn match_key(&self) -> String {
        match_key(self.product_id, self.option.as_ref())
    }
}

/// Reference to a cart line: positional index or stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineRef {
    Index(usize),
    Id(LineId),
}

impl FromStr for LineRef {
    type Err = CommerceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.trim().parse::<usize>() {
            return Ok(Self::Index(index));
        }
        s.parse::<LineId>()
            .map(Self::Id)
            .map_err(|_| CommerceError::BadLine)
    }
}

/// A user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    /// Revision counter; bumped by every successful save.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Create an empty, never-saved cart.
    #[must_use]
    pub const fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            lines: Vec::new(),
            version: 0,
            updated_at: now,
        }
    }

    /// Check if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Resolve a line reference to its current position.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotInCart` if the index is out of bounds or no
    /// line has the given id.
    pub fn position(&self, line: LineRef) -> Result<usize, CommerceError> {
        match line {
            LineRef::Index(index) if index < self.lines.len() => Ok(index),
            LineRef::Index(_) => Err(CommerceError::NotInCart),
            LineRef::Id(id) => self
                .lines
                .iter()
                .position(|l| l.id == id)
                .ok_or(CommerceError::NotInCart),
        }
    }

    fn position_of_key(&self, key: &str, except: Option<usize>) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .find(|(i, l)| Some(*i) != except && l.match_key() == key)
            .map(|(i, _)| i)
    }

    /// Add a line, merging into an existing line with the same match key.
    ///
    /// Returns the position of the line that now holds the quantity.
    pub fn add_line(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        option: Option<LineOption>,
    ) -> usize {
        let key = match_key(product_id, option.as_ref());
        if let Some(index) = self.position_of_key(&key, None)
            && let Some(existing) = self.lines.get_mut(index)
        {
            existing.quantity = existing.quantity.saturating_add(quantity);
            return index;
        }

        self.lines
            .push(CartLine::new(product_id, quantity, option));
        self.lines.len() - 1
    }

    /// Replace the option of a line.
    ///
    /// If another line already holds the new (product, option) pair, the edited
    /// line's quantity is folded into it and the edited line is removed.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotInCart` if the line does not exist.
    pub fn replace_option(
        &mut self,
        line: LineRef,
        option: Option<LineOption>,
    ) -> Result<(), CommerceError> {
        let index = self.position(line)?;
        let product_id = self
            .lines
            .get(index)
            .map(|l| l.product_id)
            .ok_or(CommerceError::NotInCart)?;
        let key = match_key(product_id, option.as_ref());

        if let Some(other) = self.position_of_key(&key, Some(index)) {
            let edited = self.lines.remove(index);
            let target = if other > index { other - 1 } else { other };
            if let Some(survivor) = self.lines.get_mut(target) {
                survivor.quantity = survivor.quantity.saturating_add(edited.quantity);
            }
            return Ok(());
        }

        if let Some(edited) = self.lines.get_mut(index) {
            edited.option = option;
        }
        Ok(())
    }

    /// Overwrite a line's quantity; a quantity of zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotInCart` if the line does not exist.
    pub fn set_quantity(&mut self, line: LineRef, quantity: i64) -> Result<(), CommerceError> {
        let index = self.position(line)?;
        self.set_quantity_at(index, quantity);
        Ok(())
    }

    fn set_quantity_at(&mut self, index: usize, quantity: i64) {
        if quantity <= 0 {
            self.lines.remove(index);
            return;
        }
        if let Some(l) = self.lines.get_mut(index) {
            l.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotInCart` if the line does not exist.
    pub fn remove_line(&mut self, line: LineRef) -> Result<CartLine, CommerceError> {
        let index = self.position(line)?;
        Ok(self.lines.remove(index))
    }

    /// Set the quantity of the first line referencing a product.
    ///
    /// Carts created before options existed hold one line per product; this
    /// keeps their clients working.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotInCart` if no line references the product.
    pub fn set_quantity_by_product(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), CommerceError> {
        let index = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or(CommerceError::NotInCart)?;
        self.set_quantity_at(index, quantity);
        Ok(())
    }

    /// Remove every line referencing a product, whatever its option.
    ///
    /// Returns the number of removed lines.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotInCart` if no line references the product.
    pub fn remove_product(&mut self, product_id: ProductId) -> Result<usize, CommerceError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        match before - self.lines.len() {
            0 => Err(CommerceError::NotInCart),
            removed => Ok(removed),
        }
    }

    /// Remove all lines.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Split off the selected lines, keeping the rest in order.
    ///
    /// References that match nothing are ignored; duplicates count once. The
    /// returned lines keep their original relative order.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::CartEmpty` if the cart has no lines and
    /// `CommerceError::NoItems` if the selection matched none of them. The
    /// cart is untouched on error.
    pub fn take_selected(&mut self, selection: &[LineRef]) -> Result<Vec<CartLine>, CommerceError> {
        if self.lines.is_empty() {
            return Err(CommerceError::CartEmpty);
        }

        let chosen: BTreeSet<usize> = selection
            .iter()
            .filter_map(|line| self.position(*line).ok())
            .collect();
        if chosen.is_empty() {
            return Err(CommerceError::NoItems);
        }

        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.lines)
            .into_iter()
            .enumerate()
            .partition(|(i, _)| chosen.contains(i));
        self.lines = kept.into_iter().map(|(_, l)| l).collect();
        Ok(taken.into_iter().map(|(_, l)| l).collect())
    }

    /// Join lines with current catalog data for display.
    ///
    /// Prices are read from `catalog` as it is now; they are not frozen.
    #[must_use]
    pub fn hydrate(&self, catalog: &HashMap<ProductId, Product>) -> CartView {
        let lines: Vec<CartLineView> = self
            .lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let product = catalog.get(&line.product_id).map(|p| ProductSummary {
                    name: p.name.clone(),
                    price: p.price,
                    images: p.images.clone(),
                });
                let line_total = product
                    .as_ref()
                    .map_or(Price::ZERO, |p| p.price.times(line.quantity));
                CartLineView {
                    index,
                    id: line.id,
                    product_id: line.product_id,
                    qty: line.quantity,
                    option: line.option.clone(),
                    product,
                    line: line_total,
                }
            })
            .collect();

        CartView {
            total_qty: self.total_quantity(),
            total_price: lines.iter().map(|l| l.line).sum(),
            lines,
            version: self.version,
        }
    }
}

/// Product fields shown next to a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub name: String,
    pub price: Price,
    pub images: Vec<String>,
}

/// A hydrated cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub index: usize,
    pub id: LineId,
    pub product_id: ProductId,
    pub qty: u32,
    pub option: Option<LineOption>,
    /// `None` when the product has been removed from the catalog.
    pub product: Option<ProductSummary>,
    /// `price × qty` at the current catalog price.
    pub line: Price,
}

/// A hydrated cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub total_qty: u64,
    pub total_price: Price,
    pub version: i64,
}
