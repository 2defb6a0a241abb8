//! Catalog fixtures and store doubles shared by the service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use threadline_core::cart::Cart;
use threadline_core::catalog::{OptionInput, Product, SizeStock, Variant};
use threadline_core::order::{NewOrder, Order, OrderEvent};
use threadline_core::{OrderId, Price, ProductId, UserId};

use crate::db::{MemoryStore, RepositoryError, Store};

pub fn jacket() -> Product {
    Product {
        id: ProductId::new(1),
        name: "Cropped Jacket".to_string(),
        price: Price::new(39000),
        images: vec!["/img/jacket.jpg".to_string()],
        variants: vec![
            Variant {
                color: "Black".to_string(),
                color_hex: Some("#000000".to_string()),
                sizes: vec![
                    SizeStock {
                        size: "S".to_string(),
                        stock: 3,
                        sku: Some("JK-BLK-S".to_string()),
                    },
                    SizeStock {
                        size: "M".to_string(),
                        stock: 5,
                        sku: Some("JK-BLK-M".to_string()),
                    },
                ],
            },
            Variant {
                color: "Ivory".to_string(),
                color_hex: None,
                sizes: vec![SizeStock {
                    size: "M".to_string(),
                    stock: 1,
                    sku: None,
                }],
            },
        ],
    }
}

pub fn tote() -> Product {
    Product {
        id: ProductId::new(2),
        name: "Canvas Tote".to_string(),
        price: Price::new(12000),
        images: Vec::new(),
        variants: Vec::new(),
    }
}

pub fn pick(variant_index: usize, size: &str) -> OptionInput {
    OptionInput {
        variant_index: Some(variant_index),
        size: Some(size.to_string()),
        ..OptionInput::default()
    }
}

/// A [`MemoryStore`] where another writer gets in first.
///
/// While races remain, every cart or order save is preceded by a competing
/// save of the same row, so the caller's copy is stale. The competitor adds
/// one tote to a cart, or approves an order's payment.
pub struct RacingStore {
    pub inner: MemoryStore,
    races: AtomicU32,
}

impl RacingStore {
    pub fn new(inner: MemoryStore, races: u32) -> Self {
        Self {
            inner,
            races: AtomicU32::new(races),
        }
    }

    fn take_race(&self) -> bool {
        self.races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Store for RacingStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.inner.product(id).await
    }

    async fn products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        self.inner.products(ids).await
    }

    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        self.inner.cart(user_id).await
    }

    async fn save_cart(&self, cart: &Cart, now: DateTime<Utc>) -> Result<Cart, RepositoryError> {
        if self.take_race() {
            let mut theirs = self
                .inner
                .cart(cart.user_id)
                .await?
                .unwrap_or_else(|| Cart::new(cart.user_id, now));
            theirs.add_line(ProductId::new(2), 1, None);
            self.inner.save_cart(&theirs, now).await?;
        }
        self.inner.save_cart(cart, now).await
    }

    async fn create_order(
        &self,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        self.inner.create_order(order, now).await
    }

    async fn create_order_from_cart(
        &self,
        order: NewOrder,
        cart: &Cart,
        now: DateTime<Utc>,
    ) -> Result<(Order, Cart), RepositoryError> {
        self.inner.create_order_from_cart(order, cart, now).await
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.order(id).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.inner.orders_for_user(user_id).await
    }

    async fn orders_in_transit(&self) -> Result<Vec<Order>, RepositoryError> {
        self.inner.orders_in_transit().await
    }

    async fn save_order(&self, order: &Order) -> Result<Order, RepositoryError> {
        if self.take_race() {
            let mut theirs = self
                .inner
                .order(order.id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            let approval = OrderEvent::PaymentApproved {
                provider: "demo".to_string(),
                transaction_id: format!("race-{}", theirs.version),
                receipt_url: None,
            };
            theirs
                .apply(approval, Utc::now())
                .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
            self.inner.save_order(&theirs).await?;
        }
        self.inner.save_order(order).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.ping().await
    }
}
