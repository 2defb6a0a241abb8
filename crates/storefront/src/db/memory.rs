//! In-process [`Store`] for demos and tests.
//!
//! Same versioning contract as the `PostgreSQL` store: a save with a stale
//! version fails with [`RepositoryError::Conflict`] and changes nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use threadline_core::cart::Cart;
use threadline_core::catalog::Product;
use threadline_core::order::{NewOrder, Order, Shipment};
use threadline_core::{OrderId, OrderStatus, ProductId, UserId};

use super::{RepositoryError, Store};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: Vec<Order>,
}

impl Tables {
    fn put_cart(&mut self, cart: &Cart, now: DateTime<Utc>) -> Result<Cart, RepositoryError> {
        let stored_version = self.carts.get(&cart.user_id).map_or(0, |c| c.version);
        if stored_version != cart.version {
            return Err(RepositoryError::Conflict(format!(
                "cart of user {} is no longer at version {}",
                cart.user_id, cart.version
            )));
        }

        let saved = Cart {
            version: cart.version + 1,
            updated_at: now,
            ..cart.clone()
        };
        self.carts.insert(cart.user_id, saved.clone());
        Ok(saved)
    }

    fn insert_order(&mut self, order: NewOrder, now: DateTime<Utc>) -> Order {
        let next_id = i32::try_from(self.orders.len() + 1).unwrap_or(i32::MAX);
        let created = Order {
            id: OrderId::new(next_id),
            user_id: order.user_id,
            payment: order.initial_payment(),
            shipping: Some(Shipment::unassigned()),
            items: order.items,
            total_price: order.total_price,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.orders.push(created.clone());
        created
    }
}

/// Store keeping everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a catalog.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let tables = Tables {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            ..Tables::default()
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Insert or replace a catalog product.
    pub async fn put_product(&self, product: Product) {
        self.tables.write().await.products.insert(product.id, product);
    }

    /// Remove a catalog product.
    pub async fn remove_product(&self, id: ProductId) {
        self.tables.write().await.products.remove(&id);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.tables.read().await.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart, now: DateTime<Utc>) -> Result<Cart, RepositoryError> {
        self.tables.write().await.put_cart(cart, now)
    }

    async fn create_order(
        &self,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        Ok(self.tables.write().await.insert_order(order, now))
    }

    async fn create_order_from_cart(
        &self,
        order: NewOrder,
        cart: &Cart,
        now: DateTime<Utc>,
    ) -> Result<(Order, Cart), RepositoryError> {
        let mut tables = self.tables.write().await;
        let saved_cart = tables.put_cart(cart, now)?;
        let created = tables.insert_order(order, now);
        Ok((created, saved_cart))
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn orders_in_transit(&self) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .iter()
            .filter(|o| o.status() == OrderStatus::Shipping)
            .cloned()
            .collect())
    }

    async fn save_order(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != order.version {
            return Err(RepositoryError::Conflict(format!(
                "order {} is no longer at version {}",
                order.id, order.version
            )));
        }

        stored.payment = order.payment.clone();
        stored.shipping = order.shipping.clone();
        stored.cancelled_at = order.cancelled_at;
        stored.updated_at = order.updated_at;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
