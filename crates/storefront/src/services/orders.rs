//! Order service.
//!
//! Orders are created from a single product or from a selection of cart
//! lines. Item prices are snapshotted at creation and never re-read.

use chrono::Utc;
use tracing::instrument;

use threadline_core::cart::LineRef;
use threadline_core::catalog::OptionInput;
use threadline_core::order::{NewOrder, Order, OrderEvent, OrderItem};
use threadline_core::{CommerceError, OrderId, ProductId, UserId};

use super::conflict_exhausted;
use crate::db::{RepositoryError, Store};
use crate::error::{AppError, Result};
use crate::models::CurrentUser;

/// Carrier details submitted by an admin.
#[derive(Debug, Clone)]
pub struct ShippingInput {
    pub courier_code: String,
    pub courier_name: Option<String>,
    pub tracking_number: String,
}

/// Order service.
pub struct OrderService<'a> {
    store: &'a dyn Store,
    attempts: u32,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, attempts: u32) -> Self {
        Self { store, attempts }
    }

    /// Buy one product directly. Quantities below 1 are raised to 1.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` if the product does not exist
    /// - `OPTION_REQUIRED` if the option is incomplete or unknown
    #[instrument(skip(self, option))]
    pub async fn create_single(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
        option: Option<&OptionInput>,
        payment_method: Option<String>,
    ) -> Result<Order> {
        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or(CommerceError::NotFound)?;
        let option = product.resolve_option(option)?;
        let quantity = u32::try_from(quantity.max(1)).unwrap_or(u32::MAX);

        let draft = NewOrder::from_items(
            user_id,
            vec![OrderItem::snapshot(&product, quantity, option)],
            payment_method,
        );
        let order = self.store.create_order(draft, Utc::now()).await?;

        tracing::info!(order_id = %order.id, total = %order.total_price, "Order created");
        Ok(order)
    }

    /// Buy the selected cart lines.
    ///
    /// The order insert and the removal of the selected lines are saved
    /// together; unselected lines stay in the cart.
    ///
    /// # Errors
    ///
    /// - `CART_EMPTY` if the cart has no lines
    /// - `NO_ITEMS` if the selection matched no line
    /// - `NOT_FOUND` if a selected line's product no longer exists
    #[instrument(skip(self, selection), fields(selected = selection.len()))]
    pub async fn create_from_cart(&self, user_id: UserId, selection: &[LineRef]) -> Result<Order> {
        let mut last_conflict = String::new();
        for attempt in 1..=self.attempts {
            let mut cart = self
                .store
                .cart(user_id)
                .await?
                .ok_or(CommerceError::CartEmpty)?;
            let taken = cart.take_selected(selection)?;

            let ids: Vec<ProductId> = taken.iter().map(|l| l.product_id).collect();
            let catalog = self.store.products(&ids).await?;
            let items = taken
                .into_iter()
                .map(|line| {
                    catalog
                        .get(&line.product_id)
                        .map(|p| OrderItem::snapshot(p, line.quantity, line.option))
                        .ok_or(CommerceError::NotFound)
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let draft = NewOrder::from_items(user_id, items, None);
            match self
                .store
                .create_order_from_cart(draft, &cart, Utc::now())
                .await
            {
                Ok((order, _)) => {
                    tracing::info!(
                        order_id = %order.id,
                        total = %order.total_price,
                        items = order.items.len(),
                        "Order created from cart"
                    );
                    return Ok(order);
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "Cart changed during checkout, retrying");
                    last_conflict = reason;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(conflict_exhausted("checkout", self.attempts, &last_conflict))
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if storage fails.
    #[instrument(skip(self))]
    pub async fn list_mine(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(user_id).await?)
    }

    /// Fetch an order on behalf of its owner or an admin.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` if the order does not exist
    /// - `FORBIDDEN` if the requester is neither owner nor admin
    #[instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId, requester: CurrentUser) -> Result<Order> {
        let order = self.load(order_id).await?;
        ensure_access(&order, requester)?;
        Ok(order)
    }

    /// Cancel a pending or paid order.
    ///
    /// Cancelling an already cancelled order succeeds without change.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` if the order does not exist
    /// - `FORBIDDEN` if the requester is neither owner nor admin
    /// - `INVALID_TRANSITION` once the order has shipped
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId, requester: CurrentUser) -> Result<Order> {
        let order = self
            .update_order(order_id, |order| {
                ensure_access(order, requester)?;
                Ok(order.apply(OrderEvent::Cancelled, Utc::now())?)
            })
            .await?;
        tracing::info!(order_id = %order.id, "Order cancelled");
        Ok(order)
    }

    /// Register a carrier shipment (admin). The order is in transit at once.
    ///
    /// # Errors
    ///
    /// - `BAD_REQUEST` if the courier code or tracking number is blank
    /// - `NOT_FOUND` if the order does not exist
    /// - `INVALID_TRANSITION` if the order is cancelled or already shipped
    #[instrument(skip(self))]
    pub async fn register_shipping(&self, order_id: OrderId, input: ShippingInput) -> Result<Order> {
        let courier_code = input.courier_code.trim().to_string();
        let tracking_number = input.tracking_number.trim().to_string();
        if courier_code.is_empty() || tracking_number.is_empty() {
            return Err(AppError::BadRequest(
                "courierCode and trackingNumber are required".to_string(),
            ));
        }
        let courier_name = input
            .courier_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        self.update_order(order_id, |order| {
            Ok(order.apply(
                OrderEvent::ShipmentRegistered {
                    courier_code: courier_code.clone(),
                    courier_name: courier_name.clone(),
                    tracking_number: tracking_number.clone(),
                },
                Utc::now(),
            )?)
        })
        .await
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound.into())
    }

    /// Load, transform and save an order, retrying on version conflicts.
    ///
    /// `apply` returns whether it changed the order; unchanged orders are not
    /// saved.
    pub(crate) async fn update_order<F>(&self, order_id: OrderId, mut apply: F) -> Result<Order>
    where
        F: FnMut(&mut Order) -> Result<bool> + Send,
    {
        let mut last_conflict = String::new();
        for attempt in 1..=self.attempts {
            let mut order = self.load(order_id).await?;
            if !apply(&mut order)? {
                return Ok(order);
            }

            match self.store.save_order(&order).await {
                Ok(saved) => return Ok(saved),
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "Order save lost a race, retrying");
                    last_conflict = reason;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(conflict_exhausted("order update", self.attempts, &last_conflict))
    }
}

fn ensure_access(order: &Order, requester: CurrentUser) -> Result<()> {
    if order.user_id == requester.id || requester.is_admin() {
        Ok(())
    } else {
        Err(CommerceError::Forbidden.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::CartService;
    use crate::test_support::{RacingStore, jacket, pick, tote};
    use threadline_core::{OrderStatus, PaymentStatus, Price, UserRole};

    const OWNER: CurrentUser = CurrentUser {
        id: UserId::new(7),
        role: UserRole::Customer,
    };
    const STRANGER: CurrentUser = CurrentUser {
        id: UserId::new(8),
        role: UserRole::Customer,
    };
    const ADMIN: CurrentUser = CurrentUser {
        id: UserId::new(1),
        role: UserRole::Admin,
    };

    fn store() -> MemoryStore {
        MemoryStore::with_products([jacket(), tote()])
    }

    #[tokio::test]
    async fn test_single_order_freezes_price() {
        let store = store();
        let service = OrderService::new(&store, 3);

        let order = service
            .create_single(OWNER.id, ProductId::new(2), 0, None, Some("card".to_string()))
            .await
            .unwrap();
        assert_eq!(order.items[0].quantity, 1);
        assert_eq!(order.total_price, Price::new(12000));
        assert_eq!(order.payment.method.as_deref(), Some("card"));
        assert_eq!(order.status(), OrderStatus::Pending);

        let mut repriced = tote();
        repriced.price = Price::new(99000);
        store.put_product(repriced).await;

        let reread = service.get(order.id, OWNER).await.unwrap();
        assert_eq!(reread.items[0].price, Price::new(12000));
        assert_eq!(reread.total_price, Price::new(12000));
    }

    #[tokio::test]
    async fn test_single_order_validates_option() {
        let store = store();
        let service = OrderService::new(&store, 3);

        let err = service
            .create_single(OWNER.id, ProductId::new(1), 1, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OPTION_REQUIRED");

        let order = service
            .create_single(OWNER.id, ProductId::new(1), 2, Some(&pick(0, "S")), None)
            .await
            .unwrap();
        assert_eq!(
            order.items[0].option.as_ref().unwrap().sku.as_deref(),
            Some("JK-BLK-S")
        );
        assert_eq!(order.total_price, Price::new(78000));
    }

    #[tokio::test]
    async fn test_from_cart_takes_selected_lines() {
        let store = store();
        let carts = CartService::new(&store, 3);
        let orders = OrderService::new(&store, 3);
        carts
            .add_line(OWNER.id, ProductId::new(1), 1, Some(&pick(0, "S")))
            .await
            .unwrap();
        carts
            .add_line(OWNER.id, ProductId::new(2), 1, None)
            .await
            .unwrap();
        carts
            .add_line(OWNER.id, ProductId::new(1), 2, Some(&pick(1, "M")))
            .await
            .unwrap();

        let order = orders
            .create_from_cart(OWNER.id, &[LineRef::Index(0), LineRef::Index(2)])
            .await
            .unwrap();
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total_price, Price::new(39000 * 3));

        let cart = carts.get(OWNER.id).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].product_id, ProductId::new(2));
    }

    #[tokio::test]
    async fn test_from_cart_errors() {
        let store = store();
        let carts = CartService::new(&store, 3);
        let orders = OrderService::new(&store, 3);

        let err = orders
            .create_from_cart(OWNER.id, &[LineRef::Index(0)])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CART_EMPTY");

        carts
            .add_line(OWNER.id, ProductId::new(2), 1, None)
            .await
            .unwrap();
        let err = orders
            .create_from_cart(OWNER.id, &[LineRef::Index(5)])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_ITEMS");

        store.remove_product(ProductId::new(2)).await;
        let err = orders
            .create_from_cart(OWNER.id, &[LineRef::Index(0)])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(carts.get(OWNER.id).await.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_access_and_listing() {
        let store = store();
        let service = OrderService::new(&store, 3);
        let first = service
            .create_single(OWNER.id, ProductId::new(2), 1, None, None)
            .await
            .unwrap();
        let second = service
            .create_single(OWNER.id, ProductId::new(2), 2, None, None)
            .await
            .unwrap();

        let mine = service.list_mine(OWNER.id).await.unwrap();
        assert_eq!(
            mine.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert!(service.list_mine(STRANGER.id).await.unwrap().is_empty());

        let err = service.get(first.id, STRANGER).await.unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(service.get(first.id, ADMIN).await.is_ok());

        let err = service.get(OrderId::new(404), OWNER).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let store = store();
        let service = OrderService::new(&store, 3);
        let order = service
            .create_single(OWNER.id, ProductId::new(2), 1, None, None)
            .await
            .unwrap();

        let err = service.cancel(order.id, STRANGER).await.unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let cancelled = service.cancel(order.id, OWNER).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        let again = service.cancel(order.id, OWNER).await.unwrap();
        assert_eq!(again.version, cancelled.version);

        let err = service
            .register_shipping(
                order.id,
                ShippingInput {
                    courier_code: "CJ".to_string(),
                    courier_name: None,
                    tracking_number: "123".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_register_shipping() {
        let store = store();
        let service = OrderService::new(&store, 3);
        let order = service
            .create_single(OWNER.id, ProductId::new(2), 1, None, None)
            .await
            .unwrap();

        let err = service
            .register_shipping(
                order.id,
                ShippingInput {
                    courier_code: " ".to_string(),
                    courier_name: None,
                    tracking_number: "123".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");

        let shipped = service
            .register_shipping(
                order.id,
                ShippingInput {
                    courier_code: "CJ".to_string(),
                    courier_name: Some("CJ Logistics".to_string()),
                    tracking_number: "6301-2233".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(shipped.status(), OrderStatus::Shipping);
        let shipment = shipped.shipping.as_ref().unwrap();
        assert!(shipment.shipped_at.is_some());
        assert_eq!(shipment.tracking_number.as_deref(), Some("6301-2233"));

        let err = service.cancel(order.id, OWNER).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_cancel_retries_after_concurrent_payment() {
        let store = RacingStore::new(store(), 1);
        let service = OrderService::new(&store, 3);
        let order = service
            .create_single(OWNER.id, ProductId::new(2), 1, None, None)
            .await
            .unwrap();

        let cancelled = service.cancel(order.id, OWNER).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.payment.status, PaymentStatus::Paid);
        assert_eq!(cancelled.version, order.version + 2);
    }

    #[tokio::test]
    async fn test_order_conflict_after_last_attempt() {
        let store = RacingStore::new(store(), 1);
        let service = OrderService::new(&store, 1);
        let order = service
            .create_single(OWNER.id, ProductId::new(2), 1, None, None)
            .await
            .unwrap();

        let err = service.cancel(order.id, OWNER).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        let stored = store.inner.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Paid);
        assert!(stored.cancelled_at.is_none());
    }
}
