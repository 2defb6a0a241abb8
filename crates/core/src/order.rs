//! Order snapshots and their lifecycle.
//!
//! An order freezes the product name and price of every item at creation.
//! Its lifecycle status is not stored; [`Order::status`] projects it from the
//! payment, shipment and cancellation records. All changes to those records go
//! through [`Order::apply`], which rejects moves the lifecycle does not allow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{LineOption, Product};
use crate::error::CommerceError;
use crate::types::{OrderId, OrderStatus, PaymentStatus, Price, ProductId, ShippingStatus, UserId};

/// One purchased item with its price frozen at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<LineOption>,
}

impl OrderItem {
    /// Snapshot the current catalog data of `product`.
    #[must_use]
    pub fn snapshot(product: &Product, quantity: u32, option: Option<LineOption>) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            quantity,
            price: product.price,
            option,
        }
    }

    /// `price × quantity`.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// Payment record of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub status: PaymentStatus,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Shipment record of an order.
///
/// Every order starts with a READY record and no carrier; courier and
/// tracking number arrive when a shipment is registered or assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    #[serde(default)]
    pub courier_code: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    pub status: ShippingStatus,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_checkpoint: Option<String>,
}

impl Shipment {
    /// Shipment record an order starts with: READY, no carrier yet.
    #[must_use]
    pub const fn unassigned() -> Self {
        Self {
            courier_code: None,
            courier_name: None,
            tracking_number: None,
            status: ShippingStatus::Ready,
            shipped_at: None,
            delivered_at: None,
            last_checkpoint: None,
        }
    }
}

/// Data needed to insert an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_price: Price,
    pub payment_method: Option<String>,
}

impl NewOrder {
    /// Build an order draft, computing the total once from the items.
    #[must_use]
    pub fn from_items(
        user_id: UserId,
        items: Vec<OrderItem>,
        payment_method: Option<String>,
    ) -> Self {
        let total_price = items.iter().map(OrderItem::subtotal).sum();
        Self {
            user_id,
            items,
            total_price,
            payment_method,
        }
    }

    /// Payment record an order starts with.
    #[must_use]
    pub fn initial_payment(&self) -> Payment {
        Payment {
            method: self.payment_method.clone(),
            ..Payment::default()
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_price: Price,
    pub payment: Payment,
    pub shipping: Option<Shipment>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// A change to an order's payment, shipment or cancellation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// Payment captured by the provider.
    PaymentApproved {
        provider: String,
        transaction_id: String,
        receipt_url: Option<String>,
    },
    /// Payment cancelled by the provider.
    PaymentCancelled,
    /// Admin registered a real carrier shipment; it is in transit immediately.
    ShipmentRegistered {
        courier_code: String,
        courier_name: Option<String>,
        tracking_number: String,
    },
    /// A shipment was created in READY state (mock carrier).
    ShipmentAssigned {
        courier_code: String,
        courier_name: Option<String>,
        tracking_number: String,
    },
    /// Carrier picked the parcel up.
    ShipmentDispatched { checkpoint: String },
    /// Carrier delivered the parcel.
    ShipmentDelivered { checkpoint: String },
    /// Customer, admin or provider cancelled the order.
    Cancelled,
}

impl OrderEvent {
    const fn action(&self) -> &'static str {
        match self {
            Self::PaymentApproved { .. } => "approve payment for",
            Self::PaymentCancelled => "cancel payment for",
            Self::ShipmentRegistered { .. } | Self::ShipmentAssigned { .. } => "ship",
            Self::ShipmentDispatched { .. } => "dispatch",
            Self::ShipmentDelivered { .. } => "deliver",
            Self::Cancelled => "cancel",
        }
    }
}

impl Order {
    /// Lifecycle status projected from the sub-records.
    ///
    /// Cancellation wins, then the shipment state, then the payment state.
    #[must_use]
    pub fn status(&self) -> OrderStatus {
        if self.cancelled_at.is_some() {
            return OrderStatus::Cancelled;
        }
        match self.shipping.as_ref().map(|s| s.status) {
            Some(ShippingStatus::Delivered) => OrderStatus::Delivered,
            Some(ShippingStatus::Shipping) => OrderStatus::Shipping,
            Some(ShippingStatus::Ready) | None => match self.payment.status {
                PaymentStatus::Paid => OrderStatus::Paid,
                PaymentStatus::Pending | PaymentStatus::Cancelled => OrderStatus::Pending,
            },
        }
    }

    /// Whether a shipment may still be registered or assigned: not
    /// cancelled, and the parcel has not left (no record, or READY).
    fn awaits_shipment(&self) -> bool {
        self.cancelled_at.is_none()
            && self
                .shipping
                .as_ref()
                .is_none_or(|s| s.status == ShippingStatus::Ready)
    }

    /// Apply an event at `now`.
    ///
    /// Returns `Ok(true)` if the order changed and `Ok(false)` if the event
    /// was already applied (repeated webhooks, repeated cancellation).
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::InvalidTransition` if the current status does
    /// not allow the event. The order is untouched on error.
    pub fn apply(&mut self, event: OrderEvent, now: DateTime<Utc>) -> Result<bool, CommerceError> {
        let from = self.status();
        let invalid = CommerceError::InvalidTransition {
            from,
            action: event.action(),
        };

        match event {
            OrderEvent::PaymentApproved {
                provider,
                transaction_id,
                receipt_url,
            } => {
                if self.payment.status == PaymentStatus::Paid {
                    return if self.payment.transaction_id.as_deref() == Some(transaction_id.as_str()) {
                        Ok(false)
                    } else {
                        Err(invalid)
                    };
                }
                if from == OrderStatus::Cancelled {
                    return Err(invalid);
                }
                self.payment.status = PaymentStatus::Paid;
                self.payment.provider = Some(provider);
                self.payment.transaction_id = Some(transaction_id);
                self.payment.receipt_url = receipt_url;
                self.payment.paid_at = Some(now);
            }
            OrderEvent::PaymentCancelled => {
                if self.payment.status == PaymentStatus::Cancelled && from == OrderStatus::Cancelled
                {
                    return Ok(false);
                }
                if !from.can_cancel() && from != OrderStatus::Cancelled {
                    return Err(invalid);
                }
                self.payment.status = PaymentStatus::Cancelled;
                self.cancelled_at.get_or_insert(now);
            }
            OrderEvent::ShipmentRegistered {
                courier_code,
                courier_name,
                tracking_number,
            } => {
                if !self.awaits_shipment() {
                    return Err(invalid);
                }
                self.shipping = Some(Shipment {
                    courier_code: Some(courier_code),
                    courier_name,
                    tracking_number: Some(tracking_number),
                    status: ShippingStatus::Shipping,
                    shipped_at: Some(now),
                    delivered_at: None,
                    last_checkpoint: None,
                });
            }
            OrderEvent::ShipmentAssigned {
                courier_code,
                courier_name,
                tracking_number,
            } => {
                if !self.awaits_shipment() {
                    return Err(invalid);
                }
                self.shipping = Some(Shipment {
                    courier_code: Some(courier_code),
                    courier_name,
                    tracking_number: Some(tracking_number),
                    status: ShippingStatus::Ready,
                    shipped_at: None,
                    delivered_at: None,
                    last_checkpoint: None,
                });
            }
            OrderEvent::ShipmentDispatched { checkpoint } => {
                let shipment = self
                    .shipping
                    .as_mut()
                    .filter(|s| s.status == ShippingStatus::Ready && from != OrderStatus::Cancelled)
                    .ok_or(invalid)?;
                shipment.status = ShippingStatus::Shipping;
                shipment.shipped_at = Some(now);
                shipment.last_checkpoint = Some(checkpoint);
            }
            OrderEvent::ShipmentDelivered { checkpoint } => {
                let shipment = self
                    .shipping
                    .as_mut()
                    .filter(|s| s.status == ShippingStatus::Shipping && from != OrderStatus::Cancelled)
                    .ok_or(invalid)?;
                shipment.status = ShippingStatus::Delivered;
                shipment.delivered_at = Some(now);
                shipment.last_checkpoint = Some(checkpoint);
            }
            OrderEvent::Cancelled => {
                if from == OrderStatus::Cancelled {
                    return Ok(false);
                }
                if !from.can_cancel() {
                    return Err(invalid);
                }
                self.cancelled_at = Some(now);
            }
        }

        self.updated_at = now;
        Ok(true)
    }

    /// Serializable view including the projected status.
    #[must_use]
    pub fn view(&self) -> OrderView<'_> {
        OrderView {
            order: self,
            status: self.status(),
        }
    }
}

/// An order as rendered to clients.
#[derive(Debug, Serialize)]
pub struct OrderView<'a> {
    #[serde(flatten)]
    pub order: &'a Order,
    pub status: OrderStatus,
}
