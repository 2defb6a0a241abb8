//! Mock carrier tracking.
//!
//! The mock carrier stands in for a real carrier feed so the tracking UI can be
//! demoed end to end. A refresh advances a `MOCK` shipment one step:
//! READY to SHIPPING, then SHIPPING to DELIVERED once the delivery delay has
//! elapsed (or the caller forces it). Refreshing with the same elapsed time is
//! idempotent; a delivered shipment never changes again.

use chrono::{DateTime, Duration, Utc};

use crate::error::CommerceError;
use crate::order::{Order, OrderEvent};
use crate::types::{OrderStatus, ShippingStatus};

/// Courier code handled by the mock carrier.
pub const MOCK_COURIER_CODE: &str = "MOCK";

/// Display name of the mock carrier.
pub const MOCK_COURIER_NAME: &str = "Mock Express";

const DISPATCH_CHECKPOINT: &str = "Parcel picked up by Mock Express";
const DELIVERY_CHECKPOINT: &str = "Delivered to recipient";

/// Result of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Not a mock shipment, no shipment, or the order was cancelled.
    Ignored,
    /// Nothing to do yet, or already delivered.
    Unchanged,
    /// READY became SHIPPING.
    Dispatched,
    /// SHIPPING became DELIVERED.
    Delivered,
}

impl RefreshOutcome {
    /// Whether the order needs saving.
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Dispatched | Self::Delivered)
    }
}

/// The simulated carrier.
#[derive(Debug, Clone, Copy)]
pub struct MockCarrier {
    delivery_after: Duration,
}

impl MockCarrier {
    #[must_use]
    pub const fn new(delivery_after: Duration) -> Self {
        Self { delivery_after }
    }

    /// Advance the shipment of `order` by at most one step.
    ///
    /// `force_delivered` skips the delivery delay for a shipment already in
    /// transit; it does not skip the pickup step.
    ///
    /// # Errors
    ///
    /// Propagates `CommerceError::InvalidTransition` from the order lifecycle.
    /// The outcome checks make that unreachable for well-formed orders.
    pub fn refresh(
        &self,
        order: &mut Order,
        now: DateTime<Utc>,
        force_delivered: bool,
    ) -> Result<RefreshOutcome, CommerceError> {
        if order.status() == OrderStatus::Cancelled {
            return Ok(RefreshOutcome::Ignored);
        }
        let Some(shipment) = order
            .shipping
            .as_ref()
            .filter(|s| s.courier_code.as_deref() == Some(MOCK_COURIER_CODE))
        else {
            return Ok(RefreshOutcome::Ignored);
        };

        match shipment.status {
            ShippingStatus::Ready => {
                order.apply(
                    OrderEvent::ShipmentDispatched {
                        checkpoint: DISPATCH_CHECKPOINT.to_string(),
                    },
                    now,
                )?;
                Ok(RefreshOutcome::Dispatched)
            }
            ShippingStatus::Shipping => {
                let elapsed = shipment
                    .shipped_at
                    .is_none_or(|shipped| now - shipped >= self.delivery_after);
                if !(elapsed || force_delivered) {
                    return Ok(RefreshOutcome::Unchanged);
                }
                order.apply(
                    OrderEvent::ShipmentDelivered {
                        checkpoint: DELIVERY_CHECKPOINT.to_string(),
                    },
                    now,
                )?;
                Ok(RefreshOutcome::Delivered)
            }
            ShippingStatus::Delivered => Ok(RefreshOutcome::Unchanged),
        }
    }
}

impl Default for MockCarrier {
    fn default() -> Self {
        Self::new(Duration::minutes(2))
    }
}

/// Event assigning a fresh READY shipment on the mock carrier.
#[must_use]
pub fn mock_assignment(tracking_number: String) -> OrderEvent {
    OrderEvent::ShipmentAssigned {
        courier_code: MOCK_COURIER_CODE.to_string(),
        courier_name: Some(MOCK_COURIER_NAME.to_string()),
        tracking_number,
    }
}
