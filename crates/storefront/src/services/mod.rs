//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - Cart operations and hydration
//! - `orders` - Order creation, listing, cancellation and shipping registration
//! - `payments` - Payment confirmation and provider webhooks
//! - `tracking` - Mock carrier refresh and the periodic sweep
//!
//! Every mutation is load → pure transform → versioned save. A save that
//! loses a race is retried from a fresh load, up to the configured number of
//! attempts; after that the caller gets `CONFLICT`.

pub mod cart;
pub mod orders;
pub mod payments;
pub mod tracking;

pub use cart::{CartService, MergeEntry, MergeOutcome, SkippedEntry};
pub use orders::{OrderService, ShippingInput};
pub use payments::{PaymentConfirmation, PaymentService, WebhookEvent, WebhookOutcome};
pub use tracking::{SweepReport, TrackingService, spawn_tracking_sweep};

use crate::error::AppError;

/// Error returned once every attempt lost to a concurrent writer.
fn conflict_exhausted(what: &str, attempts: u32, last: &str) -> AppError {
    tracing::warn!(what, attempts, reason = last, "Giving up after version conflicts");
    AppError::Conflict(format!("{what}: {last}"))
}
