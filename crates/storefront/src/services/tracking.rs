//! Mock carrier tracking and the periodic sweep.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use threadline_core::OrderId;
use threadline_core::order::Order;
use threadline_core::tracking::{MockCarrier, RefreshOutcome, mock_assignment};

use super::OrderService;
use crate::db::Store;
use crate::error::Result;
use crate::state::AppState;

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub dispatched: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Tracking service.
pub struct TrackingService<'a> {
    orders: OrderService<'a>,
    store: &'a dyn Store,
    carrier: MockCarrier,
}

impl<'a> TrackingService<'a> {
    /// Create a new tracking service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, attempts: u32, carrier: MockCarrier) -> Self {
        Self {
            orders: OrderService::new(store, attempts),
            store,
            carrier,
        }
    }

    /// Put an order on the mock carrier in READY state (admin).
    ///
    /// A tracking number is generated when none is given.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` if the order does not exist
    /// - `INVALID_TRANSITION` if the order is cancelled or delivered
    #[instrument(skip(self))]
    pub async fn assign_mock(&self, order_id: OrderId, tracking_number: Option<String>) -> Result<Order> {
        let tracking_number = tracking_number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(generate_tracking_number);

        let order = self
            .orders
            .update_order(order_id, |order| {
                Ok(order.apply(mock_assignment(tracking_number.clone()), Utc::now())?)
            })
            .await?;
        tracing::info!(%order_id, %tracking_number, "Mock shipment assigned");
        Ok(order)
    }

    /// Advance one order's mock shipment by at most one step (admin).
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn refresh(&self, order_id: OrderId, force_delivered: bool) -> Result<Order> {
        let carrier = self.carrier;
        self.orders
            .update_order(order_id, |order| {
                let outcome = carrier.refresh(order, Utc::now(), force_delivered)?;
                Ok(outcome.changed())
            })
            .await
    }

    /// Refresh every order in transit.
    ///
    /// Per-order failures are logged, reported to Sentry and counted; they do
    /// not stop the sweep.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the orders in transit cannot be listed.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let in_transit = self.store.orders_in_transit().await?;
        let mut report = SweepReport::default();

        for order in in_transit {
            report.checked += 1;
            match self.refresh_one(order.id).await {
                Ok(RefreshOutcome::Dispatched) => report.dispatched += 1,
                Ok(RefreshOutcome::Delivered) => report.delivered += 1,
                Ok(RefreshOutcome::Ignored | RefreshOutcome::Unchanged) => {}
                Err(err) => {
                    report.failed += 1;
                    let event_id = sentry::capture_error(&err);
                    tracing::error!(
                        order_id = %order.id,
                        error = %err,
                        sentry_event_id = %event_id,
                        "Tracking refresh failed"
                    );
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            delivered = report.delivered,
            failed = report.failed,
            "Tracking sweep finished"
        );
        Ok(report)
    }

    async fn refresh_one(&self, order_id: OrderId) -> Result<RefreshOutcome> {
        let carrier = self.carrier;
        let mut outcome = RefreshOutcome::Unchanged;
        self.orders
            .update_order(order_id, |order| {
                outcome = carrier.refresh(order, Utc::now(), false)?;
                Ok(outcome.changed())
            })
            .await?;
        Ok(outcome)
    }
}

fn generate_tracking_number() -> String {
    let digits: u64 = rand::rng().random_range(0..10_000_000_000);
    format!("MOCK-{digits:010}")
}

/// Spawn the periodic tracking sweep.
///
/// The first sweep runs one full interval after start. The task exits when
/// `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_tracking_sweep(state: AppState, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = state.config().tracking.sweep_interval.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = period.as_secs(), "Tracking sweep started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = state.tracking().sweep().await {
                        let event_id = sentry::capture_error(&err);
                        tracing::error!(error = %err, sentry_event_id = %event_id, "Tracking sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Tracking sweep stopped");
    })
}
