//! Application state shared across handlers.

use std::sync::Arc;

use threadline_core::tracking::MockCarrier;

use crate::config::StorefrontConfig;
use crate::db::Store;
use crate::services::{CartService, OrderService, PaymentService, TrackingService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the store, configuration and service constructors.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: Arc<dyn Store>,
    carrier: MockCarrier,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `store` - Backing store (`PgStore` or `MemoryStore`)
    #[must_use]
    pub fn new(config: StorefrontConfig, store: Arc<dyn Store>) -> Self {
        let delivery_after = chrono::Duration::from_std(config.tracking.delivery_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(2));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                carrier: MockCarrier::new(delivery_after),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the backing store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    fn attempts(&self) -> u32 {
        self.inner.config.mutation_retries.max(1)
    }

    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self.store(), self.attempts())
    }

    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.store(), self.attempts())
    }

    #[must_use]
    pub fn payments(&self) -> PaymentService<'_> {
        PaymentService::new(self.store(), self.attempts(), &self.inner.config.payments)
    }

    #[must_use]
    pub fn tracking(&self) -> TrackingService<'_> {
        TrackingService::new(self.store(), self.attempts(), self.inner.carrier)
    }
}
