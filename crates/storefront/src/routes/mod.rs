//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                      - Liveness
//! GET    /health/ready                - Readiness (store reachable)
//!
//! # Cart (user)
//! GET    /cart                        - Hydrated cart
//! POST   /cart/items                  - Add line
//! PUT    /cart/items/line/{line}      - Replace option
//! PATCH  /cart/items/line/{line}      - Set quantity
//! DELETE /cart/items/line/{line}      - Remove line
//! PATCH  /cart/items/{productId}      - Set quantity by product (legacy)
//! DELETE /cart/items/{productId}      - Remove product (legacy)
//! POST   /cart/clear                  - Empty the cart
//! POST   /cart/merge                  - Bulk add
//!
//! # Orders
//! POST   /orders/single               - Buy one product (user)
//! POST   /orders/from-cart            - Buy selected cart lines (user)
//! GET    /orders/my                   - Own orders (user)
//! GET    /orders/{id}                 - Order detail (owner/admin)
//! POST   /orders/{id}/cancel          - Cancel (owner/admin)
//! PATCH  /orders/{id}/shipping        - Register shipment (admin)
//! POST   /orders/{id}/mock/shipping   - Assign mock shipment (admin)
//! POST   /orders/{id}/mock/refresh    - Advance mock shipment (admin)
//!
//! # Payments
//! POST   /payments/confirm            - Confirm payment (user)
//! POST   /payments/webhook            - Provider notification (always 200)
//! ```

pub mod cart;
pub mod extract;
pub mod orders;
pub mod payments;
pub mod tracking;

use axum::{Router, extract::State, http::StatusCode, routing::get};

use crate::state::AppState;

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .merge(cart::router())
        .merge(orders::router())
        .merge(tracking::router())
        .merge(payments::router())
}

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}

/// Readiness probe: the store must answer.
async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.store().ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}
