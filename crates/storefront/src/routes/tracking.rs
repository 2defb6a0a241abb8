//! Mock carrier admin endpoints.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::post,
};
use serde::{Deserialize, Serialize};

use threadline_core::order::Shipment;
use threadline_core::{OrderId, OrderStatus};

use super::extract;
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Build the tracking router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/mock/shipping", post(assign))
        .route("/orders/{id}/mock/refresh", post(refresh))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub force_delivered: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignResponse {
    pub id: OrderId,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub id: OrderId,
    pub status: OrderStatus,
    pub shipping: Option<Shipment>,
}

/// Put an order on the mock carrier.
pub async fn assign(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<AssignResponse>> {
    let order_id = extract::order_id(&id)?;
    let request: AssignRequest = extract::optional_json(&body)?;

    let order = state
        .tracking()
        .assign_mock(order_id, request.tracking_number)
        .await?;
    Ok(Json(AssignResponse {
        id: order.id,
        tracking_number: order.shipping.and_then(|s| s.tracking_number),
    }))
}

/// Advance an order's mock shipment by one step.
pub async fn refresh(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<RefreshResponse>> {
    let order_id = extract::order_id(&id)?;
    let request: RefreshRequest = extract::optional_json(&body)?;

    let order = state
        .tracking()
        .refresh(order_id, request.force_delivered)
        .await?;
    Ok(Json(RefreshResponse {
        id: order.id,
        status: order.status(),
        shipping: order.shipping,
    }))
}
