//! Order route handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use threadline_core::catalog::OptionInput;
use threadline_core::order::Order;
use threadline_core::{OrderId, Price};

use super::extract::{self, ApiJson};
use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::services::ShippingInput;
use crate::state::AppState;

/// Build the order router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/single", post(create_single))
        .route("/orders/from-cart", post(create_from_cart))
        .route("/orders/my", get(list_mine))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/cancel", post(cancel))
        .route("/orders/{id}/shipping", patch(register_shipping))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleOrderRequest {
    #[serde(default)]
    pub product_id: Option<Value>,
    #[serde(default)]
    pub qty: Option<Value>,
    #[serde(default)]
    pub option: Option<OptionInput>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FromCartRequest {
    #[serde(default)]
    pub lines: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRequest {
    #[serde(default)]
    pub courier_code: String,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub tracking_number: String,
}

/// Response of the order creation endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub id: OrderId,
    pub total_price: Price,
}

fn created(order: &Order) -> Response {
    (
        StatusCode::CREATED,
        Json(CreatedOrder {
            id: order.id,
            total_price: order.total_price,
        }),
    )
        .into_response()
}

/// Buy one product.
pub async fn create_single(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SingleOrderRequest>,
) -> Result<Response> {
    let product_id = extract::product_id(&extract::required(body.product_id, "productId")?)?;
    let quantity = extract::quantity_or(body.qty.as_ref(), 1)?;

    let order = state
        .orders()
        .create_single(
            user.id,
            product_id,
            quantity,
            body.option.as_ref(),
            body.payment_method,
        )
        .await?;
    Ok(created(&order))
}

/// Buy the selected cart lines.
pub async fn create_from_cart(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<FromCartRequest>,
) -> Result<Response> {
    let selection = extract::required(body.lines, "lines")?
        .iter()
        .map(extract::line_ref)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let order = state.orders().create_from_cart(user.id, &selection).await?;
    Ok(created(&order))
}

/// The caller's orders, newest first.
pub async fn list_mine(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Response> {
    let orders = state.orders().list_mine(user.id).await?;
    Ok(Json(orders.iter().map(Order::view).collect::<Vec<_>>()).into_response())
}

/// One order, for its owner or an admin.
pub async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let order = state.orders().get(extract::order_id(&id)?, user).await?;
    Ok(Json(order.view()).into_response())
}

/// Cancel a pending or paid order.
pub async fn cancel(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let order = state.orders().cancel(extract::order_id(&id)?, user).await?;
    Ok(Json(order.view()).into_response())
}

/// Register a carrier shipment (admin).
pub async fn register_shipping(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ShippingRequest>,
) -> Result<Response> {
    let input = ShippingInput {
        courier_code: body.courier_code,
        courier_name: body.courier_name,
        tracking_number: body.tracking_number,
    };
    let order = state
        .orders()
        .register_shipping(extract::order_id(&id)?, input)
        .await?;
    Ok(Json(order.view()).into_response())
}
