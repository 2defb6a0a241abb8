//! Cart route handlers.
//!
//! Every handler returns the hydrated cart. Lines are addressed by position
//! or by stable line id in the `{line}` segment.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::Deserialize;
use serde_json::Value;

use threadline_core::cart::{CartView, LineRef};
use threadline_core::CommerceError;
use threadline_core::catalog::OptionInput;

use super::extract::{self, ApiJson};
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::services::MergeEntry;
use crate::state::AppState;

/// Build the cart router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart", get(show))
        .route("/cart/items", post(add))
        .route(
            "/cart/items/line/{line}",
            put(replace_option).patch(set_quantity).delete(remove_line),
        )
        .route(
            "/cart/items/{product_id}",
            patch(set_product_quantity).delete(remove_product),
        )
        .route("/cart/clear", post(clear))
        .route("/cart/merge", post(merge))
}

/// Body of `POST /cart/items` and of each merge entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    #[serde(default)]
    pub product_id: Option<Value>,
    #[serde(default)]
    pub qty: Option<Value>,
    #[serde(default)]
    pub option: Option<OptionInput>,
}

#[derive(Debug, Deserialize)]
pub struct OptionRequest {
    #[serde(default)]
    pub option: Option<OptionInput>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    #[serde(default)]
    pub qty: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub items: Option<Vec<Value>>,
}

fn line(segment: &str) -> Result<LineRef> {
    Ok(segment.parse::<LineRef>()?)
}

/// Show the cart, creating it on first access.
pub async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts().get(user.id).await?))
}

/// Add a product to the cart.
pub async fn add(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<Response> {
    let product_id = extract::product_id(&extract::required(body.product_id, "productId")?)?;
    let quantity = extract::quantity_or(body.qty.as_ref(), 1)?;

    let cart = state
        .carts()
        .add_line(user.id, product_id, quantity, body.option.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(cart)).into_response())
}

/// Replace the option of a line.
pub async fn replace_option(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(segment): Path<String>,
    ApiJson(body): ApiJson<OptionRequest>,
) -> Result<Json<CartView>> {
    let line = line(&segment)?;
    let cart = state
        .carts()
        .replace_option(user.id, line, body.option.as_ref())
        .await?;
    Ok(Json(cart))
}

/// Set the quantity of a line; zero or less removes it.
pub async fn set_quantity(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(segment): Path<String>,
    ApiJson(body): ApiJson<QuantityRequest>,
) -> Result<Json<CartView>> {
    let line = line(&segment)?;
    let quantity = extract::quantity(body.qty.as_ref().unwrap_or(&Value::Null))?;
    Ok(Json(state.carts().set_quantity(user.id, line, quantity).await?))
}

/// Remove a line.
pub async fn remove_line(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Result<Json<CartView>> {
    let line = line(&segment)?;
    Ok(Json(state.carts().remove_line(user.id, line).await?))
}

/// Set the quantity of the first line holding a product.
pub async fn set_product_quantity(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(segment): Path<String>,
    ApiJson(body): ApiJson<QuantityRequest>,
) -> Result<Json<CartView>> {
    let product_id = extract::product_id_segment(&segment)?;
    let quantity = extract::quantity(body.qty.as_ref().unwrap_or(&Value::Null))?;
    let cart = state
        .carts()
        .set_quantity_by_product(user.id, product_id, quantity)
        .await?;
    Ok(Json(cart))
}

/// Remove every line holding a product.
pub async fn remove_product(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Result<Json<CartView>> {
    let product_id = extract::product_id_segment(&segment)?;
    Ok(Json(state.carts().remove_product(user.id, product_id).await?))
}

/// Empty the cart.
pub async fn clear(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts().clear(user.id).await?))
}

/// Add several entries at once; invalid entries are skipped.
pub async fn merge(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<MergeRequest>,
) -> Result<Response> {
    let items = extract::required(body.items, "items")?;
    let entries: Vec<MergeEntry> = items.iter().map(merge_entry).collect();

    let outcome = state
        .carts()
        .merge(user.id, &entries, state.config().merge_policy)
        .await?;
    Ok(Json(outcome).into_response())
}

fn merge_entry(item: &Value) -> MergeEntry {
    let option = item
        .get("option")
        .filter(|o| !o.is_null())
        .and_then(|o| serde_json::from_value::<OptionInput>(o.clone()).ok());
    MergeEntry {
        product_id: item
            .get("productId")
            .map_or(Err(CommerceError::BadProduct), extract::product_id),
        quantity: extract::quantity_or(item.get("qty"), 1),
        option,
    }
}
