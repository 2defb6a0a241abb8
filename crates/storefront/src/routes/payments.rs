//! Payment route handlers.
//!
//! The webhook endpoint always answers 200 so that the provider does not
//! retry; what happened is visible in the logs.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Deserialize;
use serde_json::{Value, json};

use threadline_core::{OrderId, Price};

use super::extract::{self, ApiJson};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::services::payments::SIGNATURE_HEADER;
use crate::services::{PaymentConfirmation, WebhookEvent};
use crate::state::AppState;

/// Build the payment router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/confirm", post(confirm))
        .route("/payments/webhook", post(webhook))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(default)]
    pub order_id: Option<Value>,
    #[serde(default)]
    pub order_key: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
}

fn integer(value: &Value, field: &str) -> Result<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| AppError::BadRequest(format!("invalid {field}")))
}

/// Confirm the payment of one of the caller's orders.
pub async fn confirm(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ConfirmRequest>,
) -> Result<Json<PaymentConfirmation>> {
    let order_id = extract::required(body.order_id, "orderId")?;
    let order_id = i32::try_from(integer(&order_id, "orderId")?)
        .map(OrderId::new)
        .map_err(|_| AppError::BadRequest("invalid orderId".to_string()))?;
    let order_key = extract::required(body.order_key, "orderKey")?;
    let amount = Price::new(integer(&extract::required(body.amount, "amount")?, "amount")?);

    let confirmation = state
        .payments()
        .confirm(user, order_id, &order_key, amount)
        .await?;
    Ok(Json(confirmation))
}

/// Receive a provider notification.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let payments = state.payments();
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !payments.verify_signature(&body, signature) {
        tracing::warn!("Webhook signature mismatch, event dropped");
        return Json(json!({ "received": true }));
    }

    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => {
            let outcome = payments.handle_webhook(event).await;
            tracing::debug!(?outcome, "Webhook handled");
        }
        Err(e) => tracing::warn!(error = %e, "Malformed webhook body"),
    }
    Json(json!({ "received": true }))
}
