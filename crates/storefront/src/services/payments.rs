//! Payment confirmation and provider webhooks.
//!
//! There is no real gateway behind this service. A confirmation is accepted
//! when the submitted amount equals the frozen order total; the order key
//! becomes the transaction id. Webhooks carry the provider's view of a
//! payment and are applied through the same order lifecycle.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::instrument;

use threadline_core::order::{Order, OrderEvent, Payment};
use threadline_core::{CommerceError, OrderId, OrderStatus, Price};

use super::OrderService;
use crate::config::PaymentConfig;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::CurrentUser;

/// Header carrying the hex HMAC-SHA256 of the webhook body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Payment state returned after a confirmation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub payment: Payment,
}

impl From<Order> for PaymentConfirmation {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status(),
            payment: order.payment,
        }
    }
}

/// A provider webhook notification.
///
/// ```json
/// {"eventType": "PAYMENT_APPROVED",
///  "data": {"orderId": 12, "transactionId": "tx_1", "receiptUrl": "...", "amount": 39000}}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: WebhookData,
}

/// Payload of a [`WebhookEvent`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

/// What a webhook did. The provider is acknowledged in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The order changed.
    Applied,
    /// The event had already been applied.
    Unchanged,
    /// Unknown event type or unknown order.
    Ignored,
    /// The event contradicts the order (amount, lifecycle) or is malformed.
    Rejected,
    /// Storage failed; reported to Sentry.
    Failed,
}

enum Webhook {
    Approved {
        transaction_id: String,
        receipt_url: Option<String>,
        amount: Option<Price>,
    },
    Cancelled,
}

/// Payment service.
pub struct PaymentService<'a> {
    orders: OrderService<'a>,
    store: &'a dyn Store,
    config: &'a PaymentConfig,
}

impl<'a> PaymentService<'a> {
    /// Create a new payment service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, attempts: u32, config: &'a PaymentConfig) -> Self {
        Self {
            orders: OrderService::new(store, attempts),
            store,
            config,
        }
    }

    /// Confirm a payment for the requester's order.
    ///
    /// Confirming a paid order again with the same key succeeds without
    /// change.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` if the order does not exist
    /// - `FORBIDDEN` if the requester does not own the order
    /// - `AMOUNT_MISMATCH` if `amount` differs from the order total; the
    ///   payment is left untouched
    /// - `INVALID_TRANSITION` if the order is cancelled or was paid with a
    ///   different key
    #[instrument(skip(self, order_key))]
    pub async fn confirm(
        &self,
        requester: CurrentUser,
        order_id: OrderId,
        order_key: &str,
        amount: Price,
    ) -> Result<PaymentConfirmation> {
        let order_key = order_key.trim();
        if order_key.is_empty() {
            return Err(AppError::BadRequest("orderKey is required".to_string()));
        }
        let receipt_url = self
            .config
            .receipt_base_url
            .as_deref()
            .map(|base| format!("{}/{order_key}", base.trim_end_matches('/')));

        let order = self
            .orders
            .update_order(order_id, |order| {
                if order.user_id != requester.id {
                    return Err(CommerceError::Forbidden.into());
                }
                if order.total_price != amount {
                    return Err(CommerceError::AmountMismatch {
                        expected: order.total_price,
                        submitted: amount,
                    }
                    .into());
                }
                Ok(order.apply(
                    OrderEvent::PaymentApproved {
                        provider: self.config.provider.clone(),
                        transaction_id: order_key.to_string(),
                        receipt_url: receipt_url.clone(),
                    },
                    Utc::now(),
                )?)
            })
            .await?;

        tracing::info!(order_id = %order.id, "Payment confirmed");
        Ok(order.into())
    }

    /// Apply a provider webhook.
    ///
    /// Never fails: every problem is logged (and storage failures captured
    /// to Sentry) so that the provider always gets an acknowledgement.
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn handle_webhook(&self, event: WebhookEvent) -> WebhookOutcome {
        let Some(order_id) = event.data.order_id else {
            tracing::warn!("Webhook without orderId");
            return WebhookOutcome::Rejected;
        };
        let webhook = match event.event_type.as_str() {
            "PAYMENT_APPROVED" => {
                let Some(transaction_id) = event.data.transaction_id.filter(|t| !t.is_empty())
                else {
                    tracing::warn!(%order_id, "Approval webhook without transactionId");
                    return WebhookOutcome::Rejected;
                };
                Webhook::Approved {
                    transaction_id,
                    receipt_url: event.data.receipt_url,
                    amount: event.data.amount.map(Price::new),
                }
            }
            "PAYMENT_CANCELLED" => Webhook::Cancelled,
            other => {
                tracing::info!(event_type = other, "Ignoring webhook event type");
                return WebhookOutcome::Ignored;
            }
        };

        match self.store.order(order_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::info!(%order_id, "Webhook for unknown order");
                return WebhookOutcome::Ignored;
            }
            Err(e) => return failed(order_id, &e.into()),
        }

        let mut changed = false;
        let result = self
            .orders
            .update_order(order_id, |order| {
                let event = match &webhook {
                    Webhook::Approved {
                        transaction_id,
                        receipt_url,
                        amount,
                    } => {
                        if let Some(amount) = amount
                            && *amount != order.total_price
                        {
                            return Err(CommerceError::AmountMismatch {
                                expected: order.total_price,
                                submitted: *amount,
                            }
                            .into());
                        }
                        OrderEvent::PaymentApproved {
                            provider: self.config.provider.clone(),
                            transaction_id: transaction_id.clone(),
                            receipt_url: receipt_url.clone(),
                        }
                    }
                    Webhook::Cancelled => OrderEvent::PaymentCancelled,
                };
                changed = order.apply(event, Utc::now())?;
                Ok(changed)
            })
            .await;

        match result {
            Ok(_) if changed => {
                tracing::info!(%order_id, "Webhook applied");
                WebhookOutcome::Applied
            }
            Ok(_) => WebhookOutcome::Unchanged,
            Err(AppError::Commerce(err)) => {
                tracing::warn!(%order_id, code = err.code(), error = %err, "Webhook rejected");
                WebhookOutcome::Rejected
            }
            Err(err) => failed(order_id, &err),
        }
    }

    /// Check the webhook signature header against the raw body.
    ///
    /// Always passes when no secret is configured.
    #[must_use]
    pub fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> bool {
        self.config
            .webhook_secret
            .as_ref()
            .is_none_or(|secret| signature.is_some_and(|sig| signature_matches(secret, body, sig)))
    }
}

fn signature_matches(secret: &SecretString, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn failed(order_id: OrderId, err: &AppError) -> WebhookOutcome {
    let event_id = sentry::capture_error(err);
    tracing::error!(%order_id, error = %err, sentry_event_id = %event_id, "Webhook processing failed");
    WebhookOutcome::Failed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::test_support::tote;
    use threadline_core::{PaymentStatus, ProductId, UserId, UserRole};

    const OWNER: CurrentUser = CurrentUser {
        id: UserId::new(7),
        role: UserRole::Customer,
    };

    fn config() -> PaymentConfig {
        PaymentConfig {
            provider: "demo".to_string(),
            receipt_base_url: Some("https://pay.example.test/receipts/".to_string()),
            webhook_secret: None,
        }
    }

    async fn placed(store: &MemoryStore) -> Order {
        OrderService::new(store, 3)
            .create_single(OWNER.id, ProductId::new(2), 1, None, None)
            .await
            .unwrap()
    }

    fn approved(order_id: OrderId, amount: Option<i64>) -> WebhookEvent {
        WebhookEvent {
            event_type: "PAYMENT_APPROVED".to_string(),
            data: WebhookData {
                order_id: Some(order_id),
                transaction_id: Some("tx_1".to_string()),
                receipt_url: None,
                amount,
            },
        }
    }

    #[tokio::test]
    async fn test_confirm_marks_paid() {
        let store = MemoryStore::with_products([tote()]);
        let config = config();
        let service = PaymentService::new(&store, 3, &config);
        let order = placed(&store).await;

        let confirmed = service
            .confirm(OWNER, order.id, "key-1", Price::new(12000))
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Paid);
        assert_eq!(confirmed.payment.transaction_id.as_deref(), Some("key-1"));
        assert_eq!(confirmed.payment.provider.as_deref(), Some("demo"));
        assert_eq!(
            confirmed.payment.receipt_url.as_deref(),
            Some("https://pay.example.test/receipts/key-1")
        );
        assert!(confirmed.payment.paid_at.is_some());

        let again = service
            .confirm(OWNER, order.id, "key-1", Price::new(12000))
            .await
            .unwrap();
        assert_eq!(again.payment.paid_at, confirmed.payment.paid_at);

        let err = service
            .confirm(OWNER, order.id, "key-2", Price::new(12000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_amount_mismatch_leaves_payment_pending() {
        let store = MemoryStore::with_products([tote()]);
        let config = config();
        let service = PaymentService::new(&store, 3, &config);
        let order = placed(&store).await;

        let err = service
            .confirm(OWNER, order.id, "key-1", Price::new(11999))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AMOUNT_MISMATCH");

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Pending);
        assert_eq!(stored.version, order.version);
    }

    #[tokio::test]
    async fn test_confirm_checks_ownership() {
        let store = MemoryStore::with_products([tote()]);
        let config = config();
        let service = PaymentService::new(&store, 3, &config);
        let order = placed(&store).await;

        let stranger = CurrentUser {
            id: UserId::new(8),
            role: UserRole::Admin,
        };
        let err = service
            .confirm(stranger, order.id, "key-1", Price::new(12000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let err = service
            .confirm(OWNER, OrderId::new(999), "key-1", Price::new(12000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_webhook_outcomes() {
        let store = MemoryStore::with_products([tote()]);
        let config = config();
        let service = PaymentService::new(&store, 3, &config);
        let order = placed(&store).await;

        assert_eq!(
            service.handle_webhook(approved(OrderId::new(999), None)).await,
            WebhookOutcome::Ignored
        );
        assert_eq!(
            service.handle_webhook(approved(order.id, Some(1))).await,
            WebhookOutcome::Rejected
        );
        assert_eq!(
            service.handle_webhook(approved(order.id, Some(12000))).await,
            WebhookOutcome::Applied
        );
        assert_eq!(
            service.handle_webhook(approved(order.id, None)).await,
            WebhookOutcome::Unchanged
        );

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment.transaction_id.as_deref(), Some("tx_1"));
        assert_eq!(stored.status(), OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_cancel_webhook_cancels_order() {
        let store = MemoryStore::with_products([tote()]);
        let config = config();
        let service = PaymentService::new(&store, 3, &config);
        let order = placed(&store).await;

        let event: WebhookEvent = serde_json::from_str(&format!(
            r#"{{"eventType": "PAYMENT_CANCELLED", "data": {{"orderId": {}}}}}"#,
            order.id
        ))
        .unwrap();
        assert_eq!(service.handle_webhook(event.clone()).await, WebhookOutcome::Applied);
        assert_eq!(service.handle_webhook(event).await, WebhookOutcome::Unchanged);

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Cancelled);
        assert_eq!(stored.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_approval_without_transaction_id_rejected() {
        let store = MemoryStore::with_products([tote()]);
        let config = config();
        let service = PaymentService::new(&store, 3, &config);
        let order = placed(&store).await;

        let mut event = approved(order.id, Some(12000));
        event.data.transaction_id = None;
        assert_eq!(service.handle_webhook(event).await, WebhookOutcome::Rejected);

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Pending);
        assert_eq!(stored.version, order.version);
    }

    #[tokio::test]
    async fn test_cancel_webhook_rejected_after_shipping() {
        let store = MemoryStore::with_products([tote()]);
        let config = config();
        let service = PaymentService::new(&store, 3, &config);
        let order = placed(&store).await;
        let shipped = OrderService::new(&store, 3)
            .register_shipping(
                order.id,
                crate::services::ShippingInput {
                    courier_code: "CJ".to_string(),
                    courier_name: None,
                    tracking_number: "6301".to_string(),
                },
            )
            .await
            .unwrap();

        let event = WebhookEvent {
            event_type: "PAYMENT_CANCELLED".to_string(),
            data: WebhookData {
                order_id: Some(order.id),
                transaction_id: None,
                receipt_url: None,
                amount: None,
            },
        };
        assert_eq!(service.handle_webhook(event).await, WebhookOutcome::Rejected);

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored, shipped);
        assert_eq!(stored.status(), OrderStatus::Shipping);
    }

    #[test]
    fn test_signature_verification() {
        let store = MemoryStore::new();
        let mut config = config();
        let service = PaymentService::new(&store, 3, &config);
        assert!(service.verify_signature(b"{}", None));

        config.webhook_secret = Some(SecretString::from("k3Yq9vLm2Xr8Tz4Wb6Nc1Hd5Jf7Gp0Sa".to_string()));
        let service = PaymentService::new(&store, 3, &config);
        let mut mac = Hmac::<Sha256>::new_from_slice(b"k3Yq9vLm2Xr8Tz4Wb6Nc1Hd5Jf7Gp0Sa").unwrap();
        mac.update(b"{}");
        let good = hex::encode(mac.finalize().into_bytes());

        assert!(service.verify_signature(b"{}", Some(&good)));
        assert!(!service.verify_signature(b"{ }", Some(&good)));
        assert!(!service.verify_signature(b"{}", Some("zz")));
        assert!(!service.verify_signature(b"{}", None));
    }
}
