//! Integration tests for Threadline.
//!
//! Tests drive the full router (middleware included) in process against a
//! [`MemoryStore`] seeded with a small catalog. The caller is injected as a
//! `CurrentUser` request extension, which the auth extractors read before the
//! session.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p threadline-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;

use threadline_core::catalog::{Product, SizeStock, Variant};
use threadline_core::{Price, ProductId, UserId, UserRole};
use threadline_storefront::app;
use threadline_storefront::config::StorefrontConfig;
use threadline_storefront::db::{MemoryStore, Store};
use threadline_storefront::models::CurrentUser;
use threadline_storefront::state::AppState;

/// A regular customer.
pub const ALICE: CurrentUser = CurrentUser {
    id: UserId::new(1),
    role: UserRole::Customer,
};

/// Another customer.
pub const BOB: CurrentUser = CurrentUser {
    id: UserId::new(2),
    role: UserRole::Customer,
};

/// A store admin.
pub const ADMIN: CurrentUser = CurrentUser {
    id: UserId::new(99),
    role: UserRole::Admin,
};

fn size(size: &str, sku: Option<&str>) -> SizeStock {
    SizeStock {
        size: size.to_string(),
        stock: 5,
        sku: sku.map(str::to_string),
    }
}

/// Jacket with two colors: Black (S, M) and Ivory (M).
#[must_use]
pub fn jacket() -> Product {
    Product {
        id: ProductId::new(1),
        name: "Cropped Jacket".to_string(),
        price: Price::new(39_000),
        images: vec!["/img/jacket.jpg".to_string()],
        variants: vec![
            Variant {
                color: "Black".to_string(),
                color_hex: Some("#000000".to_string()),
                sizes: vec![size("S", Some("JK-BLK-S")), size("M", Some("JK-BLK-M"))],
            },
            Variant {
                color: "Ivory".to_string(),
                color_hex: None,
                sizes: vec![size("M", None)],
            },
        ],
    }
}

/// Tote without options.
#[must_use]
pub fn tote() -> Product {
    Product {
        id: ProductId::new(2),
        name: "Canvas Tote".to_string(),
        price: Price::new(12_000),
        images: Vec::new(),
        variants: Vec::new(),
    }
}

/// An application wired to an in-memory store.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    router: Router,
}

impl TestApp {
    /// App with the default test configuration.
    pub fn new() -> Self {
        Self::with_config(Self::config())
    }

    /// Configuration used by [`TestApp::new`]: immediate mock delivery.
    #[must_use]
    pub fn config() -> StorefrontConfig {
        let mut config = StorefrontConfig::default();
        config.tracking.delivery_after = std::time::Duration::ZERO;
        config
    }

    /// App with a custom configuration.
    pub fn with_config(config: StorefrontConfig) -> Self {
        let store = Arc::new(MemoryStore::with_products([jacket(), tote()]));
        let shared: Arc<dyn Store> = store.clone();
        let state = AppState::new(config, shared);
        let router = app(state, tower_sessions::MemoryStore::default());
        Self { store, router }
    }

    /// Send a request with an optional caller and JSON body.
    pub async fn send(
        &self,
        user: Option<CurrentUser>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let mut request = builder.body(body).unwrap();
        if let Some(user) = user {
            request.extensions_mut().insert(user);
        }
        self.dispatch(request).await
    }

    /// Send a raw request.
    pub async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, user: CurrentUser, uri: &str) -> (StatusCode, Value) {
        self.send(Some(user), Method::GET, uri, None).await
    }

    pub async fn post(&self, user: CurrentUser, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Some(user), Method::POST, uri, Some(body)).await
    }

    pub async fn patch(&self, user: CurrentUser, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Some(user), Method::PATCH, uri, Some(body)).await
    }

    pub async fn put(&self, user: CurrentUser, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Some(user), Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, user: CurrentUser, uri: &str) -> (StatusCode, Value) {
        self.send(Some(user), Method::DELETE, uri, None).await
    }

    /// Place a single-product order and return its id.
    pub async fn place_order(&self, user: CurrentUser, product_id: i32, qty: i64) -> i64 {
        let (status, body) = self
            .post(
                user,
                "/orders/single",
                serde_json::json!({ "productId": product_id, "qty": qty }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`, as the provider sends it.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
