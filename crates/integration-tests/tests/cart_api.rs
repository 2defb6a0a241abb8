//! Cart endpoints through the full router.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use threadline_integration_tests::{ALICE, BOB, TestApp};
use threadline_storefront::config::MergePolicy;

fn black(size: &str) -> serde_json::Value {
    json!({ "variantIndex": 0, "size": size })
}

#[tokio::test]
async fn test_cart_requires_login() {
    let app = TestApp::new();
    let (status, body) = app.send(None, Method::GET, "/cart", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_first_access_returns_empty_cart() {
    let app = TestApp::new();
    let (status, body) = app.get(ALICE, "/cart").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"], json!([]));
    assert_eq!(body["totalQty"], 0);
    assert_eq!(body["totalPrice"], 0);
}

#[tokio::test]
async fn test_add_merges_identical_options() {
    let app = TestApp::new();
    let (status, _) = app
        .post(ALICE, "/cart/items", json!({ "productId": 1, "qty": 1, "option": black("S") }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Same option, with the product id as a string and a stale client SKU.
    let option = json!({ "variantIndex": 0, "size": "S", "sku": "OLD-SKU" });
    let (_, body) = app
        .post(ALICE, "/cart/items", json!({ "productId": "1", "qty": 2, "option": option }))
        .await;
    assert_eq!(body["lines"].as_array().unwrap().len(), 1);
    assert_eq!(body["lines"][0]["qty"], 3);
    assert_eq!(body["lines"][0]["option"]["sku"], "JK-BLK-S");
    assert_eq!(body["totalPrice"], 117_000);

    let (_, body) = app
        .post(ALICE, "/cart/items", json!({ "productId": 1, "option": black("M") }))
        .await;
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);
    assert_eq!(body["totalQty"], 4);
}

#[tokio::test]
async fn test_add_rejects_bad_input() {
    let app = TestApp::new();

    let (status, body) = app.post(ALICE, "/cart/items", json!({ "productId": 1 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "OPTION_REQUIRED");

    let (_, body) = app
        .post(ALICE, "/cart/items", json!({ "productId": 2, "qty": 0 }))
        .await;
    assert_eq!(body["error"], "BAD_QTY");

    let (_, body) = app
        .post(ALICE, "/cart/items", json!({ "productId": "tote" }))
        .await;
    assert_eq!(body["error"], "BAD_PRODUCT");

    let (status, body) = app.post(ALICE, "/cart/items", json!({ "productId": 404 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, body) = app.post(ALICE, "/cart/items", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_lines_addressed_by_index_and_id() {
    let app = TestApp::new();
    app.post(ALICE, "/cart/items", json!({ "productId": 2 })).await;
    let (_, body) = app
        .post(ALICE, "/cart/items", json!({ "productId": 1, "option": black("S") }))
        .await;
    let jacket_line = body["lines"][1]["id"].as_str().unwrap().to_string();

    // Removing the first line shifts indices; the id still finds the jacket.
    let (_, body) = app.delete(ALICE, "/cart/items/line/0").await;
    assert_eq!(body["lines"][0]["productId"], 1);

    let (status, body) = app
        .patch(ALICE, &format!("/cart/items/line/{jacket_line}"), json!({ "qty": 4 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"][0]["qty"], 4);

    let (status, body) = app
        .put(ALICE, "/cart/items/line/0", json!({ "option": { "variantIndex": 1, "size": "M" } }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"][0]["option"]["color"], "Ivory");
    assert_eq!(body["lines"][0]["id"], jacket_line.as_str());

    let (status, body) = app.delete(ALICE, "/cart/items/line/7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_IN_CART");

    let (status, body) = app.delete(ALICE, "/cart/items/line/first").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_LINE");
}

#[tokio::test]
async fn test_zero_quantity_removes_line() {
    let app = TestApp::new();
    app.post(ALICE, "/cart/items", json!({ "productId": 2, "qty": 2 })).await;

    let (status, body) = app.patch(ALICE, "/cart/items/line/0", json!({ "qty": 0 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"], json!([]));
}

#[tokio::test]
async fn test_legacy_product_routes() {
    let app = TestApp::new();
    app.post(ALICE, "/cart/items", json!({ "productId": 2 })).await;
    app.post(ALICE, "/cart/items", json!({ "productId": 1, "option": black("S") }))
        .await;

    let (_, body) = app.patch(ALICE, "/cart/items/2", json!({ "qty": 5 })).await;
    assert_eq!(body["lines"][0]["qty"], 5);

    let (_, body) = app.delete(ALICE, "/cart/items/1").await;
    assert_eq!(body["lines"].as_array().unwrap().len(), 1);

    let (status, body) = app.delete(ALICE, "/cart/items/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_IN_CART");
}

#[tokio::test]
async fn test_carts_are_per_user() {
    let app = TestApp::new();
    app.post(ALICE, "/cart/items", json!({ "productId": 2 })).await;

    let (_, body) = app.get(BOB, "/cart").await;
    assert_eq!(body["lines"], json!([]));

    let (_, body) = app.post(ALICE, "/cart/clear", json!({})).await;
    assert_eq!(body["lines"], json!([]));
}

#[tokio::test]
async fn test_removed_product_keeps_line_without_summary() {
    let app = TestApp::new();
    app.post(ALICE, "/cart/items", json!({ "productId": 2, "qty": 2 })).await;
    app.store
        .remove_product(threadline_core::ProductId::new(2))
        .await;

    let (status, body) = app.get(ALICE, "/cart").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"][0]["product"], json!(null));
    assert_eq!(body["totalPrice"], 0);
}

#[tokio::test]
async fn test_merge_skips_invalid_entries() {
    let app = TestApp::new();
    let items = json!({ "items": [
        { "productId": 2, "qty": 2 },
        { "productId": 1 },
        { "productId": 999 },
        { "productId": 1, "qty": "x", "option": black("M") },
        { "productId": 1, "option": black("M") },
    ]});

    let (status, body) = app.post(ALICE, "/cart/merge", items).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);
    assert_eq!(body["totalQty"], 3);
}

#[tokio::test]
async fn test_merge_report_policy_lists_skipped() {
    let mut config = TestApp::config();
    config.merge_policy = MergePolicy::Report;
    let app = TestApp::with_config(config);

    let items = json!({ "items": [{ "productId": 2 }, { "productId": 1 }, { "qty": 1 }] });
    let (status, body) = app.post(ALICE, "/cart/merge", items).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["lines"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["skipped"],
        json!([
            { "index": 1, "error": "OPTION_REQUIRED" },
            { "index": 2, "error": "BAD_PRODUCT" },
        ])
    );
}
