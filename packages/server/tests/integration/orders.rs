use std::sync::Arc;

use chrono::Duration;
use order_service::test_support::{MemoryOrderStore, sample_order};

use crate::common::{TestApp, routes, test_config};

fn store_with(count: i64) -> Arc<MemoryOrderStore> {
    let store = Arc::new(MemoryOrderStore::new());
    for i in 0..count {
        let mut order = sample_order(&format!("order-{i}"));
        order.date_created += Duration::minutes(i);
        store.insert(order);
    }
    store
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::spawn().await;

    let res = app.get(routes::HEALTH).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], "ok");
    app.stop().await;
}

#[tokio::test]
async fn openapi_document_lists_order_routes() {
    let app = TestApp::spawn().await;

    let res = app.get(routes::OPENAPI).await;

    assert_eq!(res.status, 200);
    assert!(res.body["paths"]["/api/v1/orders/{order_uid}"].is_object());
    app.stop().await;
}

#[tokio::test]
async fn get_order_returns_stored_order() {
    let app = TestApp::spawn_with(test_config(), store_with(1)).await;

    let res = app.get(&routes::order("order-0")).await;

    assert_eq!(res.status, 200, "body: {}", res.text);
    assert_eq!(res.body["order_uid"], "order-0");
    assert_eq!(res.body["delivery"]["city"], "Kiryat Mozkin");
    assert_eq!(res.body["items"].as_array().unwrap().len(), 1);
    app.stop().await;
}

#[tokio::test]
async fn repeated_get_is_served_from_cache() {
    let app = TestApp::spawn_with(test_config(), store_with(1)).await;

    assert_eq!(app.get(&routes::order("order-0")).await.status, 200);
    // Wait for the cache-aside write to land.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while app.cache.peek("order:order-0").is_none() {
        assert!(tokio::time::Instant::now() < deadline, "order never cached");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(app.get(&routes::order("order-0")).await.status, 200);

    assert_eq!(app.store.get_calls(), 1);
    app.stop().await;
}

#[tokio::test]
async fn get_unknown_order_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app.get(&routes::order("missing")).await;

    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "NOT_FOUND");
    assert_eq!(res.body["message"], "Order 'missing' not found");
    app.stop().await;
}

#[tokio::test]
async fn get_blank_uid_is_rejected() {
    let app = TestApp::spawn().await;

    let res = app.get(&routes::order("%20")).await;

    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
    assert_eq!(app.store.get_calls(), 0);
    app.stop().await;
}

#[tokio::test]
async fn store_failure_hides_details() {
    let app = TestApp::spawn().await;
    app.store.fail_reads(true);

    let res = app.get(&routes::order("order-0")).await;

    assert_eq!(res.status, 500);
    assert_eq!(res.body["code"], "INTERNAL_ERROR");
    assert_eq!(res.body["message"], "Internal server error");
    assert!(!res.text.contains("injected"));
    app.stop().await;
}

#[tokio::test]
async fn list_returns_newest_first_with_pagination() {
    let app = TestApp::spawn_with(test_config(), store_with(5)).await;

    let res = app.get(&format!("{}?page=2&limit=2", routes::ORDERS)).await;

    assert_eq!(res.status, 200, "body: {}", res.text);
    assert_eq!(res.body["total"], 5);
    assert_eq!(res.body["page"], 2);
    assert_eq!(res.body["limit"], 2);
    let uids: Vec<_> = res.body["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["order_uid"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(uids, ["order-2", "order-1"]);
    app.stop().await;
}

#[tokio::test]
async fn list_falls_back_on_unparsable_params() {
    let app = TestApp::spawn_with(test_config(), store_with(3)).await;

    let res = app.get(&format!("{}?page=abc&limit=-4", routes::ORDERS)).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["page"], 1);
    assert_eq!(res.body["limit"], 50);
    assert_eq!(res.body["orders"].as_array().unwrap().len(), 3);
    app.stop().await;
}

#[tokio::test]
async fn list_clamps_limit() {
    let app = TestApp::spawn().await;

    let res = app.get(&format!("{}?limit=100000", routes::ORDERS)).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["limit"], 500);
    assert_eq!(res.body["total"], 0);
    app.stop().await;
}

#[tokio::test]
async fn list_never_touches_cache() {
    let app = TestApp::spawn_with(test_config(), store_with(2)).await;

    let res = app.get(routes::ORDERS).await;

    assert_eq!(res.status, 200);
    assert_eq!(app.cache.get_calls(), 0);
    app.stop().await;
}
