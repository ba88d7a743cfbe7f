use common::{DlqEnvelope, DlqErrorCode, PayloadFormat};
use order_service::test_support::sample_payload;

use crate::common::{TestApp, routes};

#[tokio::test]
async fn published_order_becomes_readable() {
    let app = TestApp::spawn().await;

    let payload = serde_json::to_vec(&sample_payload("b563feb7b2b84b6test")).unwrap();
    app.publish("b563feb7b2b84b6test", &payload);
    app.wait_for_commits(1).await;

    let res = app.get(&routes::order("b563feb7b2b84b6test")).await;

    assert_eq!(res.status, 200, "body: {}", res.text);
    assert_eq!(res.body["payment"]["transaction"], "b563feb7b2b84b6test");
    assert_eq!(app.store.count_uid("b563feb7b2b84b6test"), 1);
    app.stop().await;
}

#[tokio::test]
async fn duplicate_deliveries_store_one_order() {
    let app = TestApp::spawn().await;

    let payload = serde_json::to_vec(&sample_payload("dup")).unwrap();
    app.publish("dup", &payload);
    app.publish("dup", &payload);
    app.wait_for_commits(2).await;

    assert_eq!(app.store.count_uid("dup"), 1);
    assert!(app.queue.published("orders-dlq").is_empty());
    app.stop().await;
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered() {
    let app = TestApp::spawn().await;

    app.publish("bad", b"{not json");
    app.wait_for_commits(1).await;

    let dlq = app.queue.published("orders-dlq");
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].key.as_deref(), Some("bad"));

    let envelope: DlqEnvelope = serde_json::from_slice(&dlq[0].value).unwrap();
    assert_eq!(envelope.key.as_deref(), Some("bad"));
    assert_eq!(envelope.payload_format, PayloadFormat::Text);
    assert_eq!(envelope.error_code, DlqErrorCode::DeserializationError);
    assert!(app.store.is_empty());
    app.stop().await;
}

#[tokio::test]
async fn transient_store_failure_is_retried() {
    let app = TestApp::spawn().await;
    app.store.fail_saves(2);

    let payload = serde_json::to_vec(&sample_payload("flaky")).unwrap();
    app.publish("flaky", &payload);
    app.wait_for_commits(1).await;

    assert_eq!(app.store.save_calls(), 3);
    assert_eq!(app.store.count_uid("flaky"), 1);
    assert!(app.queue.published("orders-dlq").is_empty());
    app.stop().await;
}

#[tokio::test]
async fn persistent_store_failure_exhausts_retries() {
    let app = TestApp::spawn().await;
    app.store.fail_saves(u32::MAX);

    let payload = serde_json::to_vec(&sample_payload("doomed")).unwrap();
    app.publish("doomed", &payload);
    app.wait_for_commits(1).await;

    // max_retries = 2 in the test configuration.
    assert_eq!(app.store.save_calls(), 3);
    let dlq = app.queue.published("orders-dlq");
    assert_eq!(dlq.len(), 1);

    let envelope: DlqEnvelope = serde_json::from_slice(&dlq[0].value).unwrap();
    assert_eq!(envelope.error_code, DlqErrorCode::MaxRetriesExceeded);
    assert_eq!(envelope.payload_format, PayloadFormat::Json);
    assert_eq!(envelope.payload.get().as_bytes(), payload.as_slice());
    assert_eq!(envelope.retry_history.len(), 3);
    app.stop().await;
}
