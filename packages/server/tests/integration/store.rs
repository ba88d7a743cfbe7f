//! Postgres-backed store tests. Require a Docker daemon:
//! `cargo test --test integration -- --ignored`.

use std::sync::Arc;

use chrono::Duration;
use order_service::database::init_db;
use order_service::store::{OrderStore, SeaOrmOrderStore, StoreError};
use order_service::test_support::sample_order;

use crate::common::fresh_database;

async fn store() -> SeaOrmOrderStore {
    let config = fresh_database().await;
    let db = init_db(&config).await.expect("Failed to initialize database");
    SeaOrmOrderStore::new(db)
}

#[tokio::test]
#[ignore = "requires docker"]
async fn save_then_get_round_trips_aggregate() {
    let store = store().await;
    let mut order = sample_order("A1");
    let mut second = order.items[0].clone();
    second.chrt_id = 1;
    second.name = "Lipstick".into();
    order.items.push(second);

    store.save(&order).await.unwrap();
    let loaded = store.get_by_uid("A1").await.unwrap();

    assert_eq!(loaded, order);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn get_unknown_is_not_found() {
    let store = store().await;

    let err = store.get_by_uid("nope").await.unwrap_err();

    assert!(matches!(err, StoreError::NotFound(uid) if uid == "nope"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn duplicate_save_is_already_exists() {
    let store = store().await;
    store.save(&sample_order("A1")).await.unwrap();

    let err = store.save(&sample_order("A1")).await.unwrap_err();

    assert!(matches!(err, StoreError::AlreadyExists(uid) if uid == "A1"));
    let (orders, total) = store.list_page(10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].items.len(), 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_duplicates_store_one_row() {
    let store = Arc::new(store().await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save(&sample_order("race")).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => created += 1,
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 1);
    let (_, total) = store.list_page(10, 0).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn list_page_orders_newest_first() {
    let store = store().await;
    for i in 0..5 {
        let mut order = sample_order(&format!("o{i}"));
        order.date_created += Duration::hours(i);
        store.save(&order).await.unwrap();
    }

    let (orders, total) = store.list_page(2, 1).await.unwrap();

    assert_eq!(total, 5);
    let uids: Vec<_> = orders.iter().map(|o| o.order_uid.as_str()).collect();
    assert_eq!(uids, ["o3", "o2"]);
    assert!(orders.iter().all(|o| o.items.len() == 1));
}
