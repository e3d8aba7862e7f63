//! Result consumer loop over the in-memory queue.

mod helpers;

use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use pets_analysis::db::{AnalysisRecordStore, PetStore};
use pets_analysis::models::analysis::AnalysisStatus;
use pets_analysis::models::pet::Species;
use pets_analysis::services::consumer::{process_delivery, ResultConsumer};
use pets_analysis::services::queue::ResultSource;

fn payload(analysis_id: i64, status: &str, result: &str, analysis_type: &str) -> String {
    serde_json::to_string(&result_message(analysis_id, status, result, analysis_type, Some(0.88)))
        .unwrap()
}

#[tokio::test]
async fn test_handled_message_is_acknowledged() {
    let h = Harness::new(vec![pet(1, "u1", Species::Cat)]);
    let record = h
        .coordinator
        .create_analysis(request(Some(1), "BREED"), &owner("u1"))
        .await
        .unwrap();
    h.queue.push_response(payload(record.id, "200", "Persian", "CAT_BREED")).await;

    let delivery = h.queue.receive().await.unwrap().unwrap();
    process_delivery(h.queue.as_ref(), &h.reconciler, &delivery).await.unwrap();

    assert_eq!(h.queue.in_flight().await, 0);
    assert!(h.queue.dead_letters().await.is_empty());
    assert_eq!(h.pets.find_by_id(1).await.unwrap().unwrap().breed.as_deref(), Some("Persian"));
}

#[tokio::test]
async fn test_orphaned_result_is_dead_lettered() {
    let h = Harness::new(vec![pet(1, "u1", Species::Dog)]);
    let orphan = payload(31, "200", "Labrador", "DOG_BREED");
    h.queue.push_response(orphan.clone()).await;

    let delivery = h.queue.receive().await.unwrap().unwrap();
    process_delivery(h.queue.as_ref(), &h.reconciler, &delivery).await.unwrap();

    assert_eq!(h.queue.dead_letters().await, vec![orphan]);
    assert_eq!(h.queue.in_flight().await, 0);
}

#[tokio::test]
async fn test_malformed_payload_is_dead_lettered() {
    let h = Harness::new(vec![]);
    h.queue.push_response(r#"{"petId": 3, "result": "Labrador"}"#).await;

    let delivery = h.queue.receive().await.unwrap().unwrap();
    process_delivery(h.queue.as_ref(), &h.reconciler, &delivery).await.unwrap();

    assert_eq!(h.queue.dead_letters().await.len(), 1);
}

#[tokio::test]
async fn test_duplicate_delivery_is_acknowledged() {
    let h = Harness::new(vec![pet(1, "u1", Species::Dog)]);
    let record = h
        .coordinator
        .create_analysis(request(Some(1), "BREED"), &owner("u1"))
        .await
        .unwrap();
    let message = payload(record.id, "200", "Husky", "DOG_BREED");
    h.queue.push_response(message.clone()).await;
    h.queue.push_response(message).await;

    for _ in 0..2 {
        let delivery = h.queue.receive().await.unwrap().unwrap();
        process_delivery(h.queue.as_ref(), &h.reconciler, &delivery).await.unwrap();
    }

    assert!(h.queue.dead_letters().await.is_empty());
    assert_eq!(h.pets.update_count().await, 1);
}

#[tokio::test]
async fn test_consumer_drains_queue_and_stops_on_signal() {
    let h = Harness::new(vec![pet(1, "u1", Species::Dog), pet(2, "u1", Species::Cat)]);
    let mut ids = Vec::new();
    for pet_id in [1, 2, 1] {
        let record = h
            .coordinator
            .create_analysis(request(Some(pet_id), "EMOTIONAL"), &owner("u1"))
            .await
            .unwrap();
        ids.push(record.id);
    }
    for id in &ids {
        h.queue.push_response(payload(*id, "200", "calm", "DOG_EMOTIONAL")).await;
    }
    h.queue.push_response(payload(500, "200", "calm", "DOG_EMOTIONAL")).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = ResultConsumer::new(
        h.queue.clone(),
        h.reconciler.clone(),
        2,
        Duration::from_millis(10),
    );
    let running = tokio::spawn(consumer.run(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.queue.pending_responses().await > 0 || h.queue.in_flight().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue drained");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("consumer stopped")
        .unwrap();

    for id in ids {
        let record = h.analyses.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Completed);
    }
    assert_eq!(h.queue.dead_letters().await.len(), 1);
}

#[tokio::test]
async fn test_consumer_stops_when_idle() {
    let h = Harness::new(vec![]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = ResultConsumer::new(
        h.queue.clone(),
        Arc::clone(&h.reconciler),
        4,
        Duration::from_secs(60),
    );
    let running = tokio::spawn(consumer.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("consumer observed shutdown while sleeping")
        .unwrap();
}
