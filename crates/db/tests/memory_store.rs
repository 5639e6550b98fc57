use std::sync::Arc;

use fleetpulse_core::failure::FailureLabel;
use fleetpulse_core::sensor::SensorVector;
use fleetpulse_db::models::prediction::NewPrediction;
use fleetpulse_db::models::reading::ReadingWindow;
use fleetpulse_db::{MemoryStore, SensorStore, StoreError};

fn vector() -> SensorVector {
    SensorVector {
        air_temp: 298.0,
        process_temp: 309.0,
        rotational_speed: 1450.0,
        torque: 42.0,
        tool_wear: 12.0,
    }
}

#[tokio::test]
async fn concurrent_predictions_for_one_reading_yield_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let device = store.upsert_device("press-7", None).await.unwrap();
    let reading = store.insert_reading(device.id, &vector()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let input = NewPrediction {
            reading_id: reading.id,
            predicted_rul: 75.0,
            failure_label: FailureLabel::Normal,
        };
        handles.push(tokio::spawn(async move {
            store.insert_prediction(&input).await
        }));
    }

    let mut won = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(StoreError::DuplicatePrediction(_)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(duplicates, 7);
    assert!(store.next_unpredicted().await.unwrap().is_none());
}

#[tokio::test]
async fn history_pairs_unpredicted_readings_with_none() {
    let store = MemoryStore::new();
    let device = store.upsert_device("press-7", None).await.unwrap();
    let first = store.insert_reading(device.id, &vector()).await.unwrap();
    store.insert_reading(device.id, &vector()).await.unwrap();
    store
        .insert_prediction(&NewPrediction {
            reading_id: first.id,
            predicted_rul: 30.0,
            failure_label: FailureLabel::Normal,
        })
        .await
        .unwrap();

    let history = store
        .history_for_device(device.id, ReadingWindow::for_history(None))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].prediction.is_some());
    assert!(history[1].prediction.is_none());
}
