//! Unit tests for `WsManager`, without any HTTP upgrade.

use axum::extract::ws::Message;
use fleetpulse_api::ws::WsManager;

// ---------------------------------------------------------------------------
// Test: add() and remove() track the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();
    assert_eq!(manager.connection_count().await, 0);

    let _rx1 = manager.add("conn-1".to_string()).await;
    let _rx2 = manager.add("conn-2".to_string()).await;
    assert_eq!(manager.connection_count().await, 2);

    manager.remove("conn-1").await;
    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;

    manager.shutdown_all().await;
    assert_eq!(manager.connection_count().await, 0);

    let msg1 = rx1.recv().await.expect("rx1 should receive Close");
    assert!(matches!(msg1, Message::Close(None)), "got: {msg1:?}");
    let msg2 = rx2.recv().await.expect("rx2 should receive Close");
    assert!(matches!(msg2, Message::Close(None)), "got: {msg2:?}");

    assert!(rx1.recv().await.is_none(), "Channel should be closed after shutdown");
}

// ---------------------------------------------------------------------------
// Test: broadcast() reaches every connection and reports the count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_sends_to_all_connections() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;

    let delivered = manager.broadcast(Message::Text("hello everyone".into())).await;
    assert_eq!(delivered, 2);

    let msg1 = rx1.recv().await.unwrap();
    let msg2 = rx2.recv().await.unwrap();
    assert!(matches!(&msg1, Message::Text(t) if *t == "hello everyone"));
    assert!(matches!(&msg2, Message::Text(t) if *t == "hello everyone"));
}

// ---------------------------------------------------------------------------
// Test: broadcast() prunes closed channels without affecting others
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_prunes_closed_channels() {
    let manager = WsManager::new();

    let rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;
    drop(rx1);

    let delivered = manager.broadcast(Message::Text("still alive".into())).await;
    assert_eq!(delivered, 1);
    assert_eq!(manager.connection_count().await, 1);

    let msg = rx2.recv().await.unwrap();
    assert!(matches!(&msg, Message::Text(t) if *t == "still alive"));
}

// ---------------------------------------------------------------------------
// Test: send_to() targets one connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_targets_single_connection() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;

    assert!(manager.send_to("conn-2", Message::Text("only you".into())).await);
    assert!(!manager.send_to("conn-9", Message::Text("nobody".into())).await);

    let msg = rx2.recv().await.unwrap();
    assert!(matches!(&msg, Message::Text(t) if *t == "only you"));
    assert!(rx1.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: adding with duplicate ID replaces the previous connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_id_replaces_previous_connection() {
    let manager = WsManager::new();

    let _rx_old = manager.add("conn-1".to_string()).await;
    let mut rx_new = manager.add("conn-1".to_string()).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.broadcast(Message::Text("replaced".into())).await;
    let msg = rx_new.recv().await.unwrap();
    assert!(matches!(&msg, Message::Text(t) if *t == "replaced"));
}
