use chatwire::client::{MessageComposer, MessageList, SendOutcome};
use chatwire::manager::{ConnectionManager, ConnectionState, ManagerOptions, SessionTokens};
use chatwire::persistence::{MemoryStorage, SledStorage};
use chatwire::queue::OfflineQueue;
use chatwire::transport::{InboundEvent, MemoryConnector};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn memory_queue() -> OfflineQueue {
    OfflineQueue::new(Arc::new(MemoryStorage::new()), "chatwire:offline-queue")
}

fn spawn_manager(
    connector: &MemoryConnector,
    tokens: &SessionTokens,
    queue: OfflineQueue,
) -> ConnectionManager {
    ConnectionManager::new(
        Arc::new(connector.clone()),
        Arc::new(tokens.clone()),
        queue,
        ManagerOptions::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn messages_written_offline_are_delivered_in_order_on_reconnect() {
    let connector = MemoryConnector::new();
    connector.set_failing(true);
    let tokens = SessionTokens::new(Some("parent-token".to_string()));
    let manager = spawn_manager(&connector, &tokens, memory_queue());
    let composer = MessageComposer::new(manager.clone(), "parent-7", "teacher-3");

    manager.start();
    assert!(manager.wait_for_state(ConnectionState::Reconnecting).await);

    let mut ids = Vec::new();
    for text in ["first", "second", "third"] {
        match composer.send(text) {
            SendOutcome::Queued(id) => ids.push(id),
            other => panic!("expected queued, got {other:?}"),
        }
    }
    assert_eq!(manager.queue().len(), 3);

    connector.set_failing(false);
    assert!(manager.wait_for_state(ConnectionState::Open).await);

    let delivered: Vec<String> = connector
        .last_peer()
        .unwrap()
        .sent_text()
        .iter()
        .map(|frame| {
            let value: Value = serde_json::from_str(frame).unwrap();
            value["payload"]["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(delivered, ids);
    assert!(manager.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn queue_written_by_a_previous_session_is_flushed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();

    let mut first_session = {
        let queue = OfflineQueue::new(Arc::new(SledStorage::open(&path).unwrap()), "q");
        let connector = MemoryConnector::new();
        let tokens = SessionTokens::new(None);
        let manager = spawn_manager(&connector, &tokens, queue);
        let composer = MessageComposer::new(manager.clone(), "parent-7", "teacher-3");
        assert!(matches!(composer.send("left behind"), SendOutcome::Queued(_)));
        manager.watch_state()
    };
    // wait for the first driver to exit and release the database
    while first_session.changed().await.is_ok() {}

    let queue = OfflineQueue::new(Arc::new(SledStorage::open(&path).unwrap()), "q");
    let connector = MemoryConnector::new();
    let tokens = SessionTokens::new(Some("tok".to_string()));
    let manager = spawn_manager(&connector, &tokens, queue);
    manager.start();
    assert!(manager.wait_for_state(ConnectionState::Open).await);

    let frames = connector.last_peer().unwrap().sent_text();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("left behind"));
    assert!(manager.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_eight_attempts() {
    let connector = MemoryConnector::new();
    connector.set_failing(true);
    let tokens = SessionTokens::new(Some("tok".to_string()));
    let manager = spawn_manager(&connector, &tokens, memory_queue());

    let started = Instant::now();
    manager.start();
    assert!(manager.wait_for_state(ConnectionState::Stopped).await);

    // the initial attempt plus eight retries, 1+2+4+8+16+30+30+30 seconds apart
    assert_eq!(connector.attempts(), 9);
    assert_eq!(started.elapsed(), Duration::from_secs(121));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempts(), 9);

    // a fresh login starts over
    connector.set_failing(false);
    manager.auth_changed(Some("fresh".to_string()));
    assert!(manager.wait_for_state(ConnectionState::Open).await);
    assert_eq!(connector.attempts(), 10);
}

#[tokio::test(start_paused = true)]
async fn logout_during_backoff_cancels_the_retry() {
    let connector = MemoryConnector::new();
    connector.set_failing(true);
    let tokens = SessionTokens::new(Some("tok".to_string()));
    let manager = spawn_manager(&connector, &tokens, memory_queue());

    manager.start();
    assert!(manager.wait_for_state(ConnectionState::Reconnecting).await);

    tokens.set(None);
    manager.auth_changed(None);
    assert!(manager.wait_for_state(ConnectionState::Idle).await);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(manager.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn only_one_connect_attempt_is_in_flight() {
    let connector = MemoryConnector::new();
    connector.hold();
    let tokens = SessionTokens::new(Some("tok".to_string()));
    let manager = spawn_manager(&connector, &tokens, memory_queue());

    manager.start();
    assert!(manager.wait_for_state(ConnectionState::Connecting).await);
    manager.start();
    // a token refresh mid-attempt waits for the attempt to settle
    manager.auth_changed(Some("tok".to_string()));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.attempts(), 1);

    connector.release();
    assert!(manager.wait_for_state(ConnectionState::Open).await);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.opened(), 1);
    assert_eq!(manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn new_token_during_connect_reconnects_once_after_the_attempt() {
    let connector = MemoryConnector::new();
    connector.hold();
    let tokens = SessionTokens::new(Some("first".to_string()));
    let manager = spawn_manager(&connector, &tokens, memory_queue());

    manager.start();
    assert!(manager.wait_for_state(ConnectionState::Connecting).await);

    tokens.set(Some("second".to_string()));
    manager.auth_changed(Some("second".to_string()));
    tokio::time::sleep(Duration::from_secs(5)).await;
    // parked until the held attempt settles
    assert_eq!(connector.attempts(), 1);
    assert_eq!(connector.opened(), 0);

    connector.release();
    let mut connection = manager.watch_connection();
    connection
        .wait_for(|current| current.is_some() && connector.opened() == 2)
        .await
        .unwrap();
    assert!(manager.wait_for_state(ConnectionState::Open).await);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(connector.attempts(), 2);
    assert_eq!(connector.opened(), 2);
    let first = connector.peer(0).unwrap();
    assert!(first.close_requested());
    assert!(connector.endpoints()[0].as_str().ends_with("token=first"));
    assert!(connector.endpoints()[1].as_str().ends_with("token=second"));
    assert_eq!(
        manager.current().unwrap().id(),
        connector.peer(1).unwrap().connection_id()
    );
    assert_eq!(manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn inbound_messages_reach_the_list_in_timestamp_order() {
    let connector = MemoryConnector::new();
    let tokens = SessionTokens::new(Some("tok".to_string()));
    let manager = spawn_manager(&connector, &tokens, memory_queue());
    manager.start();
    assert!(manager.wait_for_state(ConnectionState::Open).await);

    let list = Arc::new(Mutex::new(MessageList::default()));
    let _subscription = manager.subscribe({
        let list = list.clone();
        Arc::new(move |event: InboundEvent| {
            list.lock().unwrap().apply(&event);
        })
    });

    let peer = connector.last_peer().unwrap();
    peer.push_text(
        r#"{"type":"new_message","payload":{"id":"b","content":"later","timestamp":"2024-01-02T00:00:00Z"}}"#,
    );
    peer.push_text("garbage");
    peer.push_text(
        r#"{"type":"new_message","payload":{"id":"a","content":"earlier","timestamp":"2024-01-01T00:00:00Z"}}"#,
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    let list = list.lock().unwrap();
    let contents: Vec<&str> = list.sorted().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["earlier", "later"]);
}
