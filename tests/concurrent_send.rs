use chatwire::client::{MessageComposer, SendOutcome};
use chatwire::manager::{ConnectionManager, ConnectionState, ManagerOptions, SessionTokens};
use chatwire::persistence::MemoryStorage;
use chatwire::queue::OfflineQueue;
use chatwire::transport::MemoryConnector;
use std::sync::Arc;

const ROUNDS: usize = 200;
const MESSAGES: usize = 5;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sends_racing_the_reconnect_flush_are_never_left_queued() {
    for round in 0..ROUNDS {
        let connector = MemoryConnector::new();
        connector.hold();
        let manager = ConnectionManager::new(
            Arc::new(connector.clone()),
            Arc::new(SessionTokens::new(Some("tok".to_string()))),
            OfflineQueue::new(Arc::new(MemoryStorage::new()), "q"),
            ManagerOptions::default(),
        );
        manager.start();
        assert!(manager.wait_for_state(ConnectionState::Connecting).await);

        let composer = MessageComposer::new(manager.clone(), "parent-7", "teacher-3");
        let sender = tokio::task::spawn_blocking(move || {
            (0..MESSAGES)
                .map(|i| composer.send(&format!("round message {i}")))
                .collect::<Vec<_>>()
        });
        connector.release();

        let outcomes = sender.await.unwrap();
        assert!(manager.wait_for_state(ConnectionState::Open).await);
        assert!(
            outcomes.iter().all(|o| !matches!(o, SendOutcome::Ignored)),
            "round {round}: {outcomes:?}"
        );

        assert!(
            manager.queue().is_empty(),
            "round {round}: message still queued while open"
        );
        assert_eq!(
            connector.last_peer().unwrap().sent_text().len(),
            MESSAGES,
            "round {round}"
        );
        manager.shutdown();
    }
}
