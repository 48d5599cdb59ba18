use super::message::{ChatMessage, Envelope, InboundEvent, MessageId, OutgoingMessage, TypingSignal};
use super::{Connection, Connector, MemoryConnector, ReadyState, TransportEvent, resolve_endpoint};
use crate::utils::ChatError;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

#[test]
fn new_message_envelope_matches_wire_format() {
    let envelope = Envelope::NewMessage(OutgoingMessage {
        id: "m-1".to_string(),
        content: "hello".to_string(),
        sender_id: "parent-7".to_string(),
        recipient_id: "teacher-3".to_string(),
        timestamp: "2024-01-01T08:00:00.000Z".to_string(),
    });

    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "new_message",
            "payload": {
                "id": "m-1",
                "content": "hello",
                "senderId": "parent-7",
                "recipientId": "teacher-3",
                "timestamp": "2024-01-01T08:00:00.000Z"
            }
        })
    );
}

#[test]
fn typing_envelope_matches_wire_format() {
    let envelope = Envelope::Typing(TypingSignal {
        sender_id: "parent-7".to_string(),
    });
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value, json!({"type": "typing", "payload": {"senderId": "parent-7"}}));
}

#[test]
fn inbound_event_requires_string_type() {
    assert!(InboundEvent::parse("not json").is_err());
    assert!(InboundEvent::parse("42").is_err());
    assert!(InboundEvent::parse(r#"{"payload": {}}"#).is_err());
    assert!(InboundEvent::parse(r#"{"type": 5}"#).is_err());

    let event = InboundEvent::parse(r#"{"type": "presence"}"#).unwrap();
    assert_eq!(event.kind, "presence");
    assert!(event.payload.is_null());
    assert!(event.chat_message().is_none());
}

#[test]
fn chat_message_accepts_legacy_field_names() {
    let event = InboundEvent::parse(
        r#"{"type":"new_message","payload":{"id":17,"content":"hi","sender":"teacher-3","sentAt":"2024-01-02T10:00:00Z"}}"#,
    )
    .unwrap();

    let msg = event.chat_message().expect("chat message");
    assert_eq!(msg.id, MessageId::Number(17.into()));
    assert_eq!(msg.sender_id.as_deref(), Some("teacher-3"));
    assert_eq!(msg.timestamp, "2024-01-02T10:00:00Z");
    assert_eq!(msg.recipient_id, None);
}

#[test]
fn chat_message_with_both_timestamp_spellings_prefers_timestamp() {
    let event = InboundEvent::parse(
        r#"{"type":"new_message","payload":{"id":"a","content":"x","timestamp":"2024-01-01T00:00:00Z","sentAt":"2023-12-31T00:00:00Z","sender":"old","senderId":"new"}}"#,
    )
    .unwrap();

    let msg = event.chat_message().expect("chat message");
    assert_eq!(msg.timestamp, "2024-01-01T00:00:00Z");
    assert_eq!(msg.sender_id.as_deref(), Some("new"));
}

#[test]
fn chat_message_accepts_non_integer_ids() {
    let event = InboundEvent::parse(
        r#"{"type":"new_message","payload":{"id":1.5,"content":"x","timestamp":"2024-01-01T00:00:00Z"}}"#,
    )
    .unwrap();

    let msg = event.chat_message().expect("chat message");
    assert_eq!(msg.id.to_string(), "1.5");
}

#[test]
fn chat_message_without_any_timestamp_is_rejected() {
    let event =
        InboundEvent::parse(r#"{"type":"new_message","payload":{"id":"a","content":"x"}}"#).unwrap();
    assert!(event.chat_message().is_none());
}

#[test]
fn outgoing_message_converts_to_chat_message() {
    let msg: ChatMessage = OutgoingMessage {
        id: "m-2".to_string(),
        content: "see you".to_string(),
        sender_id: "a".to_string(),
        recipient_id: "b".to_string(),
        timestamp: "2024-01-01T00:00:00.000Z".to_string(),
    }
    .into();
    assert_eq!(msg.id, MessageId::from("m-2"));
    assert_eq!(msg.id.to_string(), "m-2");
}

#[test]
fn resolve_endpoint_appends_token() {
    let url = resolve_endpoint("wss://chat.example.org/ws?room=5", "token", "abc 123").unwrap();
    assert_eq!(url.as_str(), "wss://chat.example.org/ws?room=5&token=abc+123");
}

#[test]
fn resolve_endpoint_rejects_bad_urls() {
    assert!(matches!(
        resolve_endpoint("::nope::", "token", "t"),
        Err(ChatError::Endpoint(_))
    ));
    assert!(matches!(
        resolve_endpoint("https://chat.example.org", "token", "t"),
        Err(ChatError::Transport(_))
    ));
}

#[test]
fn send_requires_open_connection() {
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection = Connection::new(tx, ReadyState::Connecting);
    assert!(matches!(connection.send_text("x"), Err(ChatError::NotOpen)));

    connection.set_ready_state(ReadyState::Open);
    connection.send_text("x").unwrap();
    assert_eq!(rx.try_recv().unwrap(), WsMessage::Text("x".into()));

    connection.close();
    assert_eq!(connection.ready_state(), ReadyState::Closing);
    assert!(rx.try_recv().unwrap().is_close());
    // a second close does not send another frame
    connection.close();
    assert!(rx.try_recv().is_err());
}

#[test]
fn send_fails_once_send_loop_is_gone() {
    let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection = Connection::new(tx, ReadyState::Open);
    drop(rx);
    assert!(!connection.is_open());
    assert!(connection.send_text("x").is_err());
}

#[test]
fn listeners_are_added_dispatched_and_removed() {
    let (tx, _rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection = Connection::new(tx, ReadyState::Open);
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    let id = connection.add_listener(Arc::new(move |_text: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    connection.dispatch("one");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(connection.remove_listener(id));
    assert!(!connection.remove_listener(id));
    connection.dispatch("two");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn memory_connector_records_attempts_and_peers() {
    let connector = MemoryConnector::new();
    let endpoint = resolve_endpoint("ws://localhost/ws", "token", "t1").unwrap();

    connector.set_failing(true);
    assert!(connector.connect(&endpoint).await.is_err());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(connector.opened(), 0);

    connector.set_failing(false);
    let mut link = connector.connect(&endpoint).await.unwrap();
    assert_eq!(connector.attempts(), 2);
    assert_eq!(connector.endpoints()[1].as_str(), "ws://localhost/ws?token=t1");

    let peer = connector.last_peer().unwrap();
    link.connection.send_text("ping").unwrap();
    assert_eq!(peer.sent_text(), vec!["ping".to_string()]);

    peer.push_text("pong");
    assert_eq!(
        link.events.recv().await,
        Some(TransportEvent::Message("pong".to_string()))
    );

    peer.close();
    assert!(matches!(
        link.events.recv().await,
        Some(TransportEvent::Closed { code: Some(1001), .. })
    ));
    assert!(!link.connection.is_open());
}
