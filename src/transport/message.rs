//! Wire envelopes exchanged over the live connection.
//!
//! Every frame is a JSON text frame of the shape `{"type": ..., "payload": ...}`.
//! Outbound frames are built from [`Envelope`]; inbound frames are only
//! required to carry a string `type`, so they are decoded into the looser
//! [`InboundEvent`] and consumers pick the kinds they understand.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::warn;

pub const NEW_MESSAGE: &str = "new_message";
pub const TYPING: &str = "typing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Envelope {
    #[serde(rename = "new_message")]
    NewMessage(OutgoingMessage),

    #[serde(rename = "typing")]
    Typing(TypingSignal),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub recipient_id: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub sender_id: String,
}

/// Any inbound frame. `payload` is left untyped until a consumer asks for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl InboundEvent {
    /// Decode raw frame text. Fails for anything that is not a JSON object
    /// with a string `type`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn is_new_message(&self) -> bool {
        self.kind == NEW_MESSAGE
    }

    /// The payload as a chat message, if this is a `new_message` event
    /// carrying a well-formed one.
    pub fn chat_message(&self) -> Option<ChatMessage> {
        if !self.is_new_message() {
            return None;
        }
        match serde_json::from_value(self.payload.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Dropping malformed new_message payload: {}", e);
                None
            }
        }
    }
}

/// Message ids arrive as strings from clients and as numbers from some
/// server-side stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Text(String),
    Number(Number),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Text(id) => f.write_str(id),
            MessageId::Number(id) => write!(f, "{id}"),
        }
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId::Text(id.to_string())
    }
}

/// A chat message as displayed by the client.
///
/// Decoding accepts the older `sender` and `sentAt` keys; when a payload
/// carries both spellings the current one wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireChatMessage")]
pub struct ChatMessage {
    pub id: MessageId,
    pub content: String,
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub timestamp: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChatMessage {
    id: MessageId,
    content: String,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    sent_at: Option<String>,
}

impl TryFrom<WireChatMessage> for ChatMessage {
    type Error = String;

    fn try_from(wire: WireChatMessage) -> Result<Self, Self::Error> {
        let timestamp = wire
            .timestamp
            .or(wire.sent_at)
            .ok_or_else(|| "missing field `timestamp`".to_string())?;
        Ok(Self {
            id: wire.id,
            content: wire.content,
            sender_id: wire.sender_id.or(wire.sender),
            recipient_id: wire.recipient_id,
            timestamp,
        })
    }
}

impl From<OutgoingMessage> for ChatMessage {
    fn from(msg: OutgoingMessage) -> Self {
        Self {
            id: MessageId::Text(msg.id),
            content: msg.content,
            sender_id: Some(msg.sender_id),
            recipient_id: Some(msg.recipient_id),
            timestamp: msg.timestamp,
        }
    }
}
