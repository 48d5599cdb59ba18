use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::manager::ConnectionManager;
use crate::queue::{Delivery, QueuedMessage};
use crate::transport::{Envelope, OutgoingMessage, TypingSignal};

/// What happened to a `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank text, or the same text is already being sent.
    Ignored,
    /// Written to the live connection.
    Sent(String),
    /// Stored in the offline queue for the next open connection.
    Queued(String),
}

/// Builds `new_message` envelopes for one conversation and routes them to
/// the live connection or the offline queue.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    manager: ConnectionManager,
    sender_id: String,
    recipient_id: String,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl MessageComposer {
    pub fn new(
        manager: ConnectionManager,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn send(&self, text: &str) -> SendOutcome {
        let content = text.trim();
        if content.is_empty() {
            return SendOutcome::Ignored;
        }
        let Some(_pending) = PendingSend::claim(&self.pending, content) else {
            debug!("Send of identical text already in progress");
            return SendOutcome::Ignored;
        };

        let message = OutgoingMessage {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            sender_id: self.sender_id.clone(),
            recipient_id: self.recipient_id.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let id = message.id.clone();
        let envelope = Envelope::NewMessage(message);

        let payload = match serde_json::to_value(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize message {}: {}", id, e);
                return SendOutcome::Ignored;
            }
        };
        let message = QueuedMessage {
            id: id.clone(),
            payload,
        };

        match self
            .manager
            .queue()
            .send_or_enqueue(message, || self.manager.current())
        {
            Delivery::Sent => SendOutcome::Sent(id),
            Delivery::Queued => SendOutcome::Queued(id),
        }
    }

    /// Hold `text` as in flight, as a concurrent `send` would.
    #[cfg(test)]
    pub(crate) fn claim_pending(&self, text: &str) -> Option<PendingSend<'_>> {
        PendingSend::claim(&self.pending, text.trim())
    }

    /// Tell the recipient we are typing. Dropped unless the connection is
    /// open; returns whether the signal went out.
    pub fn notify_typing(&self) -> bool {
        let Some(connection) = self.manager.current().filter(|c| c.is_open()) else {
            return false;
        };
        let envelope = Envelope::Typing(TypingSignal {
            sender_id: self.sender_id.clone(),
        });
        match serde_json::to_string(&envelope) {
            Ok(text) => connection.send_text(text).is_ok(),
            Err(_) => false,
        }
    }
}

/// Marks one trimmed text as in flight until dropped.
pub(crate) struct PendingSend<'a> {
    set: &'a Mutex<HashSet<String>>,
    content: String,
}

impl<'a> PendingSend<'a> {
    fn claim(set: &'a Mutex<HashSet<String>>, content: &str) -> Option<Self> {
        let mut pending = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !pending.insert(content.to_string()) {
            return None;
        }
        Some(Self {
            set,
            content: content.to_string(),
        })
    }
}

impl Drop for PendingSend<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.content);
    }
}
