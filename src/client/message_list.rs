//! Time-ordered message list
//!
//! Seeded from a snapshot (e.g. history fetched over HTTP) and fed live
//! `new_message` events. Order is ascending by the `timestamp` string, which
//! sorts correctly for ISO-8601 UTC values; ties keep arrival order.

use crate::transport::{ChatMessage, InboundEvent};

pub const DEFAULT_PLACEHOLDER: &str = "No messages yet";

#[derive(Debug, Clone)]
pub struct MessageList {
    messages: Vec<ChatMessage>,
    placeholder: String,
}

/// What to render.
#[derive(Debug, PartialEq)]
pub enum ListView<'a> {
    Empty(&'a str),
    Messages(Vec<&'a ChatMessage>),
}

impl MessageList {
    pub fn new(initial: impl IntoIterator<Item = ChatMessage>) -> Self {
        let mut list = Self {
            messages: Vec::new(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        };
        for message in initial {
            list.merge(message);
        }
        list.resort();
        list
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Fold one inbound event into the list. Returns `true` if it was a
    /// well-formed `new_message`.
    pub fn apply(&mut self, event: &InboundEvent) -> bool {
        match event.chat_message() {
            Some(message) => {
                self.insert(message);
                true
            }
            None => false,
        }
    }

    /// Add a message, replacing any earlier one with the same id.
    pub fn insert(&mut self, message: ChatMessage) {
        self.merge(message);
        self.resort();
    }

    pub fn sorted(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn view(&self) -> ListView<'_> {
        if self.messages.is_empty() {
            ListView::Empty(&self.placeholder)
        } else {
            ListView::Messages(self.messages.iter().collect())
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn merge(&mut self, message: ChatMessage) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }

    fn resort(&mut self) {
        self.messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }
}

impl Default for MessageList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
