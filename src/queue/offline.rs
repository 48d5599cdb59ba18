//! Offline queue store
//!
//! The queue is one JSON array of `{id, payload}` entries stored under a
//! single namespaced key. Every operation is a read-modify-write of that
//! value, serialised in-process by a mutex; separate processes sharing the
//! same store race and the last writer wins.
//!
//! Storage failures never reach the caller:
//! - an unreadable or corrupted value loads as an empty queue
//! - a failed write is logged and dropped, so the enqueue still "succeeds"
//!
//! Flush is all-or-nothing: either every entry is handed to an open
//! connection in insertion order and the stored queue is cleared, or nothing
//! is cleared.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::persistence::QueueStorage;
use crate::transport::Connection;
use crate::utils::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    /// The complete envelope, sent verbatim on flush.
    pub payload: Value,
}

/// Where a message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// The sending half of a live connection, as the queue sees it.
pub trait FrameSink {
    fn id(&self) -> &str;
    fn is_open(&self) -> bool;
    fn send_text(&self, text: String) -> Result<()>;
}

impl FrameSink for Connection {
    fn id(&self) -> &str {
        Connection::id(self)
    }

    fn is_open(&self) -> bool {
        Connection::is_open(self)
    }

    fn send_text(&self, text: String) -> Result<()> {
        Connection::send_text(self, text)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for &T {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn send_text(&self, text: String) -> Result<()> {
        (**self).send_text(text)
    }
}

#[derive(Clone)]
pub struct OfflineQueue {
    storage: Arc<dyn QueueStorage>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl OfflineQueue {
    pub fn new(storage: Arc<dyn QueueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current persisted queue; empty on any read or parse failure.
    pub fn load(&self) -> Vec<QueuedMessage> {
        let _guard = self.guard();
        self.load_unlocked()
    }

    /// Replace the persisted queue. Failures are logged, not returned.
    pub fn save(&self, queue: &[QueuedMessage]) {
        let _guard = self.guard();
        self.save_unlocked(queue);
    }

    pub fn enqueue(&self, message: QueuedMessage) {
        let _guard = self.guard();
        let mut queue = self.load_unlocked();
        debug!("Queueing message {} while offline", message.id);
        queue.push(message);
        self.save_unlocked(&queue);
    }

    /// Send `message` live if `current` yields an open connection, otherwise
    /// append it to the queue.
    ///
    /// The choice is made under the queue lock, the same lock a flush holds
    /// while it drains the queue and publishes the connection it flushed to.
    /// A message is therefore either sent live or picked up by that flush.
    pub fn send_or_enqueue<S, F>(&self, message: QueuedMessage, current: F) -> Delivery
    where
        S: FrameSink,
        F: FnOnce() -> Option<S>,
    {
        let _guard = self.guard();

        if let Some(sink) = current().filter(|sink| sink.is_open()) {
            match serde_json::to_string(&message.payload) {
                Ok(text) => match sink.send_text(text) {
                    Ok(()) => return Delivery::Sent,
                    Err(e) => warn!("Live send of {} failed, queueing: {}", message.id, e),
                },
                Err(e) => warn!("Failed to serialize message {}: {}", message.id, e),
            }
        }

        let mut queue = self.load_unlocked();
        debug!("Queueing message {} while offline", message.id);
        queue.push(message);
        self.save_unlocked(&queue);
        Delivery::Queued
    }

    /// Send every queued envelope over `sink` and clear the queue.
    ///
    /// Returns how many envelopes were sent. A sink that is not open leaves
    /// the queue untouched.
    pub fn flush<S: FrameSink>(&self, sink: &S) -> usize {
        self.flush_then(sink, || {})
    }

    /// [`flush`](Self::flush), then run `publish` before releasing the queue
    /// lock.
    pub fn flush_then<S: FrameSink>(&self, sink: &S, publish: impl FnOnce()) -> usize {
        let _guard = self.guard();
        let sent = self.flush_unlocked(sink);
        publish();
        sent
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush_unlocked<S: FrameSink>(&self, sink: &S) -> usize {
        if !sink.is_open() {
            return 0;
        }

        let queue = self.load_unlocked();
        if queue.is_empty() {
            return 0;
        }

        for (sent, entry) in queue.iter().enumerate() {
            let text = match serde_json::to_string(&entry.payload) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize queued message {}: {}", entry.id, e);
                    return sent;
                }
            };
            if let Err(e) = sink.send_text(text) {
                warn!(
                    "Flush interrupted after {} of {} messages: {}",
                    sent,
                    queue.len(),
                    e
                );
                return sent;
            }
        }

        self.save_unlocked(&[]);
        info!("Flushed {} queued messages on {}", queue.len(), sink.id());
        queue.len()
    }

    fn load_unlocked(&self) -> Vec<QueuedMessage> {
        let raw = match self.storage.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Offline queue unreadable, treating as empty: {}", e);
                return Vec::new();
            }
        };

        match parse_queue(&raw) {
            Ok(queue) => queue,
            Err(e) => {
                warn!("Offline queue corrupted, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    fn save_unlocked(&self, queue: &[QueuedMessage]) {
        let raw = match serde_json::to_string(queue) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize offline queue: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.write(&self.key, &raw) {
            warn!("Failed to persist offline queue: {}", e);
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue").field("key", &self.key).finish()
    }
}

fn parse_queue(raw: &str) -> Result<Vec<QueuedMessage>> {
    Ok(serde_json::from_str(raw)?)
}
