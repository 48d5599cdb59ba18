//! In-process loopback transport.
//!
//! `MemoryConnector` stands in for a chat server in tests and demos. It keeps
//! a record of every connect attempt, can be told to refuse connections, can
//! hold attempts until released, and hands out a [`MemoryPeer`] for each
//! connection it opens so the other side can be driven by hand.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::transport::connection::{Connection, ReadyState, TransportEvent};
use crate::transport::{Connector, Link};
use crate::utils::{ChatError, Result};

#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    attempts: AtomicUsize,
    failing: AtomicBool,
    endpoints: Mutex<Vec<Url>>,
    peers: Mutex<Vec<MemoryPeer>>,
    gate: watch::Sender<bool>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(MemoryInner {
                attempts: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                endpoints: Mutex::new(Vec::new()),
                peers: Mutex::new(Vec::new()),
                gate,
            }),
        }
    }

    /// Refuse every following attempt until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Park new attempts until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Number of `connect` calls seen so far, including refused ones.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<Url> {
        lock(&self.inner.endpoints).clone()
    }

    /// Number of connections actually opened.
    pub fn opened(&self) -> usize {
        lock(&self.inner.peers).len()
    }

    pub fn peer(&self, index: usize) -> Option<MemoryPeer> {
        lock(&self.inner.peers).get(index).cloned()
    }

    pub fn last_peer(&self) -> Option<MemoryPeer> {
        lock(&self.inner.peers).last().cloned()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Link> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.endpoints).push(endpoint.clone());

        let mut gate = self.inner.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(ChatError::Transport("memory connector dropped".to_string()));
        }

        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(ChatError::Transport(format!(
                "connection refused: {endpoint}"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let connection = Connection::new(tx, ReadyState::Open);
        let peer = MemoryPeer {
            connection: connection.clone(),
            outbound: Arc::new(Mutex::new(rx)),
            received: Arc::new(Mutex::new(Vec::new())),
            events: event_tx,
        };
        lock(&self.inner.peers).push(peer);

        Ok(Link {
            connection,
            events: event_rx,
        })
    }
}

/// The server side of one in-memory connection.
#[derive(Clone)]
pub struct MemoryPeer {
    connection: Connection,
    outbound: Arc<Mutex<UnboundedReceiver<WsMessage>>>,
    received: Arc<Mutex<Vec<WsMessage>>>,
    events: UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    pub fn connection_id(&self) -> String {
        self.connection.id().to_string()
    }

    /// Every text frame the client has sent on this connection so far.
    pub fn sent_text(&self) -> Vec<String> {
        self.drain();
        lock(&self.received)
            .iter()
            .filter_map(|msg| match msg {
                WsMessage::Text(text) => Some(text.as_str().to_owned()),
                _ => None,
            })
            .collect()
    }

    /// Whether the client has sent a close frame.
    pub fn close_requested(&self) -> bool {
        self.drain();
        lock(&self.received).iter().any(|msg| msg.is_close())
    }

    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Message(text.into()));
    }

    /// Simulate the server dropping the connection.
    pub fn close(&self) {
        self.connection.set_ready_state(ReadyState::Closed);
        let _ = self.events.send(TransportEvent::Closed {
            code: Some(1001),
            reason: "going away".to_string(),
        });
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(reason.into()));
    }

    fn drain(&self) {
        let mut outbound = lock(&self.outbound);
        let mut received = lock(&self.received);
        while let Ok(msg) = outbound.try_recv() {
            if msg.is_close() {
                self.connection.set_ready_state(ReadyState::Closed);
            }
            received.push(msg);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
