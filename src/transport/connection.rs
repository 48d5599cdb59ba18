//! Live connection handle
//!
//! `Connection` models one transport connection and holds the sending side
//! of the channel drained by the connector's send loop. Clones share state,
//! so the connection manager, the offline queue and every subscriber look at
//! the same ready state and listener set.
//!
//! Only the connection manager closes a connection or dispatches inbound
//! frames; everyone else gets the non-destructive half of the API.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closing => 2,
            ReadyState::Closed => 3,
        }
    }
}

/// Callback invoked with the raw text of each inbound frame.
pub type Listener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    sender: UnboundedSender<WsMessage>,
    state: AtomicU8,
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Connection {
    /// Wrap the sender half of a connector's send loop. The `id` is a UUID
    /// used in logs to tell successive connections apart.
    pub fn new(sender: UnboundedSender<WsMessage>, state: ReadyState) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4().to_string(),
                sender,
                state: AtomicU8::new(state.as_u8()),
                next_listener: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open && !self.inner.sender.is_closed()
    }

    /// Queue a text frame on the send loop.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        if !self.is_open() {
            return Err(ChatError::NotOpen);
        }
        let text: String = text.into();
        self.inner
            .sender
            .send(WsMessage::Text(text.into()))
            .map_err(|e| ChatError::Transport(format!("send loop closed: {e}")))
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners().push((id, listener));
        id
    }

    /// Returns `false` if the listener was already gone, e.g. because the
    /// manager cleared it when this connection was replaced.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    pub(crate) fn set_ready_state(&self, state: ReadyState) {
        self.inner.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Invoke every listener with one inbound frame. The listener list is
    /// snapshotted first so callbacks may add or remove listeners.
    pub(crate) fn dispatch(&self, text: &str) {
        let snapshot: Vec<Listener> = self
            .listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(text);
        }
    }

    pub(crate) fn clear_listeners(&self) {
        self.listeners().clear();
    }

    /// Start a graceful close. Idempotent once the connection is closing.
    pub(crate) fn close(&self) {
        match self.ready_state() {
            ReadyState::Closing | ReadyState::Closed => {}
            _ => {
                self.set_ready_state(ReadyState::Closing);
                let _ = self.inner.sender.send(WsMessage::Close(None));
            }
        }
    }

    /// Handle for the connector's own loops so they do not keep the send
    /// channel alive after every real owner has let go.
    pub(crate) fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        // a panicking listener must not wedge the connection
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &self.ready_state())
            .finish()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Clone)]
pub(crate) struct WeakConnection {
    inner: Weak<Inner>,
}

impl WeakConnection {
    pub(crate) fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }

    pub(crate) fn mark_closed(&self) {
        if let Some(connection) = self.upgrade() {
            connection.set_ready_state(ReadyState::Closed);
        }
    }
}

/// What the connector's read loop reports about a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}
