//! Real-time sync subscriptions
//!
//! A `SyncSubscription` keeps one callback attached to whichever connection
//! the manager currently holds. When the connection is replaced the listener
//! moves to the new one; when the subscription is dropped it is detached.
//! Frames that do not decode as an [`InboundEvent`] never reach the callback.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::manager::ConnectionManager;
use crate::transport::{Connection, InboundEvent, Listener, ListenerId};

pub type OnEvent = Arc<dyn Fn(InboundEvent) + Send + Sync>;

type Attached = Arc<Mutex<Option<(Connection, ListenerId)>>>;

pub struct SyncSubscription {
    attached: Attached,
    task: Option<JoinHandle<()>>,
}

impl SyncSubscription {
    /// Attach `on_event` to the current connection and follow replacements.
    /// Must be called from within a tokio runtime.
    pub fn attach(manager: &ConnectionManager, on_event: OnEvent) -> Self {
        let mut connections = manager.watch_connection();
        let listener = decoding_listener(on_event);
        let attached: Attached = Arc::new(Mutex::new(None));

        let initial = connections.borrow_and_update().clone();
        reattach(&attached, initial, &listener);

        let task = tokio::spawn({
            let attached = attached.clone();
            async move {
                while connections.changed().await.is_ok() {
                    let next = connections.borrow_and_update().clone();
                    reattach(&attached, next, &listener);
                }
                reattach(&attached, None, &listener);
            }
        });

        Self {
            attached,
            task: Some(task),
        }
    }

    /// Whether the callback is attached to a connection right now.
    pub fn is_attached(&self) -> bool {
        lock(&self.attached).is_some()
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some((connection, id)) = lock(&self.attached).take() {
            connection.remove_listener(id);
        }
    }
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for SyncSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSubscription")
            .field("attached", &self.is_attached())
            .finish()
    }
}

fn decoding_listener(on_event: OnEvent) -> Listener {
    Arc::new(move |text: &str| match InboundEvent::parse(text) {
        Ok(event) => on_event(event),
        Err(e) => warn!("Dropping malformed inbound frame: {}", e),
    })
}

fn reattach(attached: &Attached, next: Option<Connection>, listener: &Listener) {
    let mut slot = lock(attached);
    if let Some((current, id)) = slot.take() {
        if next.as_ref() == Some(&current) {
            *slot = Some((current, id));
            return;
        }
        current.remove_listener(id);
    }
    if let Some(connection) = next {
        debug!("Sync listener attached to connection {}", connection.id());
        let id = connection.add_listener(listener.clone());
        *slot = Some((connection, id));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
