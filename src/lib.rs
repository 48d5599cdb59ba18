//! # chatwire
//!
//! `chatwire` is the client-side messaging transport of a parent/teacher
//! chat. It keeps one authenticated WebSocket connection alive, queues
//! messages written while offline and flushes them on reconnect, and fans
//! inbound events out to subscribers.
//!
//! ## Core Modules
//!
//! - `client`: Message composer, message list, and real-time sync subscriptions.
//! - `config`: Loads settings from `config/default` and `CHATWIRE__*` variables.
//! - `manager`: The connection manager: state machine, backoff, and session tokens.
//! - `persistence`: Key/value storage backends (sled and in-memory).
//! - `queue`: The durable offline queue of unsent messages.
//! - `transport`: Wire envelopes, the shared connection handle, and connectors.
//! - `utils`: Error type and logging setup.

pub mod client;
pub mod config;
pub mod manager;
pub mod persistence;
pub mod queue;
pub mod transport;
pub mod utils;

pub use client::{MessageComposer, MessageList, SendOutcome, SyncSubscription};
pub use manager::{ConnectionManager, ConnectionState, ManagerOptions};
pub use queue::OfflineQueue;
pub use utils::{ChatError, Result};
