//! The `transport` module is responsible for the live connection to the chat
//! server.
//!
//! It defines the JSON envelopes exchanged over the wire, the shared
//! `Connection` handle, and the `Connector` seam with a WebSocket
//! implementation and an in-memory one.

pub mod connection;
pub mod memory;
pub mod message;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use crate::utils::{ChatError, Result};

pub use connection::{Connection, Listener, ListenerId, ReadyState, TransportEvent};
pub use memory::{MemoryConnector, MemoryPeer};
pub use message::{ChatMessage, Envelope, InboundEvent, MessageId, OutgoingMessage, TypingSignal};
pub use websocket::WebSocketConnector;

/// An opened connection plus the stream of events its read loop reports.
pub struct Link {
    pub connection: Connection,
    pub events: UnboundedReceiver<TransportEvent>,
}

/// Opens transport connections. The connection manager is the only caller.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Url) -> Result<Link>;
}

/// Build the connection URL: the configured base plus the session token as a
/// query parameter.
pub fn resolve_endpoint(base: &str, token_param: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(ChatError::Transport(format!(
                "unsupported scheme '{other}' in {base}"
            )));
        }
    }
    url.query_pairs_mut().append_pair(token_param, token);
    Ok(url)
}

#[cfg(test)]
mod tests;
