//! WebSocket transport
//!
//! Client-side counterpart of a chat socket. Responsibilities:
//! - Open the WebSocket with `connect_async`
//! - Split the stream into a send loop fed by the `Connection` channel and a
//!   read loop that reports frames as `TransportEvent`s
//! - Mark the `Connection` closed when either loop ends

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::transport::connection::{Connection, ReadyState, TransportEvent};
use crate::transport::{Connector, Link};
use crate::utils::Result;

#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Link> {
        let (ws_stream, _response) = connect_async(endpoint.as_str()).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let connection = Connection::new(tx, ReadyState::Open);
        let id = connection.id().to_string();

        {
            let handle = connection.downgrade();
            let id = id.clone();
            let event_tx = event_tx.clone();
            spawn(async move {
                while let Some(msg) = rx.recv().await {
                    let closing = msg.is_close();
                    if let Err(e) = ws_sender.send(msg).await {
                        warn!("Failed to send frame on {}: {}", id, e);
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                handle.mark_closed();
                debug!("Send loop closed for {}", id);
            });
        }

        {
            let handle = connection.downgrade();
            spawn(async move {
                let mut reported = false;
                while let Some(frame) = ws_receiver.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => {
                            let _ = event_tx.send(TransportEvent::Message(text.as_str().to_owned()));
                        }
                        Ok(WsMessage::Close(frame)) => {
                            let (code, reason) = match frame {
                                Some(frame) => {
                                    (Some(u16::from(frame.code)), frame.reason.as_str().to_owned())
                                }
                                None => (None, String::new()),
                            };
                            let _ = event_tx.send(TransportEvent::Closed { code, reason });
                            reported = true;
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                            reported = true;
                            break;
                        }
                    }
                }
                if !reported {
                    let _ = event_tx.send(TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                }
                handle.mark_closed();
                debug!("Read loop closed for {}", id);
            });
        }

        Ok(Link {
            connection,
            events: event_rx,
        })
    }
}
