//! CLI for chatwire
//!
//! Subcommands:
//! - `chat`: open a conversation and send stdin lines as messages

use std::sync::{Arc, Mutex};

use chatwire::client::{ListView, MessageComposer, MessageList, SendOutcome};
use chatwire::config::load_config;
use chatwire::manager::{ConnectionManager, EnvToken, ManagerOptions, StaticToken, TokenSource};
use chatwire::persistence::SledStorage;
use chatwire::queue::OfflineQueue;
use chatwire::transport::{InboundEvent, WebSocketConnector};
use chatwire::utils::logging;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "chatwire")]
enum Command {
    /// Chat with one recipient. `/typing` sends a typing signal, `/quit` exits.
    Chat {
        /// Our user id
        #[arg(long)]
        sender: String,
        /// The other participant's user id
        #[arg(long)]
        recipient: String,
        /// Session token; otherwise CHATWIRE_TOKEN is read before each attempt
        #[arg(long)]
        token: Option<String>,
        /// Override the configured WebSocket URL
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cmd = Command::parse();

    match cmd {
        Command::Chat {
            sender,
            recipient,
            token,
            url,
        } => {
            if let Err(e) = run_chat(sender, recipient, token, url).await {
                logging::init("info");
                error!("Chat failed: {}", e);
            }
        }
    }
}

async fn run_chat(
    sender: String,
    recipient: String,
    token: Option<String>,
    url: Option<String>,
) -> chatwire::Result<()> {
    let mut config = load_config()?;
    logging::init(&config.log.level);
    if let Some(url) = url {
        config.transport.url = url;
    }

    let storage = SledStorage::open(&config.queue.path)?;
    let queue = OfflineQueue::new(Arc::new(storage), config.queue.key.clone());
    if !queue.is_empty() {
        info!("{} messages waiting from a previous session", queue.len());
    }

    let tokens: Arc<dyn TokenSource> = match token {
        Some(token) => Arc::new(StaticToken::new(Some(token))),
        None => Arc::new(EnvToken::new("CHATWIRE_TOKEN")),
    };
    let manager = ConnectionManager::new(
        Arc::new(WebSocketConnector),
        tokens,
        queue,
        ManagerOptions::from_settings(&config),
    );

    let list = Arc::new(Mutex::new(MessageList::new(Vec::new())));
    let _subscription = manager.subscribe({
        let list = list.clone();
        Arc::new(move |event: InboundEvent| {
            if let Some(message) = event.chat_message() {
                println!(
                    "[{}] {}: {}",
                    message.timestamp,
                    message.sender_id.as_deref().unwrap_or("?"),
                    message.content
                );
            }
            if let Ok(mut list) = list.lock() {
                list.apply(&event);
            }
        })
    });

    let composer = MessageComposer::new(manager.clone(), sender, recipient);
    manager.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/typing" => {
                        if !composer.notify_typing() {
                            info!("Offline; typing signal dropped");
                        }
                    }
                    text => match composer.send(text) {
                        SendOutcome::Sent(id) => info!("Sent {}", id),
                        SendOutcome::Queued(id) => warn!("Offline; queued {}", id),
                        SendOutcome::Ignored => {}
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }
    }

    if let Ok(list) = list.lock() {
        match list.view() {
            ListView::Empty(placeholder) => info!("{}", placeholder),
            ListView::Messages(messages) => info!("Received {} messages", messages.len()),
        }
    }

    manager.shutdown();
    Ok(())
}
