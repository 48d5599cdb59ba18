//! Connection manager engine
//!
//! `ConnectionManager` is a cheap clonable handle. All connection state is
//! owned by one background driver task that reacts to four kinds of input,
//! one at a time:
//! - commands from the handle (mount, auth change, shutdown)
//! - the completion of the single in-flight connect attempt
//! - events from the live connection's read loop
//! - the single pending backoff timer
//!
//! The driver publishes the state and the current connection on `watch`
//! channels. Readers get clones of the `Connection`, which only expose
//! sending and listener registration; opening, closing and dispatching stay
//! with the driver.
//!
//! Ordering notes:
//! - an auth change that arrives while an attempt is in flight is parked and
//!   replayed once the attempt settles
//! - on open, the offline queue is flushed and the connection published
//!   under one queue lock, before the `Open` state becomes visible
//! - listeners registered on a connection are cleared when it is replaced

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::{OnEvent, SyncSubscription};
use crate::config::Settings;
use crate::manager::auth::{TokenSource, normalize};
use crate::manager::backoff::Backoff;
use crate::manager::state::{Action, ConnectionState, StateMachine, Trigger};
use crate::queue::OfflineQueue;
use crate::transport::{Connection, Connector, Link, TransportEvent, resolve_endpoint};
use crate::utils::ChatError;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Base WebSocket URL; the token is appended per attempt.
    pub endpoint: String,
    pub token_param: String,
    pub backoff: Backoff,
}

impl ManagerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            endpoint: settings.transport.url.clone(),
            token_param: settings.transport.token_param.clone(),
            backoff: Backoff::from_settings(&settings.reconnect),
        }
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    AuthChanged(Option<String>),
    Shutdown,
}

#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    connection: watch::Receiver<Option<Connection>>,
    queue: OfflineQueue,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // last handle gone: same as unmount
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl ConnectionManager {
    /// Spawn the driver. It stays `Idle` until [`start`](Self::start) or an
    /// auth change. Must be called from within a tokio runtime.
    pub fn new(
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenSource>,
        queue: OfflineQueue,
        options: ManagerOptions,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (connection_tx, connection_rx) = watch::channel(None);

        let driver = Driver {
            connector,
            tokens,
            queue: queue.clone(),
            endpoint: options.endpoint,
            token_param: options.token_param,
            machine: StateMachine::new(options.backoff),
            initial_attempt: true,
            live: None,
            events: None,
            attempt: None,
            retry_at: None,
            deferred_auth: None,
            commands: command_rx,
            state_tx,
            connection_tx,
        };
        tokio::spawn(driver.run());

        Self {
            shared: Arc::new(Shared {
                commands: command_tx,
                state: state_rx,
                connection: connection_rx,
                queue,
            }),
        }
    }

    /// Begin connecting (the "mount" signal). Ignored unless idle.
    pub fn start(&self) {
        self.send(Command::Connect);
    }

    /// Report a login, logout or token refresh. `None` or an empty token is
    /// a logout: the connection is dropped and nothing is retried.
    pub fn auth_changed(&self, token: Option<String>) {
        self.send(Command::AuthChanged(token));
    }

    /// Close the connection and cancel pending retries for good.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// The live connection, if any.
    pub fn current(&self) -> Option<Connection> {
        self.shared.connection.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.current().is_some_and(|connection| connection.is_open())
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.clone()
    }

    pub fn watch_connection(&self) -> watch::Receiver<Option<Connection>> {
        self.shared.connection.clone()
    }

    /// Wait until the manager reports `target`. `false` if the driver is
    /// gone before that happens.
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut state = self.watch_state();
        state.wait_for(|current| *current == target).await.is_ok()
    }

    /// Register `on_event` for inbound events on the live connection and
    /// every connection that replaces it. Detached when the returned
    /// subscription is dropped.
    pub fn subscribe(&self, on_event: OnEvent) -> SyncSubscription {
        SyncSubscription::attach(self, on_event)
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.shared.queue
    }

    fn send(&self, command: Command) {
        if self.shared.commands.send(command).is_err() {
            debug!("Connection manager already stopped");
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("connection", &self.current())
            .finish()
    }
}

enum AttemptOutcome {
    Opened { link: Link, token: String },
    NoToken,
    Failed(ChatError),
}

struct Driver {
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenSource>,
    queue: OfflineQueue,
    endpoint: String,
    token_param: String,
    machine: StateMachine,
    /// True until a token has been seen or a logout happened.
    initial_attempt: bool,
    live: Option<Connection>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    attempt: Option<JoinHandle<AttemptOutcome>>,
    retry_at: Option<Instant>,
    deferred_auth: Option<Option<String>>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    connection_tx: watch::Sender<Option<Connection>>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => self.on_connect_requested(),
                    Some(Command::AuthChanged(token)) => self.on_auth_changed(token),
                    Some(Command::Shutdown) | None => {
                        self.on_shutdown();
                        break;
                    }
                },
                outcome = settle(&mut self.attempt) => {
                    self.attempt = None;
                    self.on_attempt_settled(outcome);
                }
                event = next_event(&mut self.events) => self.on_transport_event(event),
                _ = retry_timer(self.retry_at) => {
                    self.retry_at = None;
                    self.step(Trigger::RetryDue);
                }
            }
            self.publish_state();
        }
        self.publish_state();
        debug!("Connection manager driver exited");
    }

    fn on_connect_requested(&mut self) {
        if self.machine.state() == ConnectionState::Idle {
            self.step(Trigger::Connect);
        } else {
            debug!("Connect requested while {}; ignoring", self.machine.state());
        }
    }

    fn on_auth_changed(&mut self, token: Option<String>) {
        let token = normalize(token);

        if self.attempt.is_some() {
            debug!("Auth change during connect attempt; deferring until it settles");
            self.deferred_auth = Some(token);
            return;
        }

        match token {
            None => {
                self.initial_attempt = false;
                if self.machine.state() != ConnectionState::Idle || self.retry_at.is_some() {
                    info!("Session ended; disconnecting");
                    self.step(Trigger::Disconnect);
                }
            }
            Some(token) => {
                let unchanged = self.machine.token() == Some(token.as_str())
                    && matches!(
                        self.machine.state(),
                        ConnectionState::Open | ConnectionState::Reconnecting
                    );
                if unchanged {
                    debug!("Auth change carries the current token; nothing to do");
                    return;
                }
                if self.machine.state() != ConnectionState::Idle {
                    info!("Session token changed; reconnecting");
                    self.step(Trigger::Disconnect);
                }
                self.step(Trigger::Connect);
            }
        }
    }

    fn on_attempt_settled(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Opened { link, token } => {
                self.initial_attempt = false;
                self.on_opened(link, token);
            }
            AttemptOutcome::NoToken if self.initial_attempt => {
                debug!("No session token yet; will retry");
                self.step(Trigger::Failed);
            }
            AttemptOutcome::NoToken => {
                info!("No session token; staying idle until the next login");
                self.step(Trigger::Deferred);
            }
            AttemptOutcome::Failed(e) => {
                warn!("Connect attempt failed: {}", e);
                self.step(Trigger::Failed);
            }
        }

        if let Some(token) = self.deferred_auth.take() {
            self.on_auth_changed(token);
        }
    }

    fn on_opened(&mut self, link: Link, token: String) {
        let Link { connection, events } = link;

        match self.machine.apply(Trigger::Opened { token }) {
            Ok(Action::Flush) => {
                // published under the queue lock, see `OfflineQueue::send_or_enqueue`
                let connection_tx = &self.connection_tx;
                let flushed = self.queue.flush_then(&connection, || {
                    connection_tx.send_replace(Some(connection.clone()));
                });
                info!(
                    "Connection {} open; flushed {} queued messages",
                    connection.id(),
                    flushed
                );
                self.live = Some(connection);
                self.events = Some(events);
            }
            Ok(other) => {
                error!("Unexpected action {:?} on open", other);
                connection.close();
            }
            Err(e) => {
                error!("Dropping connection {}: {}", connection.id(), e);
                connection.close();
            }
        }
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Message(text)) => {
                if let Some(connection) = &self.live {
                    connection.dispatch(&text);
                }
            }
            Some(TransportEvent::Error(reason)) => {
                warn!("Transport error: {}", reason);
                if let Some(connection) = &self.live {
                    connection.close();
                }
                self.release_live();
                self.step(Trigger::Closed);
            }
            Some(TransportEvent::Closed { code, reason }) => {
                info!("Connection closed (code {:?}): {}", code, reason);
                self.release_live();
                self.step(Trigger::Closed);
            }
            None => {
                info!("Transport event stream ended");
                self.release_live();
                self.step(Trigger::Closed);
            }
        }
    }

    fn on_shutdown(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }
        self.deferred_auth = None;
        self.step(Trigger::Shutdown);
        info!("Connection manager stopped");
    }

    /// Apply one trigger and carry out the resulting action.
    fn step(&mut self, trigger: Trigger) {
        match self.machine.apply(trigger) {
            Ok(action) => self.perform(action),
            Err(e) => warn!("Ignoring invalid transition: {}", e),
        }
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::None | Action::Flush => {}
            Action::StartConnect => self.spawn_attempt(),
            Action::ScheduleRetry { attempt, delay } => {
                if self.retry_at.is_some() {
                    debug!("Reconnect already scheduled");
                    return;
                }
                debug!("Reconnect attempt {} in {:?}", attempt, delay);
                self.retry_at = Some(Instant::now() + delay);
            }
            Action::GiveUp { attempts } => {
                warn!(
                    "Giving up after {} reconnect attempts; waiting for an auth change",
                    attempts
                );
            }
            Action::TearDown => self.tear_down(),
        }
    }

    fn spawn_attempt(&mut self) {
        if self.attempt.is_some() {
            warn!("Connect attempt already in flight");
            return;
        }

        let connector = self.connector.clone();
        let tokens = self.tokens.clone();
        let endpoint = self.endpoint.clone();
        let token_param = self.token_param.clone();

        self.attempt = Some(tokio::spawn(async move {
            let token = match tokens.current_token().await {
                Ok(token) => normalize(token),
                Err(e) => return AttemptOutcome::Failed(e),
            };
            let Some(token) = token else {
                return AttemptOutcome::NoToken;
            };
            let url = match resolve_endpoint(&endpoint, &token_param, &token) {
                Ok(url) => url,
                Err(e) => return AttemptOutcome::Failed(e),
            };
            match connector.connect(&url).await {
                Ok(link) => AttemptOutcome::Opened { link, token },
                Err(e) => AttemptOutcome::Failed(e),
            }
        }));
    }

    fn tear_down(&mut self) {
        self.retry_at = None;
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }
        if let Some(connection) = &self.live {
            connection.close();
        }
        self.release_live();
    }

    /// Forget the live connection and everything attached to it.
    fn release_live(&mut self) {
        if let Some(connection) = self.live.take() {
            connection.clear_listeners();
        }
        self.events = None;
        self.connection_tx.send_replace(None);
    }

    fn publish_state(&self) {
        let state = self.machine.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn settle(attempt: &mut Option<JoinHandle<AttemptOutcome>>) -> AttemptOutcome {
    match attempt {
        Some(handle) => match handle.await {
            Ok(outcome) => outcome,
            Err(e) => AttemptOutcome::Failed(ChatError::Transport(format!(
                "connect task ended abnormally: {e}"
            ))),
        },
        None => std::future::pending().await,
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
