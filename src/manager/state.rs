//! Connection state machine
//!
//! The manager's lifecycle as an explicit enum plus one transition function.
//! `StateMachine::apply` is pure bookkeeping: it moves the state, keeps the
//! reconnect counter and the last-used token, and tells the driver what to do
//! next. Pairs that make no sense (a flush while idle, a retry while open)
//! come back as `InvalidTransition` and change nothing.

use std::fmt;
use std::time::Duration;

use crate::manager::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt pending.
    Idle,
    /// One connect attempt in flight.
    Connecting,
    /// Live and usable.
    Open,
    /// Closed with a backoff timer pending.
    Reconnecting,
    /// Shut down, or out of retries until an auth change.
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Mount, or an auth change bringing a token.
    Connect,
    /// The transport reported a successful open.
    Opened { token: String },
    /// Token fetch, endpoint resolution or transport open failed.
    Failed,
    /// No token and nothing to wait for; go quiet.
    Deferred,
    /// The live connection closed or errored.
    Closed,
    /// The backoff timer fired.
    RetryDue,
    /// Auth change: forget the connection and the token.
    Disconnect,
    /// Unmount.
    Shutdown,
}

impl Trigger {
    fn name(&self) -> &'static str {
        match self {
            Trigger::Connect => "connect",
            Trigger::Opened { .. } => "opened",
            Trigger::Failed => "failed",
            Trigger::Deferred => "deferred",
            Trigger::Closed => "closed",
            Trigger::RetryDue => "retry_due",
            Trigger::Disconnect => "disconnect",
            Trigger::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    StartConnect,
    Flush,
    ScheduleRetry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
    TearDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub trigger: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no transition from {} on {}", self.from, self.trigger)
    }
}

impl std::error::Error for InvalidTransition {}

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: ConnectionState,
    attempts: u32,
    token: Option<String>,
    backoff: Backoff,
}

impl StateMachine {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            token: None,
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Token of the current or most recent connection.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn apply(&mut self, trigger: Trigger) -> Result<Action, InvalidTransition> {
        use ConnectionState::*;

        let action = match (self.state, trigger) {
            (Idle, Trigger::Connect) | (Reconnecting, Trigger::RetryDue) => {
                self.state = Connecting;
                Action::StartConnect
            }
            (Connecting, Trigger::Opened { token }) => {
                self.state = Open;
                self.attempts = 0;
                self.token = Some(token);
                Action::Flush
            }
            (Connecting, Trigger::Failed) | (Open, Trigger::Closed) => self.schedule_retry(),
            (Connecting, Trigger::Deferred) => {
                self.state = Idle;
                Action::None
            }
            (_, Trigger::Disconnect) => {
                self.state = Idle;
                self.attempts = 0;
                self.token = None;
                Action::TearDown
            }
            (_, Trigger::Shutdown) => {
                self.state = Stopped;
                self.attempts = 0;
                self.token = None;
                Action::TearDown
            }
            (from, trigger) => {
                return Err(InvalidTransition {
                    from,
                    trigger: trigger.name(),
                });
            }
        };

        Ok(action)
    }

    fn schedule_retry(&mut self) -> Action {
        let attempt = self.attempts + 1;
        match self.backoff.next(attempt) {
            Some(delay) => {
                self.attempts = attempt;
                self.state = ConnectionState::Reconnecting;
                Action::ScheduleRetry { attempt, delay }
            }
            None => {
                self.state = ConnectionState::Stopped;
                Action::GiveUp {
                    attempts: self.attempts,
                }
            }
        }
    }
}
