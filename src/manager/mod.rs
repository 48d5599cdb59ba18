//! The `manager` module owns the single live connection.
//!
//! It combines the reconnect policy (`backoff`), the lifecycle
//! (`state`), session tokens (`auth`) and the background driver that ties
//! them to a `Connector` (`engine`).

pub mod auth;
pub mod backoff;
pub mod engine;
pub mod state;

pub use auth::{EnvToken, SessionTokens, StaticToken, TokenSource};
pub use backoff::Backoff;
pub use engine::{ConnectionManager, ManagerOptions};
pub use state::{Action, ConnectionState, InvalidTransition, StateMachine, Trigger};
