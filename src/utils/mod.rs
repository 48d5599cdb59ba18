//! The `utils` module provides a collection of utility functions and common
//! definitions used across `chatwire`.
//!
//! It holds the crate-wide error type and the tracing bootstrap used by the
//! CLI and by anyone embedding the library who wants the default log format.

pub mod error;
pub mod logging;

pub use error::{ChatError, Result};
