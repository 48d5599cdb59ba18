//! Offline outbound queue.
//!
//! Envelopes that could not be sent live are appended here and replayed, in
//! order, once the connection manager has a fresh open connection.

pub mod offline;

pub use offline::{Delivery, FrameSink, OfflineQueue, QueuedMessage};
