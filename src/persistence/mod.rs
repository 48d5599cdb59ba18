//! The `persistence` module provides the storage backends behind the offline
//! queue.
//!
//! Storage is a small capability: read and write one string value under a
//! key, the way browser local storage works. `sled` backs the durable
//! implementation so queued messages survive restarts; the in-memory backend
//! serves tests and hosts without a writable disk.

pub mod memory_store;
pub mod sled_store;

use crate::utils::Result;

pub use memory_store::MemoryStorage;
pub use sled_store::SledStorage;

pub trait QueueStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}
