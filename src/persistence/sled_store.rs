//! Persistence layer backed by `sled`
//!
//! Values live in a dedicated `offline` tree so the database can be shared
//! with other data. Every write is flushed before returning; a queue entry
//! that only reached the page cache would not survive a crash.

use sled::{Db, Tree};

use crate::persistence::QueueStorage;
use crate::utils::{ChatError, Result};

const TREE: &str = "offline";

#[derive(Clone)]
pub struct SledStorage {
    db: Db,
    tree: Tree,
}

impl SledStorage {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree(TREE)?;
        Ok(Self { db, tree })
    }

    /// A throwaway database that is removed when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(TREE)?;
        Ok(Self { db, tree })
    }
}

impl QueueStorage for SledStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.tree.get(key)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| ChatError::Storage(format!("value under '{key}' is not UTF-8: {e}"))),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.tree.insert(key, value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStorage")
            .field("db", &"sled::Db")
            .field("was_recovered", &self.db.was_recovered())
            .finish()
    }
}
