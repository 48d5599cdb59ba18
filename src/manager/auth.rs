//! Session token sources.
//!
//! The connection manager asks for the token again before every attempt, so
//! refreshed tokens are picked up on reconnect without extra plumbing.

use std::env::{self, VarError};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::utils::{ChatError, Result};

#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    /// The current session token, `None` when not (yet) authenticated.
    async fn current_token(&self) -> Result<Option<String>>;
}

/// A token fixed at construction, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn current_token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every attempt.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl TokenSource for EnvToken {
    async fn current_token(&self) -> Result<Option<String>> {
        match env::var(&self.var) {
            Ok(token) => Ok(Some(token)),
            Err(VarError::NotPresent) => Ok(None),
            Err(e @ VarError::NotUnicode(_)) => {
                Err(ChatError::Token(format!("{}: {e}", self.var)))
            }
        }
    }
}

/// A settable session shared with whatever handles login and logout.
///
/// Updating it does not reconnect anything on its own; pair each change with
/// `ConnectionManager::auth_changed`.
#[derive(Debug, Clone, Default)]
pub struct SessionTokens {
    inner: Arc<RwLock<Option<String>>>,
}

impl SessionTokens {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl TokenSource for SessionTokens {
    async fn current_token(&self) -> Result<Option<String>> {
        Ok(self.get())
    }
}

/// Empty or whitespace-only tokens count as no token.
pub(crate) fn normalize(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}
