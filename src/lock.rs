//! Named exclusion locks.
//!
//! Cumulative metrics are written under a lock so that two writers cannot
//! read the same previous total. The lock comes from a [`LockProvider`]
//! handed to the engine at construction; [`LocalLockProvider`] serializes
//! callers within one process.

use crate::error::{Result, RollupError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Key of the lock held around every cumulative write.
pub const CUMULATIVE_LOCK_KEY: &str = "cumulative metric mutation";

/// Options passed to a provider on every acquisition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockOptions {
    /// Fail with [`RollupError::LockTimeout`] instead of waiting longer
    pub timeout: Option<Duration>,
}

impl LockOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A held lock. Dropping the guard releases it.
pub struct LockGuard {
    _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
    pub fn new<G: Send + Sync + 'static>(inner: G) -> Self {
        Self { _inner: Box::new(inner) }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Provides named, mutually exclusive critical sections.
#[async_trait]
pub trait LockProvider: Send + Sync + 'static {
    /// Wait for and take the lock named `key`.
    async fn acquire(&self, key: &str, options: &LockOptions) -> Result<LockGuard>;
}

/// In-process named locks.
#[derive(Default)]
pub struct LocalLockProvider {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LocalLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl LockProvider for LocalLockProvider {
    async fn acquire(&self, key: &str, options: &LockOptions) -> Result<LockGuard> {
        let lock = self.lock_for(key);
        let guard = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    RollupError::LockTimeout(format!(
                        "Could not acquire the '{key}' lock within {timeout:?}"
                    ))
                })?,
            None => lock.lock_owned().await,
        };
        debug!(key, "Acquired lock");
        Ok(LockGuard::new(guard))
    }
}
