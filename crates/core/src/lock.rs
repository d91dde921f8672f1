//! TTL-bounded distributed mutual exclusion.
//!
//! A worker must hold the task's lock for the whole execution; losing
//! the acquisition race is the expected signal to drop a redelivered
//! request, not an error. Crash recovery relies on TTL expiry; the
//! contract deliberately has no other operations.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::TaskId;

/// Proof of lock ownership, required to renew or release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub token: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Lock backend error: {0}")]
    Backend(String),
}

/// Lock key for a task's execution lock.
pub fn task_lock_key(task_id: TaskId) -> String {
    format!("task:{task_id}")
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take the lock. `None` means another live owner holds it.
    /// An expired lock is free and may be taken over.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    /// Extend a held lock's TTL. Returns `false` if the token no longer
    /// owns the lock (expired and taken over, or released).
    async fn renew(&self, token: &LockToken, ttl: Duration) -> Result<bool, LockError>;

    /// Release a held lock. Releasing a lock that was already lost is
    /// not an error.
    async fn release(&self, token: LockToken) -> Result<(), LockError>;
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

struct Holder {
    token: Uuid,
    expires_at: Instant,
}

/// Single-process lock provider. The embedded/test backend; the same
/// contract is served by the database-backed provider in `sqlcheck-db`.
#[derive(Default)]
pub struct MemoryLockProvider {
    locks: Mutex<HashMap<String, Holder>>,
}

impl MemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        if let Some(holder) = locks.get(key) {
            if holder.expires_at > now {
                return Ok(None);
            }
        }
        let token = Uuid::new_v4();
        locks.insert(
            key.to_string(),
            Holder {
                token,
                expires_at: now + ttl,
            },
        );
        Ok(Some(LockToken {
            key: key.to_string(),
            token,
        }))
    }

    async fn renew(&self, token: &LockToken, ttl: Duration) -> Result<bool, LockError> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        match locks.get_mut(&token.key) {
            Some(holder) if holder.token == token.token && holder.expires_at > now => {
                holder.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, token: LockToken) -> Result<(), LockError> {
        let mut locks = self.locks.lock().await;
        if let Some(holder) = locks.get(&token.key) {
            if holder.token == token.token {
                locks.remove(&token.key);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
