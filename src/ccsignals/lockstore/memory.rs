use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{LockStore, LockStoreError};
use crate::ccsignals::types::LockState;

struct LockEntry {
    state: LockState,
    expires_at: Instant,
}

/// In-process lock store for single-instance deployments and tests.
///
/// Expiry is checked lazily on every access; there is no sweeper task.
#[derive(Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_locks<T>(&self, f: impl FnOnce(&mut HashMap<String, LockEntry>) -> T) -> Result<T, LockStoreError> {
        let mut locks = self.locks.lock().map_err(|_| LockStoreError::Poisoned)?;
        Ok(f(&mut locks))
    }

    /// Number of entries that have not expired yet.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.with_locks(|locks| locks.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_lock_with_reason(
        &self,
        session_id: &str,
        baseline_code: &str,
        reason: &str,
        ttl: Duration,
    ) -> Result<(), LockStoreError> {
        let entry = LockEntry {
            state: LockState::locked(baseline_code, reason, Utc::now()),
            expires_at: Instant::now() + ttl,
        };
        self.with_locks(|locks| {
            locks.insert(session_id.to_string(), entry);
        })
    }

    async fn get_lock(&self, session_id: &str) -> Result<LockState, LockStoreError> {
        let now = Instant::now();
        self.with_locks(|locks| match locks.get(session_id) {
            Some(entry) if entry.expires_at > now => entry.state.clone(),
            Some(_) => {
                locks.remove(session_id);
                LockState::unlocked()
            }
            None => LockState::unlocked(),
        })
    }

    async fn remove_lock(&self, session_id: &str) -> Result<(), LockStoreError> {
        self.with_locks(|locks| {
            locks.remove(session_id);
        })
    }

    async fn refresh_ttl(&self, session_id: &str, ttl: Duration) -> Result<(), LockStoreError> {
        let now = Instant::now();
        self.with_locks(|locks| {
            let expired = match locks.get_mut(session_id) {
                Some(entry) if entry.expires_at > now => {
                    entry.expires_at = now + ttl;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                locks.remove(session_id);
            }
        })
    }
}
