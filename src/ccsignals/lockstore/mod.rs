mod memory;
mod redis;

pub use self::memory::MemoryLockStore;
pub use self::redis::RedisLockStore;

use async_trait::async_trait;
use std::time::Duration;

use super::types::{LockState, DEFAULT_LOCK_REASON};

#[derive(Debug, thiserror::Error)]
pub enum LockStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("failed to encode lock state: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lock store mutex poisoned")]
    Poisoned,
}

/// Per-session paste-lock storage.
///
/// Implementations must agree on these semantics:
/// - a read right after `set_lock` sees the lock
/// - once the TTL has elapsed `get_lock` reports unlocked, whether or not
///   anything cleaned the entry up
/// - removing or refreshing a missing lock is a no-op, not an error
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn set_lock_with_reason(
        &self,
        session_id: &str,
        baseline_code: &str,
        reason: &str,
        ttl: Duration,
    ) -> Result<(), LockStoreError>;

    async fn set_lock(&self, session_id: &str, baseline_code: &str, ttl: Duration) -> Result<(), LockStoreError> {
        self.set_lock_with_reason(session_id, baseline_code, DEFAULT_LOCK_REASON, ttl)
            .await
    }

    async fn get_lock(&self, session_id: &str) -> Result<LockState, LockStoreError>;

    async fn remove_lock(&self, session_id: &str) -> Result<(), LockStoreError>;

    async fn refresh_ttl(&self, session_id: &str, ttl: Duration) -> Result<(), LockStoreError>;
}
