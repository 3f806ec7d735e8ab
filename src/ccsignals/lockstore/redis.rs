use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{LockStore, LockStoreError};
use crate::ccsignals::types::LockState;

const KEY_PREFIX: &str = "ccsignals:lock:";

#[derive(Serialize, Deserialize)]
struct StoredLock {
    baseline_code: String,
    locked_at: DateTime<Utc>,
    reason: String,
}

/// Lock store shared by every server instance. Expiry is Redis' own key
/// TTL, so a lock vanishes without any cleanup on our side.
#[derive(Clone)]
pub struct RedisLockStore {
    conn: MultiplexedConnection,
}

impl RedisLockStore {
    pub async fn connect(redis_url: &str) -> Result<Self, LockStoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!("Connected to Redis lock store");
        Ok(Self { conn })
    }

    fn key(session_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, session_id)
    }
}

// Redis rejects a zero PX/PEXPIRE.
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_lock_with_reason(
        &self,
        session_id: &str,
        baseline_code: &str,
        reason: &str,
        ttl: Duration,
    ) -> Result<(), LockStoreError> {
        let value = serde_json::to_string(&StoredLock {
            baseline_code: baseline_code.to_string(),
            locked_at: Utc::now(),
            reason: reason.to_string(),
        })?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(Self::key(session_id))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_lock(&self, session_id: &str) -> Result<LockState, LockStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(session_id))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(raw) => {
                let stored: StoredLock = serde_json::from_str(&raw)?;
                Ok(LockState::locked(&stored.baseline_code, &stored.reason, stored.locked_at))
            }
            None => Ok(LockState::unlocked()),
        }
    }

    async fn remove_lock(&self, session_id: &str) -> Result<(), LockStoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::key(session_id))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn refresh_ttl(&self, session_id: &str, ttl: Duration) -> Result<(), LockStoreError> {
        let mut conn = self.conn.clone();
        // PEXPIRE on a missing key returns 0 and changes nothing.
        let _updated: i64 = redis::cmd("PEXPIRE")
            .arg(Self::key(session_id))
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
