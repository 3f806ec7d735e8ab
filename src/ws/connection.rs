use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

pub use crate::models::participant::{Participant, Role, Tier};
use crate::models::{Envelope, ErrorPayload, MessageType};

use super::ratelimit::{RateLimitedAction, RateLimiter};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("outbound buffer full")]
    BufferFull,
    #[error("connection closed")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One participant's live transport into a session.
///
/// Outbound frames go through a bounded queue drained by the connection's
/// writer task. A full or closed queue fails the send for this connection
/// only.
pub struct Connection {
    pub id: String,
    pub session_id: String,
    pub participant: Participant,
    limiter: Mutex<RateLimiter>,
    outbound: mpsc::Sender<String>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("participant", &self.participant)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Create a connection with a fresh id and the receiving half of its outbound queue.
    pub fn open(session_id: &str, participant: Participant, buffer: usize) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        let conn = Connection {
            id: Uuid::new_v4().simple().to_string(),
            session_id: session_id.to_string(),
            limiter: Mutex::new(RateLimiter::new(participant.tier)),
            participant,
            outbound: tx,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        };
        (Arc::new(conn), rx)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.participant.user_id.as_deref()
    }

    pub fn display_name(&self) -> &str {
        &self.participant.display_name
    }

    pub fn role(&self) -> Role {
        self.participant.role
    }

    pub fn tier(&self) -> Tier {
        self.participant.tier
    }

    pub fn can_write(&self) -> bool {
        self.participant.role.can_write()
    }

    /// Admit and record one `action`, or refuse it when its window is full.
    pub fn check_rate_limit(&self, action: RateLimitedAction) -> bool {
        let mut limiter = self.limiter.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        limiter.check(action)
    }

    pub fn send(&self, msg: &Envelope) -> Result<(), ConnectionError> {
        self.send_text(msg.to_json()?)
    }

    pub fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.outbound.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    pub fn send_error(&self, payload: &ErrorPayload) -> Result<(), ConnectionError> {
        let msg = Envelope::new(MessageType::Error, &self.session_id, self.user_id(), payload)?;
        self.send(&msg)
    }

    /// Mark closed and wake the writer task. Safe to call repeatedly.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_signal.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }
}
