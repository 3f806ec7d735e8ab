use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ccsignals::{DetectionOutcome, PasteLockDetector};
use crate::models::{CodeUpdatePayload, Envelope, MessageType};
use crate::services::repository::Repository;
use crate::ws::{Connection, Hub, MessageHandler, RateLimitedAction, WsError};

use super::log_persistence_failure;

/// Handle `code_update`: permission, rate limit, paste detection, persist, fan out.
pub struct CodeUpdateHandler {
    repo: Arc<dyn Repository>,
    detector: Arc<PasteLockDetector>,
}

impl CodeUpdateHandler {
    pub fn new(repo: Arc<dyn Repository>, detector: Arc<PasteLockDetector>) -> Self {
        Self { repo, detector }
    }
}

#[async_trait]
impl MessageHandler for CodeUpdateHandler {
    async fn handle(&self, hub: &Hub, conn: &Arc<Connection>, msg: &Envelope) -> Result<(), WsError> {
        if !conn.can_write() {
            return Err(WsError::ReadOnly);
        }
        if !conn.check_rate_limit(RateLimitedAction::CodeUpdate) {
            return Err(WsError::RateLimited(RateLimitedAction::CodeUpdate));
        }
        let mut payload: CodeUpdatePayload = msg
            .parse_payload()
            .map_err(|e| WsError::InvalidPayload(e.to_string()))?;
        payload.display_name = conn.display_name().to_string();

        let session_id = conn.session_id.as_str();
        let Some(document) = hub.session_document(session_id).await else {
            return Err(WsError::SessionNotFound);
        };

        // Held until the broadcast so document order matches delivery order.
        let mut current = document.lock().await;

        match self.detector.on_code_update(session_id, conn.user_id(), &current, &payload.code).await {
            Ok(DetectionOutcome::PasteDetected { reason }) => {
                info!(session = %session_id, client = %conn.id, "Paste lock engaged: {}", reason);
            }
            Ok(outcome) => debug!(session = %session_id, ?outcome, "Paste check"),
            Err(e) => warn!(session = %session_id, "Paste lock check failed, continuing: {}", e),
        }
        current.clone_from(&payload.code);

        log_persistence_failure(
            session_id,
            "update session code",
            self.repo.update_session_code(session_id, &payload.code).await,
        );

        let broadcast = Envelope::new(MessageType::CodeUpdate, session_id, conn.user_id(), &payload)
            .map_err(|e| WsError::InvalidPayload(e.to_string()))?;
        let delivered = hub.broadcast_to_session(session_id, &broadcast, Some(&conn.id)).await;
        drop(current);

        debug!(session = %session_id, name = %conn.display_name(), delivered, "Code updated");
        Ok(())
    }
}
