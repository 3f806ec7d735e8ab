use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::models::{ChatMessagePayload, Envelope, MessageType};
use crate::services::repository::{MessageRole, Repository};
use crate::ws::{Connection, Hub, MessageHandler, RateLimitedAction, WsError};

use super::log_persistence_failure;

/// Longest chat message accepted, in characters.
pub const MAX_CHAT_MESSAGE_CHARS: usize = 4000;

/// Handle `chat_message`
pub struct ChatMessageHandler {
    repo: Arc<dyn Repository>,
}

impl ChatMessageHandler {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl MessageHandler for ChatMessageHandler {
    async fn handle(&self, hub: &Hub, conn: &Arc<Connection>, msg: &Envelope) -> Result<(), WsError> {
        if !conn.check_rate_limit(RateLimitedAction::ChatMessage) {
            return Err(WsError::RateLimited(RateLimitedAction::ChatMessage));
        }
        let mut payload: ChatMessagePayload = msg
            .parse_payload()
            .map_err(|e| WsError::InvalidPayload(e.to_string()))?;
        if payload.message.trim().is_empty() {
            return Err(WsError::InvalidPayload("message is empty".to_string()));
        }
        if payload.message.chars().count() > MAX_CHAT_MESSAGE_CHARS {
            return Err(WsError::InvalidPayload(format!(
                "message exceeds {} characters",
                MAX_CHAT_MESSAGE_CHARS
            )));
        }
        payload.display_name = conn.display_name().to_string();

        let session_id = conn.session_id.as_str();
        log_persistence_failure(
            session_id,
            "save chat message",
            self.repo.add_message(session_id, conn.user_id(), MessageRole::User, &payload.message).await,
        );

        let broadcast = Envelope::new(MessageType::ChatMessage, session_id, conn.user_id(), &payload)
            .map_err(|e| WsError::InvalidPayload(e.to_string()))?;
        let delivered = hub.broadcast_to_session(session_id, &broadcast, Some(&conn.id)).await;
        debug!(session = %session_id, name = %conn.display_name(), delivered, "Chat message relayed");
        Ok(())
    }
}
