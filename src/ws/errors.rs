use crate::models::ErrorPayload;

use super::ratelimit::RateLimitedAction;

/// Failures while handling one inbound message. Only the kinds with a wire
/// code are ever reported, and only to the participant who caused them.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("read-only access")]
    ReadOnly,
    #[error("rate limit exceeded for {0}")]
    RateLimited(RateLimitedAction),
    #[error("AI generation is locked for this session: {0}")]
    PasteLocked(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("message type '{0}' is reserved for the server")]
    ReservedType(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("client not found")]
    ClientNotFound,
}

impl WsError {
    /// Wire code, or `None` for kinds that are only logged.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            WsError::InvalidPayload(_) => Some("INVALID_PAYLOAD"),
            WsError::ReadOnly => Some("FORBIDDEN"),
            WsError::RateLimited(_) => Some("RATE_LIMITED"),
            WsError::PasteLocked(_) => Some("PASTE_LOCKED"),
            WsError::GenerationFailed(_) => Some("GENERATION_ERROR"),
            WsError::ReservedType(_) => Some("INVALID_MESSAGE"),
            WsError::PersistenceFailed(_) | WsError::SessionNotFound | WsError::ClientNotFound => None,
        }
    }

    fn user_message(&self) -> String {
        match self {
            WsError::InvalidPayload(_) => "Failed to parse message".to_string(),
            WsError::ReadOnly => "You don't have permission to edit code".to_string(),
            WsError::RateLimited(action) => format!("Too many {}, please slow down", action),
            WsError::PasteLocked(_) => {
                "AI generation is paused until the pasted code has been substantially edited".to_string()
            }
            WsError::GenerationFailed(_) => "Failed to generate code".to_string(),
            WsError::ReservedType(_) => "This message type cannot be sent by clients".to_string(),
            other => other.to_string(),
        }
    }

    /// Coarse category shown outside development instead of the raw error.
    fn category(&self) -> Option<&'static str> {
        match self {
            WsError::InvalidPayload(_) => Some("invalid message body"),
            WsError::GenerationFailed(_) => Some("generation service unavailable"),
            WsError::PersistenceFailed(_) => Some("database operation failed"),
            WsError::PasteLocked(_) => Some("pasted content protection"),
            _ => None,
        }
    }

    /// Wire payload for this error. With `verbose` the full error text is
    /// passed through as details.
    pub fn to_payload(&self, verbose: bool) -> Option<ErrorPayload> {
        let code = self.code()?;
        let details = if verbose {
            Some(self.to_string())
        } else {
            self.category().map(str::to_string)
        };
        Some(ErrorPayload {
            error_code: code.to_string(),
            message: self.user_message(),
            details,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub is shutting down")]
    ShuttingDown,
    #[error("hub run loop is gone")]
    Stopped,
}
