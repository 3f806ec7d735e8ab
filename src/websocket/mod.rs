pub mod handler;
pub mod msg_agent_request_handler;
pub mod msg_chat_handler;
pub mod msg_code_update_handler;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::ccsignals::PasteLockDetector;
use crate::services::agent::Agent;
use crate::services::repository::{RepoError, Repository};
use crate::ws::{HandlerTable, WsError};

pub use handler::{websocket_handler, ConnectParams};
pub use msg_agent_request_handler::AgentRequestHandler;
pub use msg_chat_handler::ChatMessageHandler;
pub use msg_code_update_handler::CodeUpdateHandler;

/// Handlers for every message kind with business logic.
pub fn handler_table(
    repo: Arc<dyn Repository>,
    detector: Arc<PasteLockDetector>,
    agent: Arc<dyn Agent>,
    agent_timeout: Duration,
) -> HandlerTable {
    HandlerTable {
        code_update: Some(Arc::new(CodeUpdateHandler::new(repo.clone(), detector.clone()))),
        agent_request: Some(Arc::new(AgentRequestHandler::new(repo.clone(), detector, agent, agent_timeout))),
        chat_message: Some(Arc::new(ChatMessageHandler::new(repo))),
    }
}

/// Persistence is best-effort: failures are logged and never reach the client.
pub(crate) fn log_persistence_failure<T>(session_id: &str, action: &str, result: Result<T, RepoError>) {
    if let Err(e) = result {
        let err = WsError::PersistenceFailed(e.to_string());
        warn!(session = %session_id, "Failed to {}: {}", action, err);
    }
}
