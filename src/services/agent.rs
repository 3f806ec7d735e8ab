use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::ConversationTurn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub user_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_state: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub docs_retrieved: u32,
    #[serde(default)]
    pub examples_retrieved: u32,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub is_actionable: bool,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("no generation agent configured")]
    NotConfigured,
    #[error("agent request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("agent returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode agent response: {0}")]
    Decode(String),
    #[error("agent timed out after {0} seconds")]
    Timeout(u64),
}

/// Code generation service consulted for `agent_request` messages.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AgentError>;

    /// Short label for diagnostics.
    fn name(&self) -> &'static str;
}

/// Stand-in used when no agent URL is configured.
#[derive(Debug, Default)]
pub struct DisabledAgent;

#[async_trait]
impl Agent for DisabledAgent {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse, AgentError> {
        Err(AgentError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_agent_refuses() {
        let request = GenerateRequest {
            user_query: "add hats".to_string(),
            editor_state: None,
            conversation_history: Vec::new(),
        };
        assert!(matches!(DisabledAgent.generate(request).await, Err(AgentError::NotConfigured)));
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let response: GenerateResponse = serde_json::from_str(r#"{"code":"s(\"bd\")","is_actionable":true}"#).unwrap();
        assert!(response.is_actionable);
        assert_eq!(response.docs_retrieved, 0);
        assert!(response.clarifying_questions.is_empty());
    }
}
