use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::services::agent::{Agent, AgentError, GenerateRequest, GenerateResponse};

/// Generation agent reached over HTTP: `POST {base_url}/generate`.
#[derive(Debug)]
pub struct HttpAgentClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn generate_url(&self) -> String {
        format!("{}/generate", self.base_url)
    }
}

#[async_trait]
impl Agent for HttpAgentClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AgentError> {
        let url = self.generate_url();
        debug!("Requesting generation from {}", url);

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout(self.timeout.as_secs())
            } else {
                AgentError::Transport(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Agent returned {}: {}", status, body);
            return Err(AgentError::Status { status: status.as_u16(), body });
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| AgentError::Decode(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = HttpAgentClient::new("http://agent.local:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.generate_url(), "http://agent.local:8000/generate");
    }

    #[tokio::test]
    async fn unreachable_agent_is_a_transport_error() {
        let client = HttpAgentClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let request = GenerateRequest {
            user_query: "q".to_string(),
            editor_state: None,
            conversation_history: Vec::new(),
        };
        assert!(matches!(
            client.generate(request).await,
            Err(AgentError::Transport(_)) | Err(AgentError::Timeout(_))
        ));
    }
}
