use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::ccsignals::PasteLockDetector;
use crate::models::{AgentRequestPayload, AgentResponsePayload, Envelope, MessageType};
use crate::services::agent::{Agent, AgentError, GenerateRequest};
use crate::services::repository::{MessageRole, Repository};
use crate::ws::{Connection, Hub, MessageHandler, RateLimitedAction, WsError};

use super::log_persistence_failure;

/// Handle `agent_request`: rate limit and paste-lock gate on the reader
/// task, then generation, persistence and the session-wide response on a
/// task of its own.
///
/// Generation outlives the requester's connection: if it drops mid-request
/// the rest of the session still gets the response and the code is still
/// saved. The reader stays free to answer pings meanwhile.
pub struct AgentRequestHandler {
    repo: Arc<dyn Repository>,
    detector: Arc<PasteLockDetector>,
    agent: Arc<dyn Agent>,
    timeout: Duration,
}

impl AgentRequestHandler {
    pub fn new(
        repo: Arc<dyn Repository>,
        detector: Arc<PasteLockDetector>,
        agent: Arc<dyn Agent>,
        timeout: Duration,
    ) -> Self {
        Self { repo, detector, agent, timeout }
    }

    async fn ensure_unlocked(&self, session_id: &str) -> Result<(), WsError> {
        match self.detector.lock_state(session_id).await {
            Ok(state) if state.locked => Err(WsError::PasteLocked(state.reason)),
            Ok(_) => Ok(()),
            Err(e) => {
                error!(session = %session_id, "Paste lock lookup failed, refusing generation: {}", e);
                Err(WsError::GenerationFailed(format!("paste lock lookup failed: {}", e)))
            }
        }
    }
}

#[async_trait]
impl MessageHandler for AgentRequestHandler {
    async fn handle(&self, hub: &Hub, conn: &Arc<Connection>, msg: &Envelope) -> Result<(), WsError> {
        if !conn.check_rate_limit(RateLimitedAction::AgentRequest) {
            return Err(WsError::RateLimited(RateLimitedAction::AgentRequest));
        }
        let payload: AgentRequestPayload = msg
            .parse_payload()
            .map_err(|e| WsError::InvalidPayload(e.to_string()))?;
        if payload.user_query.trim().is_empty() {
            return Err(WsError::InvalidPayload("user_query is required".to_string()));
        }

        let session_id = conn.session_id.as_str();
        self.ensure_unlocked(session_id).await?;

        // Fall back to the live document when the client sent no editor state.
        let editor_state = match payload.editor_state {
            Some(state) => Some(state),
            None => match hub.session_document(session_id).await {
                Some(doc) => Some(doc.lock().await.clone()),
                None => None,
            },
        };
        let request = GenerateRequest {
            user_query: payload.user_query,
            editor_state,
            conversation_history: payload.conversation_history,
        };

        let generation = Generation {
            hub: hub.clone(),
            conn: conn.clone(),
            repo: self.repo.clone(),
            agent: self.agent.clone(),
            timeout: self.timeout,
        };
        tokio::spawn(async move {
            if let Err(e) = generation.run(request).await {
                warn!(session = %generation.conn.session_id, client = %generation.conn.id, "Agent request failed: {}", e);
                generation.hub.report_error(&generation.conn, &e);
            }
        });
        debug!(session = %session_id, client = %conn.id, "Generation started");
        Ok(())
    }
}

/// One in-flight generation, owning everything it needs after the reader is gone.
struct Generation {
    hub: Hub,
    conn: Arc<Connection>,
    repo: Arc<dyn Repository>,
    agent: Arc<dyn Agent>,
    timeout: Duration,
}

impl Generation {
    async fn run(&self, request: GenerateRequest) -> Result<(), WsError> {
        let session_id = self.conn.session_id.as_str();
        let user_query = request.user_query.clone();

        let response = match tokio::time::timeout(self.timeout, self.agent.generate(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(WsError::GenerationFailed(e.to_string())),
            Err(_) => {
                let e = AgentError::Timeout(self.timeout.as_secs());
                return Err(WsError::GenerationFailed(e.to_string()));
            }
        };

        log_persistence_failure(
            session_id,
            "save user message",
            self.repo.add_message(session_id, self.conn.user_id(), MessageRole::User, &user_query).await,
        );
        if !response.code.is_empty() {
            log_persistence_failure(
                session_id,
                "save assistant message",
                self.repo.add_message(session_id, None, MessageRole::Assistant, &response.code).await,
            );
        }

        if response.is_actionable && !response.code.is_empty() {
            log_persistence_failure(
                session_id,
                "update session code",
                self.repo.update_session_code(session_id, &response.code).await,
            );
            match self.hub.session_document(session_id).await {
                Some(doc) => doc.lock().await.clone_from(&response.code),
                None => warn!(session = %session_id, "Session closed before generated code could be applied"),
            }
        }

        let reply = AgentResponsePayload {
            code: Some(response.code).filter(|c| !c.is_empty()),
            docs_retrieved: response.docs_retrieved,
            examples_retrieved: response.examples_retrieved,
            model: response.model,
            is_actionable: response.is_actionable,
            clarifying_questions: response.clarifying_questions,
        };
        let broadcast = Envelope::new(MessageType::AgentResponse, session_id, self.conn.user_id(), &reply)
            .map_err(|e| WsError::GenerationFailed(e.to_string()))?;
        let delivered = self.hub.broadcast_to_session(session_id, &broadcast, None).await;

        log_persistence_failure(
            session_id,
            "update last activity",
            self.repo.update_last_activity(session_id).await,
        );

        info!(session = %session_id, name = %self.conn.display_name(), delivered, "Code generated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorPayload, Role};
    use crate::websocket::testutil::{drain, generated, inbound, recv, Fixture, StubAgent};

    fn request(query: &str) -> serde_json::Value {
        serde_json::json!({
            "user_query": query,
            "conversation_history": [{"role": "user", "content": "earlier"}]
        })
    }

    #[tokio::test]
    async fn response_goes_to_everyone_and_code_is_applied() {
        let fx = Fixture::new("s(\"bd\")").await;
        let (viewer, mut rx_viewer) = fx.join("Vee", Role::Viewer).await;
        let (_host, mut rx_host) = fx.join("Hostess", Role::Host).await;
        drain(&mut rx_viewer);

        fx.hub.dispatch(inbound(&viewer, MessageType::AgentRequest, request("double the kick"))).await;

        for rx in [&mut rx_viewer, &mut rx_host] {
            let got = recv(rx).await;
            assert_eq!(got.kind, MessageType::AgentResponse);
            let reply: AgentResponsePayload = got.parse_payload().unwrap();
            assert_eq!(reply.code.as_deref(), Some("s(\"bd*2\")"));
            assert_eq!(reply.examples_retrieved, 3);
            assert!(drain(rx).is_empty());
        }

        assert_eq!(fx.code().await, "s(\"bd*2\")");
        let doc = fx.hub.session_document(&fx.session).await.unwrap();
        assert_eq!(*doc.lock().await, "s(\"bd*2\")");

        let messages = fx.repo.messages(&fx.session);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].user_id.as_deref(), Some("user-vee"));

        // Editor state defaulted to the live document
        let sent = fx.agent.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.editor_state.as_deref(), Some("s(\"bd\")"));
        assert_eq!(sent.conversation_history.len(), 1);
    }

    #[tokio::test]
    async fn locked_session_refuses_generation() {
        let fx = Fixture::new("").await;
        let (host, mut rx_host) = fx.join("Hostess", Role::Host).await;
        let (_peer, mut rx_peer) = fx.join("Pat", Role::CoAuthor).await;
        drain(&mut rx_host);

        let pasted = "x".repeat(300);
        fx.hub.dispatch(inbound(&host, MessageType::CodeUpdate, serde_json::json!({"code": pasted}))).await;
        drain(&mut rx_peer);

        fx.hub.dispatch(inbound(&host, MessageType::AgentRequest, request("continue this"))).await;

        let got = drain(&mut rx_host);
        let err: ErrorPayload = got[0].parse_payload().unwrap();
        assert_eq!(err.error_code, "PASTE_LOCKED");
        assert!(drain(&mut rx_peer).is_empty());
        assert_eq!(fx.agent.calls(), 0);
    }

    #[tokio::test]
    async fn agent_failure_is_reported_to_requester_only() {
        let fx = Fixture::with_agent("", StubAgent::failing(), Duration::from_secs(5)).await;
        let (host, mut rx_host) = fx.join("Hostess", Role::Host).await;
        let (_peer, mut rx_peer) = fx.join("Pat", Role::CoAuthor).await;
        drain(&mut rx_host);

        fx.hub.dispatch(inbound(&host, MessageType::AgentRequest, request("anything"))).await;

        let got = recv(&mut rx_host).await;
        assert_eq!(got.payload["error_code"], "GENERATION_ERROR");
        assert!(drain(&mut rx_peer).is_empty());
        assert!(fx.repo.messages(&fx.session).is_empty());
    }

    #[tokio::test]
    async fn slow_agent_times_out() {
        let mut agent = StubAgent::replying(generated("late", true));
        agent.delay = Duration::from_millis(500);
        let fx = Fixture::with_agent("", agent, Duration::from_millis(50)).await;
        let (host, mut rx_host) = fx.join("Hostess", Role::Host).await;

        fx.hub.dispatch(inbound(&host, MessageType::AgentRequest, request("anything"))).await;

        let got = recv(&mut rx_host).await;
        assert_eq!(got.payload["error_code"], "GENERATION_ERROR");
        assert_eq!(fx.code().await, "");
    }

    #[tokio::test]
    async fn clarifying_reply_leaves_code_untouched() {
        let mut reply = generated("", false);
        reply.clarifying_questions = vec!["Which tempo?".to_string()];
        let fx = Fixture::with_agent("s(\"hh\")", StubAgent::replying(reply), Duration::from_secs(5)).await;
        let (host, mut rx_host) = fx.join("Hostess", Role::Host).await;

        fx.hub.dispatch(inbound(&host, MessageType::AgentRequest, request("make it better"))).await;

        let reply: AgentResponsePayload = recv(&mut rx_host).await.parse_payload().unwrap();
        assert!(reply.code.is_none());
        assert_eq!(reply.clarifying_questions, vec!["Which tempo?".to_string()]);
        assert_eq!(fx.code().await, "s(\"hh\")");
        assert_eq!(fx.repo.messages(&fx.session).len(), 1);
    }

    #[tokio::test]
    async fn free_tier_gets_ten_requests_per_minute() {
        let fx = Fixture::new("").await;
        let (host, mut rx_host) = fx.join("Hostess", Role::Host).await;

        for _ in 0..11 {
            fx.hub.dispatch(inbound(&host, MessageType::AgentRequest, request("again"))).await;
        }

        let mut got = Vec::new();
        for _ in 0..11 {
            got.push(recv(&mut rx_host).await);
        }
        let responses = got.iter().filter(|m| m.kind == MessageType::AgentResponse).count();
        assert_eq!(responses, 10);
        let limited = got.iter().filter(|m| m.payload["error_code"] == "RATE_LIMITED").count();
        assert_eq!(limited, 1);
        assert_eq!(fx.agent.calls(), 10);
    }

    #[tokio::test]
    async fn empty_query_is_invalid() {
        let fx = Fixture::new("").await;
        let (host, mut rx_host) = fx.join("Hostess", Role::Host).await;

        fx.hub.dispatch(inbound(&host, MessageType::AgentRequest, request("  "))).await;

        assert_eq!(drain(&mut rx_host)[0].payload["error_code"], "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn requester_leaving_mid_generation_still_delivers() {
        let mut agent = StubAgent::replying(generated("s(\"bd*4\")", true));
        agent.delay = Duration::from_millis(200);
        let fx = Fixture::with_agent("s(\"bd\")", agent, Duration::from_secs(5)).await;
        let (_host, mut rx_host) = fx.join("Hostess", Role::Host).await;
        let (viewer, _rx_viewer) = fx.join("Vee", Role::Viewer).await;
        drain(&mut rx_host);

        fx.hub.dispatch(inbound(&viewer, MessageType::AgentRequest, request("faster"))).await;
        fx.hub.unregister(&viewer).await;

        let mut kinds = Vec::new();
        while !kinds.contains(&MessageType::AgentResponse) {
            kinds.push(recv(&mut rx_host).await.kind);
        }
        assert!(kinds.contains(&MessageType::UserLeft));
        assert_eq!(fx.code().await, "s(\"bd*4\")");
        assert_eq!(fx.repo.messages(&fx.session).len(), 2);
    }

    #[tokio::test]
    async fn ping_is_answered_while_generating() {
        let mut agent = StubAgent::replying(generated("s(\"hh*8\")", true));
        agent.delay = Duration::from_millis(300);
        let fx = Fixture::with_agent("", agent, Duration::from_secs(5)).await;
        let (host, mut rx_host) = fx.join("Hostess", Role::Host).await;

        fx.hub.dispatch(inbound(&host, MessageType::AgentRequest, request("hats"))).await;
        fx.hub.dispatch(inbound(&host, MessageType::Ping, serde_json::json!({}))).await;

        assert_eq!(recv(&mut rx_host).await.kind, MessageType::Pong);
        assert_eq!(recv(&mut rx_host).await.kind, MessageType::AgentResponse);
    }
}
