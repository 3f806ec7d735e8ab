use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::ccsignals::{DetectorConfig, FingerprintCorpus, MemoryLockStore, PasteLockDetector, SimHasher};
use crate::models::{Envelope, MessageType, Participant, Role, Tier};
use crate::services::agent::{Agent, AgentError, GenerateRequest, GenerateResponse};
use crate::services::repository::{MemoryRepository, Repository};
use crate::ws::{Connection, Hub, HubOptions};

use super::handler_table;

pub(crate) type Rx = mpsc::Receiver<String>;

/// Agent returning a fixed reply after an optional delay.
pub(crate) struct StubAgent {
    pub reply: Mutex<Option<GenerateResponse>>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<GenerateRequest>>,
}

impl StubAgent {
    pub fn replying(reply: GenerateResponse) -> Self {
        Self {
            reply: Mutex::new(Some(reply)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for StubAgent {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.reply.lock().unwrap().clone();
        reply.ok_or(AgentError::Status { status: 502, body: "bad gateway".to_string() })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

pub(crate) fn generated(code: &str, actionable: bool) -> GenerateResponse {
    GenerateResponse {
        code: code.to_string(),
        docs_retrieved: 2,
        examples_retrieved: 3,
        model: "test-model".to_string(),
        is_actionable: actionable,
        clarifying_questions: Vec::new(),
    }
}

/// A hub wired with the real handlers over in-memory collaborators and one session.
pub(crate) struct Fixture {
    pub hub: Hub,
    pub repo: Arc<MemoryRepository>,
    pub detector: Arc<PasteLockDetector>,
    pub corpus: Arc<FingerprintCorpus>,
    pub agent: Arc<StubAgent>,
    pub session: String,
}

impl Fixture {
    pub async fn new(initial_code: &str) -> Self {
        Self::with_agent(initial_code, StubAgent::replying(generated("s(\"bd*2\")", true)), Duration::from_secs(5)).await
    }

    pub async fn with_agent(initial_code: &str, agent: StubAgent, agent_timeout: Duration) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let session = repo.create_session("host-user", initial_code);
        let corpus = Arc::new(FingerprintCorpus::new(SimHasher::default()));
        let detector = Arc::new(
            PasteLockDetector::new(Arc::new(MemoryLockStore::new()), DetectorConfig::default())
                .with_corpus(corpus.clone()),
        );
        let agent = Arc::new(agent);
        let handlers = handler_table(repo.clone(), detector.clone(), agent.clone(), agent_timeout);
        let hub = Hub::spawn(handlers, HubOptions::default());
        Self { hub, repo, detector, corpus, agent, session }
    }

    pub async fn join(&self, name: &str, role: Role) -> (Arc<Connection>, Rx) {
        let participant = Participant {
            user_id: Some(format!("user-{}", name.to_lowercase())),
            display_name: name.to_string(),
            role,
            tier: Tier::Free,
        };
        let (conn, rx) = Connection::open(&self.session, participant, 64);
        let initial = self.repo.get_session_code(&self.session).await.unwrap();
        self.hub.register(conn.clone(), initial).await.unwrap();
        (conn, rx)
    }

    pub async fn code(&self) -> String {
        self.repo.get_session_code(&self.session).await.unwrap()
    }
}

/// Next frame, waiting for work that finishes off the dispatching task.
pub(crate) async fn recv(rx: &mut Rx) -> Envelope {
    let text = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("connection queue closed");
    serde_json::from_str(&text).unwrap()
}

pub(crate) fn drain(rx: &mut Rx) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(text) = rx.try_recv() {
        out.push(serde_json::from_str(&text).unwrap());
    }
    out
}

/// An inbound frame as the reader task would stamp it.
pub(crate) fn inbound(conn: &Connection, kind: MessageType, payload: serde_json::Value) -> Envelope {
    let mut msg = Envelope::new(kind, &conn.session_id, conn.user_id(), &payload).unwrap();
    msg.client_id = conn.id.clone();
    msg
}
