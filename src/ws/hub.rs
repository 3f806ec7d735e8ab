use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{Envelope, MessageType, PongPayload, UserJoinedPayload, UserLeftPayload};

use super::connection::Connection;
use super::errors::{HubError, WsError};

/// Latest known document content of a session. Holding the lock serializes
/// code updates within that session only.
pub type SessionDocument = Arc<Mutex<String>>;

/// Business logic for one message type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, hub: &Hub, conn: &Arc<Connection>, msg: &Envelope) -> Result<(), WsError>;
}

/// Handlers keyed by message kind. A kind without a handler falls back to
/// broadcasting the message verbatim to the rest of the session.
#[derive(Default, Clone)]
pub struct HandlerTable {
    pub code_update: Option<Arc<dyn MessageHandler>>,
    pub agent_request: Option<Arc<dyn MessageHandler>>,
    pub chat_message: Option<Arc<dyn MessageHandler>>,
}

impl HandlerTable {
    fn resolve(&self, kind: &MessageType) -> Option<&Arc<dyn MessageHandler>> {
        match kind {
            MessageType::CodeUpdate => self.code_update.as_ref(),
            MessageType::AgentRequest => self.agent_request.as_ref(),
            MessageType::ChatMessage => self.chat_message.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HubOptions {
    /// Pass raw error text to clients (development only)
    pub verbose_errors: bool,
}

struct SessionBucket {
    connections: HashMap<String, Arc<Connection>>,
    document: SessionDocument,
}

impl SessionBucket {
    fn new(initial_code: String) -> Self {
        Self {
            connections: HashMap::new(),
            document: Arc::new(Mutex::new(initial_code)),
        }
    }

    /// Send to every member except `exclude`. Returns how many sends succeeded.
    fn fan_out(&self, session_id: &str, text: &str, exclude: Option<&str>) -> usize {
        let mut delivered = 0;
        for (conn_id, conn) in &self.connections {
            if Some(conn_id.as_str()) == exclude {
                continue;
            }
            match conn.send_text(text.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(session = %session_id, client = %conn_id, "Failed to send message to client: {}", e),
            }
        }
        delivered
    }
}

enum HubCommand {
    Register {
        conn: Arc<Connection>,
        initial_code: String,
        done: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        conn: Arc<Connection>,
        done: oneshot::Sender<()>,
    },
}

struct HubInner {
    sessions: RwLock<HashMap<String, SessionBucket>>,
    handlers: HandlerTable,
    options: HubOptions,
    commands: mpsc::UnboundedSender<HubCommand>,
    shutdown_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
    run_loop: Mutex<Option<JoinHandle<()>>>,
}

/// Process-wide switchboard between sessions and their connections.
///
/// Membership changes are serialized through a single run loop task; reads
/// of the session map (dispatch, broadcast, counts) take a shared lock and
/// run on the caller's task, so different sessions never wait on each
/// other's handlers.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    /// Create the hub and start its run loop on the current runtime.
    pub fn spawn(handlers: HandlerTable, options: HubOptions) -> Hub {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let hub = Hub {
            inner: Arc::new(HubInner {
                sessions: RwLock::new(HashMap::new()),
                handlers,
                options,
                commands,
                shutdown_tx,
                shutting_down: AtomicBool::new(false),
                run_loop: Mutex::new(None),
            }),
        };

        let handle = tokio::spawn(hub.clone().run(command_rx, shutdown_rx));
        // Nobody else can hold the lock yet.
        if let Ok(mut slot) = hub.inner.run_loop.try_lock() {
            *slot = Some(handle);
        }
        hub
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<HubCommand>, mut shutdown: watch::Receiver<bool>) {
        info!("Hub run loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    self.close_all_connections().await;
                    break;
                }
                command = commands.recv() => match command {
                    Some(HubCommand::Register { conn, initial_code, done }) => {
                        self.register_client(conn, initial_code).await;
                        let _ = done.send(Ok(()));
                    }
                    Some(HubCommand::Unregister { conn, done }) => {
                        self.unregister_client(&conn).await;
                        let _ = done.send(());
                    }
                    None => break,
                },
            }
        }

        // Anything still queued raced with shutdown.
        commands.close();
        while let Ok(command) = commands.try_recv() {
            match command {
                HubCommand::Register { conn, done, .. } => {
                    conn.close();
                    let _ = done.send(Err(HubError::ShuttingDown));
                }
                HubCommand::Unregister { conn, done } => {
                    conn.close();
                    let _ = done.send(());
                }
            }
        }
        info!("Hub run loop stopped");
    }

    /// Add a connection to its session, creating the session with
    /// `initial_code` if it has no members yet.
    pub async fn register(&self, conn: Arc<Connection>, initial_code: String) -> Result<(), HubError> {
        if self.is_shutting_down() {
            return Err(HubError::ShuttingDown);
        }
        let (done, ack) = oneshot::channel();
        self.inner
            .commands
            .send(HubCommand::Register { conn, initial_code, done })
            .map_err(|_| HubError::Stopped)?;
        ack.await.map_err(|_| HubError::Stopped)?
    }

    /// Remove a connection and close its transport. Unknown connections are ignored.
    pub async fn unregister(&self, conn: &Arc<Connection>) {
        let (done, ack) = oneshot::channel();
        let command = HubCommand::Unregister { conn: conn.clone(), done };
        if self.inner.commands.send(command).is_err() {
            conn.close();
            return;
        }
        if ack.await.is_err() {
            conn.close();
        }
    }

    async fn register_client(&self, conn: Arc<Connection>, initial_code: String) {
        let mut sessions = self.inner.sessions.write().await;
        let bucket = sessions
            .entry(conn.session_id.clone())
            .or_insert_with(|| SessionBucket::new(initial_code));
        bucket.connections.insert(conn.id.clone(), conn.clone());

        info!(
            client = %conn.id,
            session = %conn.session_id,
            role = %conn.role(),
            name = %conn.display_name(),
            "Client registered"
        );

        let payload = UserJoinedPayload {
            user_id: conn.user_id().map(str::to_string),
            display_name: conn.display_name().to_string(),
            role: Some(conn.role().to_string()),
        };
        match Envelope::new(MessageType::UserJoined, &conn.session_id, conn.user_id(), &payload).and_then(|m| m.to_json()) {
            Ok(text) => {
                bucket.fan_out(&conn.session_id, &text, Some(&conn.id));
            }
            Err(e) => error!("Failed to encode user_joined message: {}", e),
        }
    }

    async fn unregister_client(&self, conn: &Arc<Connection>) {
        let mut sessions = self.inner.sessions.write().await;
        let Some(bucket) = sessions.get_mut(&conn.session_id) else {
            conn.close();
            return;
        };
        if bucket.connections.remove(&conn.id).is_none() {
            conn.close();
            return;
        }
        conn.close();
        info!(client = %conn.id, session = %conn.session_id, "Client unregistered");

        if bucket.connections.is_empty() {
            sessions.remove(&conn.session_id);
            info!(session = %conn.session_id, "Session has no more clients, removed");
            return;
        }

        let payload = UserLeftPayload {
            user_id: conn.user_id().map(str::to_string),
            display_name: conn.display_name().to_string(),
        };
        match Envelope::new(MessageType::UserLeft, &conn.session_id, conn.user_id(), &payload).and_then(|m| m.to_json()) {
            Ok(text) => {
                bucket.fan_out(&conn.session_id, &text, None);
            }
            Err(e) => error!("Failed to encode user_left message: {}", e),
        }
    }

    /// Route an inbound message from `msg.client_id` in `msg.session_id`.
    ///
    /// Stale messages (unknown session or sender) are logged and dropped.
    /// Handler errors go back to the sender only.
    pub async fn dispatch(&self, msg: Envelope) {
        let sender = match self.resolve_sender(&msg.session_id, &msg.client_id).await {
            Ok(sender) => sender,
            Err(e) => {
                warn!(session = %msg.session_id, client = %msg.client_id, kind = %msg.kind, "Dropping message: {}", e);
                return;
            }
        };

        let result = match &msg.kind {
            MessageType::Ping => self.reply_pong(&sender),
            kind if kind.is_server_only() => Err(WsError::ReservedType(kind.to_string())),
            kind => match self.inner.handlers.resolve(kind) {
                Some(handler) => handler.handle(self, &sender, &msg).await,
                None => {
                    self.broadcast_to_session(&msg.session_id, &msg, Some(&sender.id)).await;
                    Ok(())
                }
            },
        };

        if let Err(err) = result {
            warn!(session = %sender.session_id, client = %sender.id, kind = %msg.kind, "Handler error: {}", err);
            self.report_error(&sender, &err);
        }
    }

    async fn resolve_sender(&self, session_id: &str, client_id: &str) -> Result<Arc<Connection>, WsError> {
        let sessions = self.inner.sessions.read().await;
        let bucket = sessions.get(session_id).ok_or(WsError::SessionNotFound)?;
        bucket.connections.get(client_id).cloned().ok_or(WsError::ClientNotFound)
    }

    fn reply_pong(&self, conn: &Connection) -> Result<(), WsError> {
        let pong = PongPayload { date: Utc::now().to_rfc3339() };
        let msg = Envelope::new(MessageType::Pong, &conn.session_id, conn.user_id(), &pong)
            .map_err(|e| WsError::InvalidPayload(e.to_string()))?;
        if let Err(e) = conn.send(&msg) {
            warn!(client = %conn.id, "Failed to send pong: {}", e);
        }
        Ok(())
    }

    /// Send `err` to `conn` if it has a wire form; other kinds are only logged.
    pub fn report_error(&self, conn: &Connection, err: &WsError) {
        let Some(payload) = err.to_payload(self.inner.options.verbose_errors) else {
            return;
        };
        if let Err(e) = conn.send_error(&payload) {
            warn!(client = %conn.id, "Failed to send error to client: {}", e);
        }
    }

    /// Send to every connection in the session except `exclude`; `None`
    /// includes the original sender. Returns the number of successful sends.
    pub async fn broadcast_to_session(&self, session_id: &str, msg: &Envelope, exclude: Option<&str>) -> usize {
        let text = match msg.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(session = %session_id, "Failed to encode broadcast: {}", e);
                return 0;
            }
        };
        let sessions = self.inner.sessions.read().await;
        match sessions.get(session_id) {
            Some(bucket) => {
                let delivered = bucket.fan_out(session_id, &text, exclude);
                debug!(session = %session_id, kind = %msg.kind, delivered, "Broadcast");
                delivered
            }
            None => 0,
        }
    }

    pub async fn session_document(&self, session_id: &str) -> Option<SessionDocument> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(session_id).map(|b| b.document.clone())
    }

    pub async fn session_clients(&self, session_id: &str) -> Vec<Arc<Connection>> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .map(|b| b.connections.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get_client_count(&self, session_id: &str) -> usize {
        let sessions = self.inner.sessions.read().await;
        sessions.get(session_id).map_or(0, |b| b.connections.len())
    }

    pub async fn get_session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn get_connection_count(&self) -> usize {
        let sessions = self.inner.sessions.read().await;
        sessions.values().map(|b| b.connections.len()).sum()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Close every connection, clear all sessions and stop the run loop.
    /// Later calls and later registrations are no-ops / refused.
    pub async fn shutdown(&self) {
        if !self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            info!("Hub shutting down");
            self.inner.shutdown_tx.send_replace(true);
        }
        let handle = self.inner.run_loop.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Hub run loop ended abnormally: {}", e);
            }
        }
    }

    async fn close_all_connections(&self) {
        let mut sessions = self.inner.sessions.write().await;
        info!("Closing all WebSocket connections...");
        for (session_id, bucket) in sessions.iter() {
            for (conn_id, conn) in &bucket.connections {
                conn.close();
                debug!(session = %session_id, client = %conn_id, "Closed client");
            }
        }
        sessions.clear();
    }
}
