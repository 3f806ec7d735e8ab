use std::sync::Arc;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::ccsignals::{CcSignal, FingerprintCorpus};
use crate::config::Config;
use crate::models::{Envelope, ErrorResponse, Participant, Role};
use crate::services::auth_service::{authenticate, get_auth_token};
use crate::services::repository::{anonymous_display_name, RepoError};
use crate::ws::{Connection, Hub, WsError};

/// Query parameters of `GET /ws`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub session_id: Option<String>,
    pub token: Option<String>,
    pub invite: Option<String>,
    pub display_name: Option<String>,
}

type Rejection = (StatusCode, String);

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");

    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !origin_allowed(&app_state.config, origin) {
        warn!("WebSocket origin rejected: {:?}", origin);
        return reject((StatusCode::FORBIDDEN, "Origin not allowed".to_string()));
    }
    if app_state.hub.is_shutting_down() {
        return reject((StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down".to_string()));
    }

    let session_id = match params.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return reject((StatusCode::BAD_REQUEST, "session_id is required".to_string())),
    };

    let participant = match resolve_participant(&app_state, &session_id, &params, &headers).await {
        Ok(participant) => participant,
        Err(rejection) => return reject(rejection),
    };

    let initial_code = match app_state.repo.get_session_code(&session_id).await {
        Ok(code) => code,
        Err(e) => {
            warn!(session = %session_id, "Failed to load session code, starting empty: {}", e);
            String::new()
        }
    };
    if register_host_code(&app_state.corpus, &participant, &initial_code) {
        debug!(session = %session_id, "Saved session code registered as the host's content");
    }

    ws.on_upgrade(move |socket| handle_socket(socket, session_id, participant, initial_code, app_state))
}

/// Any origin outside production; in production only the configured list.
pub(crate) fn origin_allowed(config: &Config, origin: Option<&str>) -> bool {
    if !config.is_production() {
        return true;
    }
    match origin {
        Some(origin) => config.allowed_origin_list().iter().any(|allowed| allowed == origin),
        None => false,
    }
}

/// The saved code of a session is its host's own work. Stored sessions carry
/// no CC signal, so it is registered as attribution-only.
pub(crate) fn register_host_code(corpus: &FingerprintCorpus, participant: &Participant, code: &str) -> bool {
    match (participant.role, participant.user_id.as_deref()) {
        (Role::Host, Some(host)) => corpus.insert(host, CcSignal::Credit, false, code),
        _ => false,
    }
}

/// Authenticated when a token is present, otherwise anonymous through an invite.
async fn resolve_participant(
    app_state: &AppState,
    session_id: &str,
    params: &ConnectParams,
    headers: &HeaderMap,
) -> Result<Participant, Rejection> {
    let token = params
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| get_auth_token(headers).ok());
    let invite = params.invite.as_deref();

    let result = match token {
        Some(token) => {
            let claims = authenticate(&token, app_state.config.auth_jwt_secret.as_deref()).map_err(|e| {
                warn!("WebSocket authentication failed: {}", e);
                (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
            })?;
            app_state
                .repo
                .get_authenticated_participant(session_id, &claims.user_id, invite)
                .await
        }
        None => {
            let name = anonymous_display_name(params.display_name.as_deref());
            app_state.repo.add_anonymous_participant(session_id, &name, invite).await
        }
    };

    result.map_err(|e| match e {
        RepoError::NotFound => (StatusCode::NOT_FOUND, "Session not found".to_string()),
        RepoError::Forbidden => (StatusCode::FORBIDDEN, "Not allowed to join this session".to_string()),
        RepoError::Database(e) => {
            error!(session = %session_id, "Failed to resolve participant: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to join session".to_string())
        }
    })
}

fn reject((status, error): Rejection) -> Response {
    (status, Json(ErrorResponse::new(status, error))).into_response()
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    session_id: String,
    participant: Participant,
    initial_code: String,
    app_state: Arc<AppState>,
) {
    let (conn, mut outbound) = Connection::open(&session_id, participant, app_state.config.connection_buffer);
    let hub = app_state.hub.clone();

    if let Err(e) = hub.register(conn.clone(), initial_code).await {
        warn!(session = %session_id, "Refusing connection: {}", e);
        return;
    }
    info!(session = %session_id, client = %conn.id, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    // Reader: parse, stamp with the connection's identity, dispatch in order.
    let reader_hub = hub.clone();
    let reader_conn = conn.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => handle_text(&reader_hub, &reader_conn, &text).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(client = %reader_conn.id, "WebSocket read error: {}", e);
                    break;
                }
            }
        }
    });

    // Writer: drain the outbound queue until the connection is closed.
    let writer_conn = conn.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = writer_conn.closed() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    hub.unregister(&conn).await;
    info!(session = %session_id, client = %conn.id, "WebSocket connection terminated");
}

async fn handle_text(hub: &Hub, conn: &Arc<Connection>, text: &str) {
    let mut msg: Envelope = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(client = %conn.id, "Failed to parse message: {}", e);
            hub.report_error(conn, &WsError::InvalidPayload(e.to_string()));
            return;
        }
    };
    msg.session_id.clone_from(&conn.session_id);
    msg.client_id.clone_from(&conn.id);
    msg.user_id = conn.user_id().map(str::to_string);
    hub.dispatch(msg).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(environment: &str, allowed: Option<&str>) -> Config {
        Config {
            environment: environment.to_string(),
            allowed_origins: allowed.map(str::to_string),
            ..Config::default()
        }
    }

    fn participant(user_id: Option<&str>, role: Role) -> Participant {
        Participant {
            user_id: user_id.map(str::to_string),
            display_name: "P".to_string(),
            role,
            tier: crate::models::Tier::Free,
        }
    }

    #[test]
    fn only_the_host_registers_session_code() {
        let corpus = FingerprintCorpus::new(crate::ccsignals::SimHasher::default());
        let code = "note(\"c e g\").sound(\"piano\").slow(2)";

        assert!(!register_host_code(&corpus, &participant(Some("u-pat"), Role::CoAuthor), code));
        assert!(!register_host_code(&corpus, &participant(None, Role::Host), code));
        assert!(!register_host_code(&corpus, &participant(Some("u-host"), Role::Host), ""));
        assert!(corpus.is_empty());

        assert!(register_host_code(&corpus, &participant(Some("u-host"), Role::Host), code));
        // Reconnecting does not duplicate the entry
        assert!(!register_host_code(&corpus, &participant(Some("u-host"), Role::Host), code));
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.find_owned_match("u-host", code).unwrap().owner_id, "u-host");
    }

    #[test]
    fn any_origin_outside_production() {
        let cfg = config("development", None);
        assert!(origin_allowed(&cfg, None));
        assert!(origin_allowed(&cfg, Some("https://evil.example")));
    }

    #[test]
    fn production_requires_listed_origin() {
        let cfg = config("production", Some("https://app.example, https://www.app.example"));
        assert!(origin_allowed(&cfg, Some("https://www.app.example")));
        assert!(!origin_allowed(&cfg, Some("https://evil.example")));
        assert!(!origin_allowed(&cfg, None));

        let unconfigured = config("production", None);
        assert!(!origin_allowed(&unconfigured, Some("https://app.example")));
    }
}
