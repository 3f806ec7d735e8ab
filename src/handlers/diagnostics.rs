use crate::{app::AppState, auth::auth, models::{DiagnosticsResponse, ErrorResponse}, services::auth_service::AuthClaims};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Session, connection and host statistics (admin only)
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    auth::ensure_admin(&claims)?;

    let n_sessions = app_state.hub.get_session_count().await as u32;
    let n_conn = app_state.hub.get_connection_count().await as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Sessions: {}, Conn: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_sessions,
        n_conn
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_sessions,
            n_conn,
            paste_lock_store: app_state.lock_store_kind.to_string(),
            fingerprint_corpus_entries: app_state.corpus.len() as u32,
            agent_configured: app_state.agent.name() != "disabled",
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
