use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_sessions: u32,
    pub n_conn: u32,
    pub paste_lock_store: String,
    pub fingerprint_corpus_entries: u32,
    pub agent_configured: bool,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
