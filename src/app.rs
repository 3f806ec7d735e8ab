use std::sync::Arc;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::ccsignals::{FingerprintCorpus, LockStore, MemoryLockStore, PasteLockDetector, RedisLockStore, SimHasher};
use crate::clients::HttpAgentClient;
use crate::config::Config;
use crate::db::PgRepository;
use crate::docs::ApiDoc;
use crate::routes::create_api_routes;
use crate::services::agent::{Agent, DisabledAgent};
use crate::services::repository::{MemoryRepository, Repository};
use crate::websocket::{handler_table, websocket_handler};
use crate::ws::{Hub, HubOptions};

/// Shared state behind every HTTP and WebSocket handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Hub,
    pub repo: Arc<dyn Repository>,
    pub detector: Arc<PasteLockDetector>,
    /// Known protected content; detected pastes matching an entry name its owner
    pub corpus: Arc<FingerprintCorpus>,
    pub agent: Arc<dyn Agent>,
    /// Which paste-lock backend is in use ("memory" or "redis")
    pub lock_store_kind: &'static str,
}

impl AppState {
    /// Wire the collaborators together and start the hub run loop.
    pub fn new(
        config: Config,
        repo: Arc<dyn Repository>,
        lock_store: Arc<dyn LockStore>,
        lock_store_kind: &'static str,
        agent: Arc<dyn Agent>,
    ) -> Arc<Self> {
        let corpus = Arc::new(FingerprintCorpus::new(SimHasher::new(config.simhash_shingle_size)));
        let detector = Arc::new(
            PasteLockDetector::new(lock_store, config.detector_config()).with_corpus(corpus.clone()),
        );
        let handlers = handler_table(repo.clone(), detector.clone(), agent.clone(), config.agent_timeout());
        let hub = Hub::spawn(handlers, HubOptions { verbose_errors: config.is_development() });

        Arc::new(Self {
            config: Arc::new(config),
            hub,
            repo,
            detector,
            corpus,
            agent,
            lock_store_kind,
        })
    }

    /// Pick backends from the configuration. Postgres, Redis and the HTTP
    /// agent are used when configured and reachable; otherwise the
    /// in-process fallbacks are used.
    pub async fn from_config(config: Config) -> Arc<Self> {
        let repo: Arc<dyn Repository> = match &config.db_url {
            Some(db_url) => match PgRepository::connect(db_url).await {
                Ok(repo) => {
                    info!("Database initialized successfully");
                    Arc::new(repo)
                }
                Err(e) => {
                    error!("Failed to initialize database: {}", e);
                    warn!("Falling back to the in-memory session repository");
                    Arc::new(MemoryRepository::ephemeral())
                }
            },
            None => {
                warn!("No database URL configured - using the in-memory session repository");
                Arc::new(MemoryRepository::ephemeral())
            }
        };

        let (lock_store, lock_store_kind): (Arc<dyn LockStore>, &'static str) = match &config.redis_url {
            Some(redis_url) => match RedisLockStore::connect(redis_url).await {
                Ok(store) => (Arc::new(store), "redis"),
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    warn!("Paste locks will not be shared between instances");
                    (Arc::new(MemoryLockStore::new()), "memory")
                }
            },
            None => (Arc::new(MemoryLockStore::new()), "memory"),
        };

        let agent: Arc<dyn Agent> = match &config.agent_url {
            Some(agent_url) => match HttpAgentClient::new(agent_url, config.agent_timeout()) {
                Ok(client) => {
                    info!("Generation agent at {}", agent_url);
                    Arc::new(client)
                }
                Err(e) => {
                    error!("Failed to build agent client: {}", e);
                    Arc::new(DisabledAgent)
                }
            },
            None => {
                warn!("No agent URL configured - agent requests will fail");
                Arc::new(DisabledAgent)
            }
        };

        Self::new(config, repo, lock_store, lock_store_kind, agent)
    }
}

/// Assemble the WebSocket endpoint, the API routes and Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(app_state.clone())
        // Mount API routes
        .nest("/api", create_api_routes(app_state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        return if config.is_development() { CorsLayer::permissive() } else { CorsLayer::new() };
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
