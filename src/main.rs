use livecode_collab::{build_router, AppState, Config};
use std::panic;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "livecode_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration; a bad value must not silently drop the rest
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Refusing to start with invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let address = config.server_address();

    let app_state = AppState::from_config(config).await;
    let hub = app_state.hub.clone();
    let app_routes = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        hub.shutdown().await;
    };

    if let Err(e) = axum::serve(listener, app_routes).with_graceful_shutdown(shutdown).await {
        error!("Server error: {}", e);
    }
    info!("Server stopped");
}
