use crate::config::Config;
use crate::streaming::{self, ContentTypeResolver, FsMediaStore, GuessContentType, MediaStore};
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Response headers browser players need to read on cross-origin streams.
const EXPOSED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
];

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Storage for uploaded tracks
    pub store: Arc<dyn MediaStore>,
    /// MIME type lookup for streamed tracks
    pub content_types: Arc<dyn ContentTypeResolver>,
}

impl AppContext {
    /// Context serving tracks from the configured music directory.
    pub fn new(config: Config) -> Self {
        let store = FsMediaStore::new(config.storage.music_dir.clone());
        Self::with_store(config, Arc::new(store))
    }

    /// Context over an arbitrary store.
    pub fn with_store(config: Config, store: Arc<dyn MediaStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            content_types: Arc::new(GuessContentType),
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers([header::RANGE])
        .expose_headers(EXPOSED_HEADERS);

    let covers_dir = ctx.config.storage.covers_dir.clone();

    let mut app = Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api/tracks", streaming::tracks_router());

    if covers_dir.is_dir() {
        tracing::info!("Serving covers from {:?}", covers_dir);
        app = app.nest_service("/covers", ServeDir::new(covers_dir));
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    tracing::info!("Streaming tracks from {:?}", config.storage.music_dir);

    let app = create_router(AppContext::new(config));

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
