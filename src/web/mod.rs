//! Web layer module
//!
//! A small JSON API over the channel catalog and the refresh coordinator.
//! Handlers are thin and delegate straight to those two services.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::catalog::ChannelCatalog;
use crate::config::WebConfig;
use crate::ingestor::RefreshCoordinator;

pub mod handlers;
pub mod responses;

pub use responses::{handle_error, handle_result, ApiResponse};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ChannelCatalog>,
    pub coordinator: Arc<RefreshCoordinator>,
    /// Where listings created through the API cache their downloads
    pub listing_dir: PathBuf,
    /// Cron expression used when a create request omits one
    pub default_cron: String,
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/channels", get(handlers::search_channels))
        .route("/channels/{sid}", get(handlers::get_channel))
        .route(
            "/schedules",
            get(handlers::list_schedules)
                .post(handlers::create_schedule)
                .delete(handlers::delete_schedule),
        )
        .route("/schedules/refresh", post(handlers::refresh_schedule))
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &WebConfig, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve_with_cancellation(self, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.addr, e))?;
        info!("Web server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!("Web server stopped");
        Ok(())
    }
}
