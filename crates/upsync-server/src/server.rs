//! Server assembly and the serve loop.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use upsync_core::Result;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// The upsync HTTP server.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Creates a server over the given configuration and state.
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Builds the application router.
    #[must_use]
    pub fn router(&self) -> Router {
        app_router(self.state.clone())
    }

    /// Binds the listen socket and serves until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn serve(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Creates the application router over the given state.
#[must_use]
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/ClientWebService/client.asmx",
            post(routes::client::client_web_service),
        )
        .route(
            "/SimpleAuthWebService/SimpleAuth.asmx",
            post(routes::stubs::simple_auth),
        )
        .route(
            "/ReportingWebService/WebService.asmx",
            post(routes::stubs::reporting),
        )
        .route("/Content/:directory/:name", get(routes::content::content))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
    })
}
