// API server wiring: router, middleware stack, graceful shutdown.

use axum::{middleware, routing::get, routing::post, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{middleware as api_middleware, routes};
use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::domain::{GatewayError, Result};
use crate::storage::Database;

/// Shared handles for the HTTP surface. Created at startup, torn down on
/// shutdown; nothing else is process-global.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub authenticator: Authenticator,
    pub db: Database,
}

pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind, self.config.port)
            .parse()
            .map_err(|e| GatewayError::config(format!("invalid listen address: {}", e)))
    }

    pub fn build_router(&self) -> Router {
        build_router(self.state.clone(), &self.config)
    }

    pub async fn run(self, shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let addr = self.socket_addr()?;
        let app = self.build_router();

        info!("API server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let mut shutdown = shutdown;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await?;

        Ok(())
    }
}

pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let authed = Router::new()
        .route("/v1/chat/completions", post(routes::chat_completions))
        .route("/v1/models", get(routes::list_models))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(authed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_secs,
                )))
                .layer(middleware::from_fn(
                    api_middleware::request_id_middleware,
                )),
        )
        .with_state(state)
}
