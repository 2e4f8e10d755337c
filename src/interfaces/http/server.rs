//! Trigger HTTP server built on axum.

use super::auth::{AuthConfig, require_bearer};
use super::handlers;
use crate::application::coordinator::BatchCoordinator;
use crate::config::TriggerConfig;
use crate::error::Result;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

/// Shared state for the trigger handlers.
#[derive(Clone)]
pub struct TriggerState {
    pub coordinator: Arc<BatchCoordinator>,
    pub auth: AuthConfig,
}

/// Builds the trigger router:
/// - `GET /health` (public)
/// - `POST /v1/cycle` (bearer auth)
pub fn router(state: TriggerState) -> Router {
    let public_routes = Router::new().route("/health", get(handlers::get_health));

    let api_routes = Router::new()
        .route("/v1/cycle", post(handlers::post_cycle))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_bearer,
        ))
        .with_state(state);

    public_routes.merge(api_routes)
}

/// Binds `bind_address:port` and serves until Ctrl-C.
pub async fn serve(config: &TriggerConfig, state: TriggerState) -> Result<()> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("trigger server listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("trigger server stopped");
    Ok(())
}
