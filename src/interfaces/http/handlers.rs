//! Request handlers: `POST /v1/cycle` and `GET /health`.

use super::server::TriggerState;
use crate::application::outcome::CycleAction;
use crate::error::{EngineError, Result};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Optional JSON body of `POST /v1/cycle`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerRequest {
    #[serde(default)]
    pub action: Option<CycleAction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerQuery {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Picks the action from the JSON body, then the query string, else a full
/// cycle. An empty body is the normal cron call.
pub fn resolve_action(query: Option<&str>, body: &[u8]) -> Result<CycleAction> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<TriggerRequest>(body)
            .map_err(|e| EngineError::ValidationError(format!("invalid request body: {e}")))?
            .action
    };

    match (from_body, query) {
        (Some(action), _) => Ok(action),
        (None, Some(raw)) => raw.parse(),
        (None, None) => Ok(CycleAction::FullCycle),
    }
}

/// POST /v1/cycle
///
/// Runs the cycle on its own task so a caller that disconnects does not
/// cancel it halfway through a scan.
pub async fn post_cycle(
    State(state): State<TriggerState>,
    Query(query): Query<TriggerQuery>,
    body: Bytes,
) -> Response {
    let action = match resolve_action(query.action.as_deref(), &body) {
        Ok(action) => action,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid action").with_detail(e.to_string())),
            )
                .into_response();
        }
    };

    tracing::info!(%action, "cycle triggered");
    let coordinator = state.coordinator.clone();
    let handle = tokio::spawn(async move { coordinator.run(action).await });

    let detail = match handle.await {
        Ok(Ok(outcome)) => return (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(e)) => e.to_string(),
        Err(join_error) => join_error.to_string(),
    };

    tracing::error!(%action, %detail, "cycle failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("cycle failed").with_detail(detail)),
    )
        .into_response()
}

/// GET /health (unauthenticated)
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
