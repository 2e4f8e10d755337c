//! Shared-secret bearer authentication for the trigger endpoint.
//!
//! When no secret is configured every request is rejected (fail-closed).

use super::handlers::ErrorResponse;
use crate::error::{EngineError, Result};
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

#[derive(Clone)]
pub struct AuthConfig {
    /// Expected bearer token. `None` rejects everything.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    pub fn authorize(&self, headers: &HeaderMap) -> Result<()> {
        let Some(expected) = self.bearer_token.as_deref() else {
            tracing::error!("trigger has no bearer token configured -- rejecting request");
            return Err(EngineError::AuthorizationError);
        };

        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            Some(token) if token == expected => Ok(()),
            _ => Err(EngineError::AuthorizationError),
        }
    }
}

/// Middleware answering 401 unless the bearer token matches.
pub async fn require_bearer(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    match auth.authorize(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(error = %e, "trigger request rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_matching_token_accepted() {
        let auth = AuthConfig {
            bearer_token: Some("cron-secret".to_string()),
        };
        assert!(auth.authorize(&headers("Bearer cron-secret")).is_ok());
    }

    #[test]
    fn test_missing_or_wrong_token_rejected() {
        let auth = AuthConfig {
            bearer_token: Some("cron-secret".to_string()),
        };
        assert!(auth.authorize(&HeaderMap::new()).is_err());
        assert!(auth.authorize(&headers("Bearer nope")).is_err());
        assert!(auth.authorize(&headers("cron-secret")).is_err());
    }

    #[test]
    fn test_unconfigured_secret_fails_closed() {
        let auth = AuthConfig { bearer_token: None };
        assert!(matches!(
            auth.authorize(&headers("Bearer anything")),
            Err(EngineError::AuthorizationError)
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let auth = AuthConfig {
            bearer_token: Some("cron-secret".to_string()),
        };
        let debug_output = format!("{auth:?}");
        assert!(!debug_output.contains("cron-secret"));
        assert!(debug_output.contains("[redacted]"));
    }
}
