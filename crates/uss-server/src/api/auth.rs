//! Scope enforcement for protected endpoints.
//!
//! Expected header format: `Authorization: Bearer <jwt>` where the JWT carries
//! a space-separated `scope` claim.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::Config;

pub const SCOPE_FLIGHT_PLANNING: &str = "interuss.flight_planning.plan";
pub const SCOPE_DIRECT_AUTOMATED_TEST: &str = "interuss.flight_planning.direct_automated_test";
pub const SCOPE_STRATEGIC_COORDINATION: &str = "utm.strategic_coordination";
pub const SCOPE_INJECT_TEST_DATA: &str = "utm.inject_test_data";

/// Token checks shared by every guarded route group.
#[derive(Debug, Clone)]
pub struct ScopeSettings {
    pub enforce: bool,
    pub secret: Option<String>,
    pub audience: Option<String>,
}

impl ScopeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enforce: config.enforce_scopes,
            secret: config.jwt_secret.clone(),
            audience: config.jwt_audience.clone(),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if self.secret.is_none() {
            validation.insecure_disable_signature_validation();
        }
        validation
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.as_deref().unwrap_or_default().as_bytes())
    }
}

/// State for [`require_scope`]: the settings plus the scope a route needs.
#[derive(Clone)]
pub struct ScopeGuard {
    settings: Arc<ScopeSettings>,
    scope: Arc<str>,
}

impl ScopeGuard {
    pub fn new(settings: Arc<ScopeSettings>, scope: impl Into<Arc<str>>) -> Self {
        Self {
            settings,
            scope: scope.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScopeClaims {
    #[serde(default)]
    scope: String,
}

fn reject(status: StatusCode, error: &str, hint: String) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "hint": hint
        })),
    )
        .into_response()
}

/// Middleware that requires a bearer JWT granting the guard's scope.
pub async fn require_scope(
    State(guard): State<ScopeGuard>,
    request: Request,
    next: Next,
) -> Response {
    if !guard.settings.enforce {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(auth) if auth.starts_with("Bearer ") => auth.trim_start_matches("Bearer ").trim(),
        Some(_) => {
            return reject(
                StatusCode::BAD_REQUEST,
                "Invalid Authorization header format",
                "expected: Bearer <token>".to_string(),
            )
        }
        None => {
            return reject(
                StatusCode::UNAUTHORIZED,
                "Authorization required",
                format!("token must grant scope {}", guard.scope),
            )
        }
    };

    let claims = match decode::<ScopeClaims>(
        token,
        &guard.settings.decoding_key(),
        &guard.settings.validation(),
    ) {
        Ok(data) => data.claims,
        Err(err) => {
            let status = match err.kind() {
                ErrorKind::ExpiredSignature
                | ErrorKind::ImmatureSignature
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAudience => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            };
            tracing::debug!("Rejected access token: {}", err);
            return reject(status, "Invalid access token", err.to_string());
        }
    };

    if claims.scope.split_whitespace().any(|scope| scope == &*guard.scope) {
        next.run(request).await
    } else {
        reject(
            StatusCode::FORBIDDEN,
            "Missing scope",
            format!("token must grant scope {}", guard.scope),
        )
    }
}
