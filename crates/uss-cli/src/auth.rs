//! JWT generation for local testing.
//!
//! The server accepts these tokens when `USS_JWT_SECRET` matches the secret
//! used here, or when it runs without a secret (signature not verified).

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// JWT claims understood by the server's scope middleware.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    aud: String,
    /// Scope (space-separated)
    scope: String,
    exp: i64,
    iat: i64,
}

/// Configuration for token generation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Space-separated list of scopes
    pub scopes: String,
    /// Token audience (checked when the server sets USS_JWT_AUDIENCE)
    pub audience: String,
    pub expiry_minutes: i64,
    /// HS256 signing secret
    pub secret: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            scopes: "interuss.flight_planning.plan interuss.flight_planning.direct_automated_test"
                .to_string(),
            audience: "localhost".to_string(),
            expiry_minutes: 60,
            secret: "dummy-secret".to_string(),
        }
    }
}

/// Generate an HS256 JWT carrying `config.scopes`.
///
/// # Example
/// ```
/// use uss_cli::auth::generate_dummy_token;
///
/// let token = generate_dummy_token(None).unwrap();
/// assert_eq!(token.split('.').count(), 3);
/// ```
pub fn generate_dummy_token(
    config: Option<TokenConfig>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let config = config.unwrap_or_default();
    let now = Utc::now().timestamp();

    let claims = Claims {
        iss: "dummy".to_string(),
        sub: "uss-cli".to_string(),
        aud: config.audience,
        scope: config.scopes,
        exp: now + config.expiry_minutes * 60,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}
