//! Bearer credentials for DSS and peer calls (OAuth client credentials or a
//! static token).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::CredentialError;

const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Audiences served by a local sandbox auth server.
const LOCAL_AUDIENCES: [&str; 2] = ["localhost", "host.docker.internal"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Scd,
    Rid,
    Cmsa,
}

impl TokenType {
    pub fn scopes(&self) -> &'static str {
        match self {
            Self::Scd => "utm.strategic_coordination utm.conformance_monitoring_sa",
            Self::Rid => "rid.service_provider rid.display_provider",
            Self::Cmsa => "utm.conformance_monitoring_sa",
        }
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_token(&self, audience: &str, token_type: TokenType)
        -> Result<String, CredentialError>;
}

/// Generate an unsigned JWT accepted by sandbox DSS deployments.
pub fn generate_dummy_jwt(audience: &str, scopes: &str) -> String {
    let header = serde_json::json!({"alg": "HS256", "typ": "JWT"});
    let now = Utc::now().timestamp();
    let payload = serde_json::json!({
        "iss": "https://uss-server.local",
        "sub": "uss-server",
        "aud": audience,
        "scope": scopes,
        "exp": now + DEFAULT_TOKEN_TTL_SECS as i64,
        "iat": now
    });

    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(b"dummy");

    format!("{}.{}.{}", header_b64, payload_b64, signature_b64)
}

/// Fixed token, or a dummy JWT when explicitly allowed.
pub struct StaticCredentialProvider {
    token: Option<String>,
    allow_dummy: bool,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>, allow_dummy: bool) -> Self {
        let token = token.into();
        let token = token.trim();
        Self {
            token: (!token.is_empty()).then(|| token.to_string()),
            allow_dummy,
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_token(
        &self,
        audience: &str,
        token_type: TokenType,
    ) -> Result<String, CredentialError> {
        match &self.token {
            Some(token) => Ok(token.clone()),
            None if self.allow_dummy => Ok(generate_dummy_jwt(audience, token_type.scopes())),
            None => Err(CredentialError::Missing),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Full token URL (auth base URL + token endpoint).
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Audience requested from a local sandbox auth server.
    pub self_audience: Option<String>,
    /// Cached tokens with less remaining validity are refreshed.
    pub refresh_margin: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Serialize)]
struct OAuthTokenRequest<'a> {
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    intended_audience: Option<&'a str>,
    scope: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

type CacheKey = (String, TokenType);

/// Client-credentials provider with a per-(audience, token type) TTL cache.
pub struct OAuthCredentialProvider {
    settings: OAuthSettings,
    client: Client,
    cache: DashMap<CacheKey, CachedToken>,
    refresh_locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl OAuthCredentialProvider {
    pub fn new(settings: OAuthSettings) -> Self {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            settings,
            client,
            cache: DashMap::new(),
            refresh_locks: DashMap::new(),
        }
    }

    fn cached_token(&self, key: &CacheKey) -> Option<String> {
        let cached = self.cache.get(key)?;
        let remaining = cached.expires_at.saturating_duration_since(Instant::now());
        (remaining >= self.settings.refresh_margin).then(|| cached.access_token.clone())
    }

    async fn fetch_token(
        &self,
        audience: &str,
        token_type: TokenType,
    ) -> Result<CachedToken, CredentialError> {
        let scope = token_type.scopes();
        let request = if LOCAL_AUDIENCES.contains(&audience) {
            OAuthTokenRequest {
                grant_type: "client_credentials",
                client_id: None,
                client_secret: None,
                intended_audience: self.settings.self_audience.as_deref(),
                scope,
                issuer: (audience == "localhost").then_some(audience),
            }
        } else {
            OAuthTokenRequest {
                grant_type: "client_credentials",
                client_id: Some(self.settings.client_id.as_str()),
                client_secret: Some(self.settings.client_secret.as_str()),
                intended_audience: Some(audience),
                scope,
                issuer: None,
            }
        };

        let response = self
            .client
            .get(self.settings.token_url.as_str())
            .query(&request)
            .send()
            .await
            .map_err(|err| CredentialError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Status(status.as_u16()));
        }

        let payload: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|err| CredentialError::Decode(err.to_string()))?;

        let ttl = payload.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        Ok(CachedToken {
            access_token: payload.access_token,
            expires_at: Instant::now() + Duration::from_secs(ttl),
        })
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    async fn get_token(
        &self,
        audience: &str,
        token_type: TokenType,
    ) -> Result<String, CredentialError> {
        let key: CacheKey = (audience.to_string(), token_type);
        if let Some(token) = self.cached_token(&key) {
            return Ok(token);
        }

        // At most one refresh per key; latecomers re-check the cache.
        let lock = self.refresh_locks.entry(key.clone()).or_default().clone();
        let _guard = lock.lock().await;
        if let Some(token) = self.cached_token(&key) {
            return Ok(token);
        }

        let fresh = self.fetch_token(audience, token_type).await.map_err(|err| {
            tracing::error!("Credential request for audience {} failed: {}", audience, err);
            err
        })?;
        let token = fresh.access_token.clone();
        self.cache.insert(key, fresh);
        tracing::debug!("Refreshed {:?} token for audience {}", token_type, audience);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> OAuthSettings {
        OAuthSettings {
            token_url: format!("{}/oauth/token/", server.uri()),
            client_id: "uss".to_string(),
            client_secret: "secret".to_string(),
            self_audience: Some("self.local".to_string()),
            refresh_margin: Duration::from_secs(120),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn caches_token_per_audience_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token/"))
            .and(query_param("intended_audience", "dss.example"))
            .and(query_param("client_id", "uss"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"access_token": "tok-1", "expires_in": 3600}),
            ))
            .expect(2)
            .mount(&server)
            .await;

        let provider = OAuthCredentialProvider::new(settings(&server));
        for _ in 0..3 {
            let token = provider.get_token("dss.example", TokenType::Scd).await.unwrap();
            assert_eq!(token, "tok-1");
        }
        // Different token type is a different cache entry.
        provider.get_token("dss.example", TokenType::Rid).await.unwrap();
    }

    #[tokio::test]
    async fn refreshes_when_inside_margin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"access_token": "short", "expires_in": 60}),
            ))
            .expect(2)
            .mount(&server)
            .await;

        let provider = OAuthCredentialProvider::new(settings(&server));
        provider.get_token("dss.example", TokenType::Scd).await.unwrap();
        provider.get_token("dss.example", TokenType::Scd).await.unwrap();
    }

    #[tokio::test]
    async fn local_audience_uses_sandbox_form() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token/"))
            .and(query_param("intended_audience", "self.local"))
            .and(query_param("issuer", "localhost"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "local"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = OAuthCredentialProvider::new(settings(&server));
        let token = provider.get_token("localhost", TokenType::Scd).await.unwrap();
        assert_eq!(token, "local");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = OAuthCredentialProvider::new(settings(&server));
        let err = provider
            .get_token("dss.example", TokenType::Scd)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Status(500)));
    }

    #[tokio::test]
    async fn static_provider_falls_back_to_dummy_only_when_allowed() {
        let fixed = StaticCredentialProvider::new("abc", false);
        assert_eq!(fixed.get_token("dss", TokenType::Scd).await.unwrap(), "abc");

        let dummy = StaticCredentialProvider::new("  ", true);
        let token = dummy.get_token("dss", TokenType::Scd).await.unwrap();
        assert_eq!(token.split('.').count(), 3);

        let none = StaticCredentialProvider::new("", false);
        assert!(matches!(
            none.get_token("dss", TokenType::Scd).await,
            Err(CredentialError::Missing)
        ));
    }
}
