//! Server configuration from environment.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use uss_dss::{CredentialProvider, OAuthCredentialProvider, OAuthSettings, StaticCredentialProvider};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Public base URL of this USS, advertised to the DSS and peers.
    pub uss_base_url: String,
    pub dss_base_url: String,
    pub dss_audience: String,
    pub dss_auth_url: String,
    pub dss_auth_token_endpoint: String,
    pub dss_client_id: String,
    pub dss_client_secret: String,
    pub dss_self_audience: Option<String>,
    pub dss_static_token: String,
    pub allow_dummy_dss_auth: bool,
    /// Empty selects the in-memory repository.
    pub database_path: String,
    pub database_max_connections: u32,
    pub dss_timeout_secs: u64,
    pub peer_notification_timeout_secs: u64,
    pub token_refresh_margin_secs: u64,
    pub enforce_scopes: bool,
    pub jwt_audience: Option<String>,
    /// HS256 secret; when absent token signatures are not checked.
    pub jwt_secret: Option<String>,
    pub read_scope: String,
    pub log_json: bool,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let server_port = env_parse("USS_PORT", 8080);
        Self {
            server_port,
            uss_base_url: env_string("USS_BASE_URL", &format!("http://localhost:{}", server_port)),
            dss_base_url: env_string("DSS_BASE_URL", "http://localhost:8082"),
            dss_audience: env_string("DSS_AUDIENCE", "localhost"),
            dss_auth_url: env_string("DSS_AUTH_URL", ""),
            dss_auth_token_endpoint: env_string("DSS_AUTH_TOKEN_ENDPOINT", "/token"),
            dss_client_id: env_string("AUTH_DSS_CLIENT_ID", ""),
            dss_client_secret: env_string("AUTH_DSS_CLIENT_SECRET", ""),
            dss_self_audience: env_optional("DSS_SELF_AUDIENCE"),
            dss_static_token: env_string("DSS_STATIC_TOKEN", ""),
            allow_dummy_dss_auth: env_flag("ALLOW_DUMMY_DSS_AUTH", false),
            database_path: env_string("USS_DATABASE_PATH", ""),
            database_max_connections: env_parse("USS_DATABASE_MAX_CONNECTIONS", 5),
            dss_timeout_secs: env_parse("DSS_TIMEOUT_SECS", 10),
            peer_notification_timeout_secs: env_parse("PEER_NOTIFICATION_TIMEOUT_SECS", 5),
            token_refresh_margin_secs: env_parse("TOKEN_REFRESH_MARGIN_SECS", 120),
            enforce_scopes: env_flag("USS_ENFORCE_SCOPES", true),
            jwt_audience: env_optional("USS_JWT_AUDIENCE"),
            jwt_secret: env_optional("USS_JWT_SECRET"),
            read_scope: env_string("USS_READ_SCOPE", "uss.read"),
            log_json: env_flag("USS_LOG_JSON", false),
        }
    }

    pub fn dss_timeout(&self) -> Duration {
        Duration::from_secs(self.dss_timeout_secs)
    }

    pub fn peer_notification_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_notification_timeout_secs)
    }

    /// OAuth settings when an auth server is configured.
    pub fn dss_oauth_settings(&self) -> Option<OAuthSettings> {
        let auth_url = self.dss_auth_url.trim();
        if auth_url.is_empty() {
            return None;
        }
        Some(OAuthSettings {
            token_url: format!(
                "{}{}",
                auth_url.trim_end_matches('/'),
                self.dss_auth_token_endpoint
            ),
            client_id: self.dss_client_id.clone(),
            client_secret: self.dss_client_secret.clone(),
            self_audience: self.dss_self_audience.clone(),
            refresh_margin: Duration::from_secs(self.token_refresh_margin_secs),
            timeout: self.dss_timeout(),
        })
    }

    /// Build the process-wide credential provider.
    pub fn credential_provider(&self) -> Arc<dyn CredentialProvider> {
        match self.dss_oauth_settings() {
            Some(settings) => Arc::new(OAuthCredentialProvider::new(settings)),
            None => Arc::new(StaticCredentialProvider::new(
                self.dss_static_token.clone(),
                self.allow_dummy_dss_auth,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_settings_join_url_and_endpoint() {
        let mut config = Config::from_env();
        config.dss_auth_url = "http://auth.local/".to_string();
        config.dss_auth_token_endpoint = "/oauth/token/".to_string();
        let settings = config.dss_oauth_settings().unwrap();
        assert_eq!(settings.token_url, "http://auth.local/oauth/token/");

        config.dss_auth_url = String::new();
        assert!(config.dss_oauth_settings().is_none());
    }
}
