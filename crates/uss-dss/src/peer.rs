//! Client for other USSes' operational intent endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use uss_core::models::{OperationalIntent, OperationalIntentDetails, SubscriptionState};

use crate::auth::{CredentialProvider, TokenType};
use crate::error::PeerError;

const USS_API_PREFIX: &str = "/uss/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetOperationalIntentDetailsResponse {
    pub operational_intent: OperationalIntent,
}

/// Change notification. `operational_intent` is absent when the intent was
/// removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutOperationalIntentDetailsParameters {
    pub operational_intent_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_intent: Option<OperationalIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_intent_details: Option<OperationalIntentDetails>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionState>,
}

/// Audience for a peer is the host of its base URL.
pub fn audience_for(uss_base_url: &str) -> Result<String, PeerError> {
    Url::parse(uss_base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or_else(|| PeerError::InvalidUrl(uss_base_url.to_string()))
}

#[derive(Clone)]
pub struct PeerUssClient {
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
    request_id: Option<String>,
}

impl PeerUssClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            credentials,
            request_id: None,
        }
    }

    pub fn with_request_id(&self, request_id: Option<String>) -> Self {
        let mut scoped = self.clone();
        scoped.request_id = request_id.filter(|value| !value.trim().is_empty());
        scoped
    }

    fn apply_request_id(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_id.as_deref() {
            Some(value) => request.header("X-Request-ID", value),
            None => request,
        }
    }

    async fn bearer(&self, uss_base_url: &str) -> Result<String, PeerError> {
        let audience = audience_for(uss_base_url)?;
        Ok(self.credentials.get_token(&audience, TokenType::Scd).await?)
    }

    /// Fetch the full intent (reference with OVN plus details) from its manager.
    pub async fn get_operational_intent_details(
        &self,
        uss_base_url: &str,
        id: Uuid,
    ) -> Result<OperationalIntent, PeerError> {
        let token = self.bearer(uss_base_url).await?;
        let url = format!(
            "{}{}/operational_intents/{}",
            uss_base_url.trim_end_matches('/'),
            USS_API_PREFIX,
            id
        );
        let response = self
            .apply_request_id(self.client.get(&url).bearer_auth(token))
            .send()
            .await
            .map_err(|err| PeerError::from_transport(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let body: GetOperationalIntentDetailsResponse =
            response.json().await.map_err(|err| PeerError::Decode {
                url: url.clone(),
                message: err.to_string(),
            })?;
        Ok(body.operational_intent)
    }

    pub async fn notify_operational_intent(
        &self,
        uss_base_url: &str,
        notification: &PutOperationalIntentDetailsParameters,
    ) -> Result<(), PeerError> {
        let token = self.bearer(uss_base_url).await?;
        let url = format!(
            "{}{}/operational_intents/{}",
            uss_base_url.trim_end_matches('/'),
            USS_API_PREFIX,
            notification.operational_intent_id
        );
        let response = self
            .apply_request_id(self.client.post(&url).bearer_auth(token).json(notification))
            .send()
            .await
            .map_err(|err| PeerError::from_transport(&url, err))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PeerError::Status {
                url,
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_is_peer_host() {
        assert_eq!(
            audience_for("https://uss2.example.com:8443/base").unwrap(),
            "uss2.example.com"
        );
        assert!(matches!(
            audience_for("not a url"),
            Err(PeerError::InvalidUrl(_))
        ));
    }
}
