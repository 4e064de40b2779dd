//! DSS HTTP client for operational intent references.
//!
//! The client only talks to the DSS and returns structured results; it never
//! touches local state and never retries.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use uss_core::models::{
    OperationalIntentReference, OperationalIntentState, SubscriberToNotify, Volume4D,
};

use crate::auth::{CredentialProvider, TokenType};
use crate::error::DssError;

const DSS_API_PREFIX: &str = "/dss/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplicitSubscriptionParameters {
    pub uss_base_url: String,
    #[serde(default)]
    pub notify_for_constraints: bool,
}

/// Body of the create and update calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutOperationalIntentReferenceParameters {
    pub extents: Vec<Volume4D>,
    #[serde(default)]
    pub key: Vec<String>,
    pub state: OperationalIntentState,
    pub uss_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_subscription: Option<ImplicitSubscriptionParameters>,
}

/// Response of every write call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOperationalIntentReferenceResponse {
    #[serde(default)]
    pub subscribers: Vec<SubscriberToNotify>,
    pub operational_intent_reference: OperationalIntentReference,
}

#[derive(Debug, Deserialize)]
struct GetOperationalIntentReferenceResponse {
    operational_intent_reference: OperationalIntentReference,
}

#[derive(Debug, Serialize)]
struct QueryOperationalIntentReferenceParameters<'a> {
    area_of_interest: &'a Volume4D,
}

#[derive(Debug, Deserialize)]
struct QueryOperationalIntentReferenceResponse {
    #[serde(default)]
    operational_intent_references: Vec<OperationalIntentReference>,
}

/// How a 409 is read for a given call.
#[derive(Debug, Clone, Copy)]
enum CallKind {
    Create,
    Versioned,
    Read,
}

#[derive(Clone)]
pub struct DssClient {
    client: Client,
    base_url: String,
    audience: String,
    credentials: Arc<dyn CredentialProvider>,
    request_id: Option<String>,
}

impl DssClient {
    pub fn new(
        base_url: impl Into<String>,
        audience: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            audience: audience.into(),
            credentials,
            request_id: None,
        }
    }

    /// Copy of this client that forwards `request_id` as `X-Request-ID`.
    pub fn with_request_id(&self, request_id: Option<String>) -> Self {
        let mut scoped = self.clone();
        scoped.request_id = request_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        scoped
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn apply_request_id(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_id.as_deref() {
            Some(value) => request.header("X-Request-ID", value),
            None => request,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, DSS_API_PREFIX, path)
    }

    /// Bearer token for the DSS audience. Errors are surfaced, not retried.
    pub async fn get_auth_token(&self) -> Result<String, DssError> {
        Ok(self
            .credentials
            .get_token(&self.audience, TokenType::Scd)
            .await?)
    }

    pub async fn create_operational_intent_reference(
        &self,
        id: Uuid,
        params: &PutOperationalIntentReferenceParameters,
    ) -> Result<ChangeOperationalIntentReferenceResponse, DssError> {
        let token = self.get_auth_token().await?;
        let url = self.url(&format!("/operational_intent_references/{}", id));
        let response = self
            .apply_request_id(self.client.put(&url).bearer_auth(token).json(params))
            .send()
            .await
            .map_err(DssError::from_transport)?;
        read_json(response, CallKind::Create, id).await
    }

    pub async fn update_operational_intent_reference(
        &self,
        id: Uuid,
        ovn: &str,
        params: &PutOperationalIntentReferenceParameters,
    ) -> Result<ChangeOperationalIntentReferenceResponse, DssError> {
        let token = self.get_auth_token().await?;
        let url = self.url(&format!("/operational_intent_references/{}/{}", id, ovn));
        let response = self
            .apply_request_id(self.client.put(&url).bearer_auth(token).json(params))
            .send()
            .await
            .map_err(DssError::from_transport)?;
        read_json(response, CallKind::Versioned, id).await
    }

    pub async fn delete_operational_intent_reference(
        &self,
        id: Uuid,
        ovn: &str,
    ) -> Result<ChangeOperationalIntentReferenceResponse, DssError> {
        let token = self.get_auth_token().await?;
        let url = self.url(&format!("/operational_intent_references/{}/{}", id, ovn));
        let response = self
            .apply_request_id(self.client.delete(&url).bearer_auth(token))
            .send()
            .await
            .map_err(DssError::from_transport)?;
        read_json(response, CallKind::Versioned, id).await
    }

    pub async fn get_operational_intent_reference(
        &self,
        id: Uuid,
    ) -> Result<OperationalIntentReference, DssError> {
        let token = self.get_auth_token().await?;
        let url = self.url(&format!("/operational_intent_references/{}", id));
        let response = self
            .apply_request_id(self.client.get(&url).bearer_auth(token))
            .send()
            .await
            .map_err(DssError::from_transport)?;
        let body: GetOperationalIntentReferenceResponse =
            read_json(response, CallKind::Read, id).await?;
        Ok(body.operational_intent_reference)
    }

    pub async fn query_operational_intent_references(
        &self,
        area_of_interest: &Volume4D,
    ) -> Result<Vec<OperationalIntentReference>, DssError> {
        let token = self.get_auth_token().await?;
        let url = self.url("/operational_intent_references/query");
        let response = self
            .apply_request_id(
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&QueryOperationalIntentReferenceParameters { area_of_interest }),
            )
            .send()
            .await
            .map_err(DssError::from_transport)?;
        let body: QueryOperationalIntentReferenceResponse =
            read_json(response, CallKind::Read, Uuid::nil()).await?;
        Ok(body.operational_intent_references)
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    kind: CallKind,
    id: Uuid,
) -> Result<T, DssError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| DssError::Decode(err.to_string()));
    }

    let message = response.text().await.unwrap_or_default();
    tracing::warn!("DSS returned {} for {}: {}", status, id, message);
    Err(match (status, kind) {
        (StatusCode::CONFLICT, CallKind::Create) => DssError::Conflict(message),
        (StatusCode::CONFLICT, CallKind::Versioned) => DssError::StaleVersion {
            id: id.to_string(),
        },
        (StatusCode::REQUEST_TIMEOUT, _) => DssError::Timeout,
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            DssError::Unauthorized(status.as_u16())
        }
        _ => DssError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}
