//! Typed errors for remote collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials configured and dummy tokens are disabled")]
    Missing,
    #[error("token request failed: {0}")]
    Request(String),
    #[error("token endpoint returned HTTP {0}")]
    Status(u16),
    #[error("token response could not be parsed: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum DssError {
    /// The OVN sent with an update or delete is no longer current.
    #[error("stale OVN for operational intent {id}")]
    StaleVersion { id: String },
    /// A create collided with an existing claim.
    #[error("DSS reported a conflict: {0}")]
    Conflict(String),
    #[error("DSS request timed out")]
    Timeout,
    #[error("DSS rejected credentials (HTTP {0})")]
    Unauthorized(u16),
    #[error("DSS rejected request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("DSS transport error: {0}")]
    Transport(String),
    #[error("DSS response could not be decoded: {0}")]
    Decode(String),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl DssError {
    /// HTTP-equivalent status used to classify the failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::StaleVersion { .. } | Self::Conflict(_) => 409,
            Self::Timeout => 408,
            Self::Unauthorized(status) | Self::Rejected { status, .. } => *status,
            Self::Transport(_) => 503,
            Self::Decode(_) => 502,
            Self::Credential(_) => 401,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {url} timed out")]
    Timeout { url: String },
    #[error("peer {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("peer {url} unreachable: {message}")]
    Transport { url: String, message: String },
    #[error("peer {url} sent an undecodable response: {message}")]
    Decode { url: String, message: String },
    #[error("invalid peer base URL '{0}'")]
    InvalidUrl(String),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl PeerError {
    pub(crate) fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}
