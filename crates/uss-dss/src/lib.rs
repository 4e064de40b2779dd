//! USS DSS - remote collaborators for strategic coordination
//!
//! Talks to the DSS, to peer USSes and to the OAuth server. Nothing in here
//! mutates local state.

pub mod auth;
pub mod client;
pub mod error;
pub mod notifications;
pub mod peer;
pub mod scd;

pub use auth::{
    CredentialProvider, OAuthCredentialProvider, OAuthSettings, StaticCredentialProvider,
    TokenType,
};
pub use client::{ChangeOperationalIntentReferenceResponse, DssClient};
pub use error::{CredentialError, DssError, PeerError};
pub use notifications::{NotificationDispatcher, NotificationReport};
pub use peer::{PeerUssClient, PutOperationalIntentDetailsParameters};
pub use scd::{
    classify_conflict, AdditionalInformation, IntentUpdate, ScdOperations, SubmissionResult,
    SubmissionStatus, TentativeResponse, UpdateOutcome,
};
