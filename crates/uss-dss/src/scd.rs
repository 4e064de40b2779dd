//! Strategic conflict detection submissions.
//!
//! Composes the DSS client and peer client: discovers intersecting intents,
//! collects the OVN key, applies the priority policy to remote intents and
//! writes the reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use uss_core::deconfliction::{evaluate, Deconfliction, ExistingIntent, PriorityRelation};
use uss_core::geometry::{any_intersect, to_bounding_box};
use uss_core::models::{
    LatLngPoint, OperationalIntentReference, OperationalIntentState, Volume4D,
};

use crate::client::{
    ChangeOperationalIntentReferenceResponse, DssClient, ImplicitSubscriptionParameters,
    PutOperationalIntentReferenceParameters,
};
use crate::error::{DssError, PeerError};
use crate::peer::PeerUssClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Success,
    ConflictWithFlight,
    Failure,
    PeerUssDataSharingIssue,
}

#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    /// HTTP-equivalent status (408 marks the timeout class).
    pub status_code: u16,
    pub operational_intent_id: Uuid,
    pub response: Option<ChangeOperationalIntentReferenceResponse>,
    pub conflicting: Vec<String>,
    pub message: Option<String>,
}

impl SubmissionResult {
    fn rejected(
        status: SubmissionStatus,
        status_code: u16,
        id: Uuid,
        conflicting: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            status_code,
            operational_intent_id: id,
            response: None,
            conflicting,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TentativeResponse {
    OkToFly,
    NotOkToFly,
}

/// Context returned instead of writing when an update hits a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalInformation {
    /// "B" when the blocking intent has higher priority, "A" otherwise.
    pub check_id: String,
    pub tentative_flight_plan_processing_response: TentativeResponse,
    pub conflicting_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Updated(ChangeOperationalIntentReferenceResponse),
    NeedsMoreInfo(AdditionalInformation),
}

impl UpdateOutcome {
    /// 200 for a written update, 999 when more information is needed.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Updated(_) => 200,
            Self::NeedsMoreInfo(_) => 999,
        }
    }
}

/// Everything needed to update an existing reference.
#[derive(Debug, Clone)]
pub struct IntentUpdate<'a> {
    pub id: Uuid,
    pub ovn: &'a str,
    pub state: OperationalIntentState,
    pub volumes: &'a [Volume4D],
    pub priority: i32,
    pub current_state: OperationalIntentState,
    pub current_volumes: &'a [Volume4D],
    pub deconfliction_required: bool,
    pub subscription_id: Option<Uuid>,
}

/// Remote intents overlapping a candidate.
#[derive(Debug, Default)]
pub struct OverlapSurvey {
    /// OVNs the DSS expects in the `key` of the write.
    pub key: Vec<String>,
    /// Intersecting intents managed by other USSes.
    pub intents: Vec<ExistingIntent>,
    /// Intersecting intents whose details could not be obtained.
    pub unreachable: Vec<String>,
    /// At least one of the `unreachable` peers timed out.
    pub timed_out: bool,
}

#[derive(Clone)]
pub struct ScdOperations {
    dss: DssClient,
    peers: PeerUssClient,
    uss_base_url: String,
}

impl ScdOperations {
    pub fn new(dss: DssClient, peers: PeerUssClient, uss_base_url: impl Into<String>) -> Self {
        Self {
            dss,
            peers,
            uss_base_url: uss_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_request_id(&self, request_id: Option<String>) -> Self {
        Self {
            dss: self.dss.with_request_id(request_id.clone()),
            peers: self.peers.with_request_id(request_id),
            uss_base_url: self.uss_base_url.clone(),
        }
    }

    pub fn dss(&self) -> &DssClient {
        &self.dss
    }

    pub fn uss_base_url(&self) -> &str {
        &self.uss_base_url
    }

    /// Whether this node manages `reference`.
    pub fn is_own(&self, reference: &OperationalIntentReference) -> bool {
        reference.uss_base_url.trim_end_matches('/') == self.uss_base_url
    }

    /// Query the DSS for the candidate's area and fetch the details of every
    /// remote intent that intersects it.
    pub async fn gather_overlapping(
        &self,
        volumes: &[Volume4D],
        exclude: Option<Uuid>,
    ) -> Result<OverlapSurvey, DssError> {
        let mut survey = OverlapSurvey::default();
        let Some(area) = area_of_interest(volumes) else {
            return Ok(survey);
        };

        let references = self.dss.query_operational_intent_references(&area).await?;
        for reference in references {
            if Some(reference.id) == exclude {
                continue;
            }
            if self.is_own(&reference) {
                // Own intents are deconflicted from the local store.
                survey.key.extend(reference.ovn.clone());
                continue;
            }

            match self
                .peers
                .get_operational_intent_details(&reference.uss_base_url, reference.id)
                .await
            {
                Ok(intent) => {
                    survey.key.extend(intent.reference.ovn.clone());
                    let all_volumes = intent.details.all_volumes();
                    if any_intersect(volumes, &all_volumes) {
                        survey.intents.push(ExistingIntent {
                            id: reference.id.to_string(),
                            priority: intent.details.priority,
                            state: intent.reference.state,
                            volumes: all_volumes,
                            ovn: intent.reference.ovn,
                            uss_base_url: Some(reference.uss_base_url.clone()),
                        });
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        "Could not obtain details of {} from {}: {}",
                        reference.id,
                        reference.uss_base_url,
                        err
                    );
                    if matches!(err, PeerError::Timeout { .. }) {
                        survey.timed_out = true;
                    }
                    survey.unreachable.push(reference.id.to_string());
                }
            }
        }
        Ok(survey)
    }

    /// Create a new reference after checking remote intents.
    pub async fn create_operational_intent(
        &self,
        state: OperationalIntentState,
        volumes: &[Volume4D],
        off_nominal_volumes: &[Volume4D],
        priority: i32,
    ) -> SubmissionResult {
        let id = Uuid::new_v4();
        let claimed: Vec<Volume4D> = volumes.iter().chain(off_nominal_volumes).cloned().collect();

        let survey = match self.gather_overlapping(&claimed, None).await {
            Ok(survey) => survey,
            Err(err) => return failure(id, err),
        };
        if !survey.unreachable.is_empty() {
            // A peer timeout keeps the timeout class so callers may retry.
            let status_code = if survey.timed_out { 408 } else { 412 };
            return SubmissionResult::rejected(
                SubmissionStatus::PeerUssDataSharingIssue,
                status_code,
                id,
                survey.unreachable,
                "details of intersecting operational intents are unavailable",
            );
        }

        let decision = evaluate(&claimed, priority, &survey.intents);
        if let Deconfliction::Conflict { .. } = decision {
            return SubmissionResult::rejected(
                SubmissionStatus::ConflictWithFlight,
                409,
                id,
                decision.conflicting_ids(),
                "intersects operational intents of equal or higher priority",
            );
        }

        let params = PutOperationalIntentReferenceParameters {
            extents: claimed,
            key: survey.key,
            state,
            uss_base_url: self.uss_base_url.clone(),
            subscription_id: None,
            new_subscription: Some(ImplicitSubscriptionParameters {
                uss_base_url: self.uss_base_url.clone(),
                notify_for_constraints: false,
            }),
        };

        match self
            .dss
            .create_operational_intent_reference(id, &params)
            .await
        {
            Ok(response) => SubmissionResult {
                status: SubmissionStatus::Success,
                status_code: 201,
                operational_intent_id: id,
                response: Some(response),
                conflicting: Vec::new(),
                message: None,
            },
            Err(DssError::Conflict(message)) => SubmissionResult::rejected(
                SubmissionStatus::ConflictWithFlight,
                409,
                id,
                Vec::new(),
                message,
            ),
            Err(err) => failure(id, err),
        }
    }

    /// Update an existing reference.
    ///
    /// When deconfliction is required and a blocking intent exists, nothing
    /// is written and [`UpdateOutcome::NeedsMoreInfo`] explains why.
    pub async fn update_operational_intent(
        &self,
        update: IntentUpdate<'_>,
    ) -> Result<UpdateOutcome, DssError> {
        let mut key = Vec::new();
        if update.deconfliction_required {
            let survey = self
                .gather_overlapping(update.volumes, Some(update.id))
                .await?;
            if !survey.unreachable.is_empty() {
                return Ok(UpdateOutcome::NeedsMoreInfo(AdditionalInformation {
                    check_id: "A".to_string(),
                    tentative_flight_plan_processing_response: TentativeResponse::NotOkToFly,
                    conflicting_ids: survey.unreachable,
                }));
            }

            let decision = evaluate(update.volumes, update.priority, &survey.intents);
            if let Some(info) = classify_conflict(
                &decision,
                &survey.intents,
                update.current_state,
                update.current_volumes,
            ) {
                return Ok(UpdateOutcome::NeedsMoreInfo(info));
            }
            key = survey.key;
        }

        let params = PutOperationalIntentReferenceParameters {
            extents: update.volumes.to_vec(),
            key,
            state: update.state,
            uss_base_url: self.uss_base_url.clone(),
            subscription_id: update.subscription_id,
            new_subscription: update.subscription_id.is_none().then(|| {
                ImplicitSubscriptionParameters {
                    uss_base_url: self.uss_base_url.clone(),
                    notify_for_constraints: false,
                }
            }),
        };

        self.dss
            .update_operational_intent_reference(update.id, update.ovn, &params)
            .await
            .map(UpdateOutcome::Updated)
    }

    pub async fn delete_operational_intent(
        &self,
        id: Uuid,
        ovn: &str,
    ) -> Result<ChangeOperationalIntentReferenceResponse, DssError> {
        self.dss.delete_operational_intent_reference(id, ovn).await
    }

    /// Current reference held by the DSS, used to refresh a stale OVN.
    pub async fn get_operational_intent_reference(
        &self,
        id: Uuid,
    ) -> Result<OperationalIntentReference, DssError> {
        self.dss.get_operational_intent_reference(id).await
    }
}

/// Explain a blocking conflict for an update, or `None` when clear.
///
/// A higher-priority blocker is check "B"; it is still "OkToFly" when the
/// flight is already activated inside that conflict. Anything else is
/// check "A".
pub fn classify_conflict(
    decision: &Deconfliction,
    intents: &[ExistingIntent],
    current_state: OperationalIntentState,
    current_volumes: &[Volume4D],
) -> Option<AdditionalInformation> {
    let blocking = decision.highest_priority_conflict()?;
    if blocking.relation != PriorityRelation::Higher {
        return Some(AdditionalInformation {
            check_id: "A".to_string(),
            tentative_flight_plan_processing_response: TentativeResponse::NotOkToFly,
            conflicting_ids: decision.conflicting_ids(),
        });
    }

    let pre_existing = current_state == OperationalIntentState::Activated
        && intents.iter().any(|intent| {
            intent.id == blocking.id && any_intersect(current_volumes, &intent.volumes)
        });
    Some(AdditionalInformation {
        check_id: "B".to_string(),
        tentative_flight_plan_processing_response: if pre_existing {
            TentativeResponse::OkToFly
        } else {
            TentativeResponse::NotOkToFly
        },
        conflicting_ids: decision.conflicting_ids(),
    })
}

fn failure(id: Uuid, err: DssError) -> SubmissionResult {
    tracing::warn!("Operational intent {} submission failed: {}", id, err);
    SubmissionResult::rejected(
        SubmissionStatus::Failure,
        err.status_code(),
        id,
        Vec::new(),
        err.to_string(),
    )
}

/// Single volume covering the bounding box, altitude band and time window of
/// all `volumes`.
pub fn area_of_interest(volumes: &[Volume4D]) -> Option<Volume4D> {
    let bbox = to_bounding_box(volumes)?;
    let (start, end) = volumes
        .iter()
        .filter_map(Volume4D::time_window)
        .reduce(|(s1, e1), (s2, e2)| (s1.min(s2), e1.max(e2)))?;
    let (lower, upper) = volumes
        .iter()
        .filter_map(Volume4D::altitude_range)
        .reduce(|(l1, u1), (l2, u2)| (l1.min(l2), u1.max(u2)))?;

    Some(Volume4D::polygon(
        vec![
            LatLngPoint::new(bbox.min_lat, bbox.min_lon),
            LatLngPoint::new(bbox.min_lat, bbox.max_lon),
            LatLngPoint::new(bbox.max_lat, bbox.max_lon),
            LatLngPoint::new(bbox.max_lat, bbox.min_lon),
        ],
        (lower, upper),
        (start, end),
    ))
}
