//! Flight-planning injection types and response schemas.
//!
//! Responses are always delivered with HTTP 200; the outcome is carried in
//! `result`. Every response is built from a [`PlanningOutcome`] or
//! [`DeletionOutcome`] so each named outcome has exactly one schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OperationalIntentState, Volume4D};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageState {
    Planned,
    InUse,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UasState {
    Nominal,
    OffNominal,
    Contingent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicFlightPlanInformation {
    pub usage_state: UsageState,
    pub uas_state: UasState,
    #[serde(default)]
    pub area: Vec<Volume4D>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AstmF3548Information {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// U-space flight authorisation fields checked by the validator chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightAuthorisationData {
    pub uas_serial_number: String,
    pub operator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uas_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPlan {
    pub basic_information: BasicFlightPlanInformation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub astm_f3548_21: Option<AstmF3548Information>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uspace_flight_authorisation: Option<FlightAuthorisationData>,
}

impl FlightPlan {
    pub fn priority(&self) -> i32 {
        self.astm_f3548_21
            .as_ref()
            .and_then(|astm| astm.priority)
            .unwrap_or(0)
    }

    /// Operational intent state requested by this plan.
    pub fn target_state(&self) -> Result<OperationalIntentState, String> {
        let info = &self.basic_information;
        match (info.usage_state, info.uas_state) {
            (UsageState::Planned, UasState::Nominal) => Ok(OperationalIntentState::Accepted),
            (UsageState::InUse, UasState::Nominal) => Ok(OperationalIntentState::Activated),
            (UsageState::InUse, UasState::OffNominal) => Ok(OperationalIntentState::Nonconforming),
            (UsageState::InUse, UasState::Contingent) => Ok(OperationalIntentState::Contingent),
            (UsageState::Closed, _) => Ok(OperationalIntentState::Ended),
            (UsageState::Planned, uas_state) => Err(format!(
                "a planned flight cannot have uas_state {:?}",
                uas_state
            )),
        }
    }

    /// Off-nominal volumes: the submitted area when the UAS is not nominal.
    pub fn off_nominal_volumes(&self) -> Vec<Volume4D> {
        match self.basic_information.uas_state {
            UasState::Nominal => Vec::new(),
            UasState::OffNominal | UasState::Contingent => self.basic_information.area.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertFlightPlanRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(alias = "intended_flight")]
    pub flight_plan: FlightPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotPlannedReason {
    InvalidFlightPlan,
    ConflictWithFlight,
    AlreadyPlanned,
    ActivatedConflict,
    ActivatedHigherPriorityOkToFly,
    Retryable,
}

/// Terminal result of a create-or-update request.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanningOutcome {
    Planned { operational_intent_id: Uuid },
    ReadyToFly { operational_intent_id: Uuid },
    PlannedOffNominal { operational_intent_id: Uuid },
    NotPlanned { reason: NotPlannedReason, notes: String },
    Failed { notes: String },
}

impl PlanningOutcome {
    pub fn not_planned(reason: NotPlannedReason, notes: impl Into<String>) -> Self {
        Self::NotPlanned {
            reason,
            notes: notes.into(),
        }
    }

    pub fn failed(notes: impl Into<String>) -> Self {
        Self::Failed {
            notes: notes.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Planned { .. } => "Planned",
            Self::ReadyToFly { .. } => "ReadyToFly",
            Self::PlannedOffNominal { .. } => "PlannedOffNominal",
            Self::NotPlanned { .. } => "NotPlanned",
            Self::Failed { .. } => "Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanningResult {
    Planned,
    ReadyToFly,
    PlannedOffNominal,
    NotPlanned,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightPlanStatus {
    NotPlanned,
    Planned,
    OkToFly,
    OffNominal,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningResponse {
    pub result: PlanningResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotPlannedReason>,
    pub flight_plan_status: FlightPlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_intent_id: Option<Uuid>,
}

impl From<PlanningOutcome> for PlanningResponse {
    fn from(outcome: PlanningOutcome) -> Self {
        let planned = |result, flight_plan_status, id| Self {
            result,
            notes: None,
            reason: None,
            flight_plan_status,
            operational_intent_id: Some(id),
        };
        match outcome {
            PlanningOutcome::Planned {
                operational_intent_id,
            } => planned(
                PlanningResult::Planned,
                FlightPlanStatus::Planned,
                operational_intent_id,
            ),
            PlanningOutcome::ReadyToFly {
                operational_intent_id,
            } => planned(
                PlanningResult::ReadyToFly,
                FlightPlanStatus::OkToFly,
                operational_intent_id,
            ),
            PlanningOutcome::PlannedOffNominal {
                operational_intent_id,
            } => planned(
                PlanningResult::PlannedOffNominal,
                FlightPlanStatus::OffNominal,
                operational_intent_id,
            ),
            PlanningOutcome::NotPlanned { reason, notes } => Self {
                result: PlanningResult::NotPlanned,
                notes: Some(notes),
                reason: Some(reason),
                flight_plan_status: FlightPlanStatus::NotPlanned,
                operational_intent_id: None,
            },
            PlanningOutcome::Failed { notes } => Self {
                result: PlanningResult::Failed,
                notes: Some(notes),
                reason: None,
                flight_plan_status: FlightPlanStatus::NotPlanned,
                operational_intent_id: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    Success,
    Failure { notes: String },
}

impl DeletionOutcome {
    pub fn failure(notes: impl Into<String>) -> Self {
        Self::Failure {
            notes: notes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionResult {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionResponse {
    pub result: DeletionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_plan_status: Option<FlightPlanStatus>,
}

impl From<DeletionOutcome> for DeletionResponse {
    fn from(outcome: DeletionOutcome) -> Self {
        match outcome {
            DeletionOutcome::Success => Self {
                result: DeletionResult::Completed,
                notes: None,
                flight_plan_status: Some(FlightPlanStatus::Closed),
            },
            DeletionOutcome::Failure { notes } => Self {
                result: DeletionResult::Failed,
                notes: Some(notes),
                flight_plan_status: None,
            },
        }
    }
}

/// Test-harness request to remove every flight this node manages in `extent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearAreaRequest {
    pub request_id: String,
    pub extent: Volume4D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearAreaOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ClearAreaOutcome {
    pub fn cleared() -> Self {
        Self {
            success: true,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearAreaResponse {
    pub outcome: ClearAreaOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UssCapability {
    BasicStrategicConflictDetection,
    FlightAuthorisationValidation,
    HighPriorityFlights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    pub capabilities: Vec<UssCapability>,
}

impl Default for CapabilitiesResponse {
    fn default() -> Self {
        Self {
            capabilities: vec![
                UssCapability::BasicStrategicConflictDetection,
                UssCapability::FlightAuthorisationValidation,
                UssCapability::HighPriorityFlights,
            ],
        }
    }
}
