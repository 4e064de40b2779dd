//! Flight plan lifecycle orchestration.
//!
//! Every PUT and DELETE of a flight plan ends in exactly one
//! [`PlanningOutcome`] or [`DeletionOutcome`]. Requests for the same flight
//! plan id are serialized by a per-id async lock; the DSS stays the authority
//! on OVN races between nodes.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use uss_core::deconfliction::{evaluate, requires_check, Deconfliction, ExistingIntent};
use uss_core::geometry::{
    any_intersect, pre_creation_checks, to_geojson, validate_volumes, VolumeEnvelope,
};
use uss_core::index::{IndexEntry, SpatialIndex};
use uss_core::models::{
    FlightDeclaration, OperationalIntent, OperationalIntentDetails, OperationalIntentState,
    Volume4D,
};
use uss_core::planning::{
    ClearAreaOutcome, DeletionOutcome, FlightPlan, NotPlannedReason, PlanningOutcome,
    UpsertFlightPlanRequest,
};
use uss_core::spatial::BoundingBox;
use uss_core::AuthorisationChain;
use uss_dss::scd::area_of_interest;
use uss_dss::{
    classify_conflict, AdditionalInformation, DssError, IntentUpdate, NotificationDispatcher,
    ScdOperations, SubmissionStatus, TentativeResponse, UpdateOutcome,
};

use crate::persistence::FlightDeclarationRepository;

/// Requesting priority treated as an unconditional high-priority flight.
pub const HIGH_PRIORITY_SENTINEL: i32 = 100;

/// Aircraft id stored when no serial number was supplied.
const UNKNOWN_AIRCRAFT_ID: &str = "0000";

pub struct LifecycleOrchestrator {
    scd: ScdOperations,
    notifier: NotificationDispatcher,
    repository: Arc<dyn FlightDeclarationRepository>,
    validators: AuthorisationChain,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Per-request view of the remote collaborators.
struct Collaborators {
    scd: ScdOperations,
    notifier: NotificationDispatcher,
}

impl LifecycleOrchestrator {
    pub fn new(
        scd: ScdOperations,
        notifier: NotificationDispatcher,
        repository: Arc<dyn FlightDeclarationRepository>,
    ) -> Self {
        Self {
            scd,
            notifier,
            repository,
            validators: AuthorisationChain::default(),
            locks: DashMap::new(),
        }
    }

    pub fn with_validators(mut self, validators: AuthorisationChain) -> Self {
        self.validators = validators;
        self
    }

    pub fn repository(&self) -> &Arc<dyn FlightDeclarationRepository> {
        &self.repository
    }

    fn lock_for(&self, flight_plan_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(flight_plan_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn collaborators(&self, request_id: Option<String>) -> Collaborators {
        Collaborators {
            scd: self.scd.with_request_id(request_id.clone()),
            notifier: self.notifier.with_request_id(request_id),
        }
    }

    /// Drop the lock entry once no other request holds or awaits it.
    fn release_lock(&self, flight_plan_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(flight_plan_id, |_, entry| Arc::strong_count(entry) == 1);
    }

    /// Create or update the flight plan `flight_plan_id`.
    pub async fn upsert_flight_plan(
        &self,
        flight_plan_id: &str,
        request: UpsertFlightPlanRequest,
        request_id: Option<String>,
    ) -> PlanningOutcome {
        let lock = self.lock_for(flight_plan_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.upsert_locked(flight_plan_id, request, request_id).await
        };
        self.release_lock(flight_plan_id, lock);
        outcome
    }

    async fn upsert_locked(
        &self,
        flight_plan_id: &str,
        request: UpsertFlightPlanRequest,
        request_id: Option<String>,
    ) -> PlanningOutcome {
        let remote = self.collaborators(request_id);
        let plan = request.flight_plan;

        let target = match plan.target_state() {
            Ok(state) => state,
            Err(reason) => {
                return PlanningOutcome::not_planned(NotPlannedReason::InvalidFlightPlan, reason)
            }
        };

        let envelope = match validate_volumes(&plan.basic_information.area) {
            Ok(envelope) => envelope,
            Err(err) => {
                return PlanningOutcome::not_planned(
                    NotPlannedReason::InvalidFlightPlan,
                    err.to_string(),
                )
            }
        };

        if let Some(authorisation) = &plan.uspace_flight_authorisation {
            if let Err(err) = self.validators.validate(authorisation) {
                return PlanningOutcome::not_planned(
                    NotPlannedReason::InvalidFlightPlan,
                    err.to_string(),
                );
            }
        }

        if let Err(err) = remote.scd.dss().get_auth_token().await {
            error!("Could not obtain DSS credentials: {}", err);
            return PlanningOutcome::failed(format!("could not obtain DSS credentials: {}", err));
        }

        let existing = match self.repository.get_flight_declaration(flight_plan_id).await {
            Ok(existing) => existing,
            Err(err) => {
                error!("Failed to load flight plan {}: {}", flight_plan_id, err);
                return PlanningOutcome::failed(format!("could not load flight plan: {}", err));
            }
        };

        let outcome = match existing {
            None => {
                self.create(&remote, flight_plan_id, &plan, target, &envelope)
                    .await
            }
            Some(record) => self.transition(&remote, record, &plan, target).await,
        };
        info!(
            "Flight plan {} -> {:?}: {}",
            flight_plan_id,
            target,
            outcome.label()
        );
        outcome
    }

    async fn create(
        &self,
        remote: &Collaborators,
        flight_plan_id: &str,
        plan: &FlightPlan,
        target: OperationalIntentState,
        envelope: &VolumeEnvelope,
    ) -> PlanningOutcome {
        if target == OperationalIntentState::Ended {
            return PlanningOutcome::not_planned(
                NotPlannedReason::InvalidFlightPlan,
                format!("flight plan {} does not exist and cannot be closed", flight_plan_id),
            );
        }

        let area = &plan.basic_information.area;
        let now = Utc::now();
        if let Err(err) = pre_creation_checks(area, now) {
            return PlanningOutcome::not_planned(
                NotPlannedReason::InvalidFlightPlan,
                err.to_string(),
            );
        }

        let priority = plan.priority();
        let off_nominal = plan.off_nominal_volumes();
        let nominal: Vec<Volume4D> = if target.is_off_nominal() {
            Vec::new()
        } else {
            area.clone()
        };

        match self.local_intents(envelope, None).await {
            Ok(local) => {
                let decision = evaluate(area, priority, &local);
                if let Deconfliction::Conflict { .. } = decision {
                    return PlanningOutcome::not_planned(
                        NotPlannedReason::ConflictWithFlight,
                        format!(
                            "conflicts with operational intents {}",
                            decision.conflicting_ids().join(", ")
                        ),
                    );
                }
            }
            Err(err) => {
                error!("Local deconfliction for {} failed: {:#}", flight_plan_id, err);
                return PlanningOutcome::failed(format!("local deconfliction failed: {}", err));
            }
        }

        let submission = remote
            .scd
            .create_operational_intent(target, &nominal, &off_nominal, priority)
            .await;

        match submission.status {
            SubmissionStatus::Success => {}
            SubmissionStatus::ConflictWithFlight => {
                let mut notes = submission
                    .message
                    .unwrap_or_else(|| "conflicts with another flight".to_string());
                if !submission.conflicting.is_empty() {
                    notes = format!("{} ({})", notes, submission.conflicting.join(", "));
                }
                return PlanningOutcome::not_planned(NotPlannedReason::ConflictWithFlight, notes);
            }
            SubmissionStatus::Failure | SubmissionStatus::PeerUssDataSharingIssue => {
                let notes = submission
                    .message
                    .unwrap_or_else(|| "operational intent submission failed".to_string());
                return if submission.status_code == 408 {
                    PlanningOutcome::not_planned(NotPlannedReason::Retryable, notes)
                } else {
                    PlanningOutcome::failed(notes)
                };
            }
        }

        let Some(response) = submission.response else {
            return PlanningOutcome::failed("DSS accepted the operational intent without a reference");
        };

        let operational_intent_id = response.operational_intent_reference.id;
        let intent = OperationalIntent {
            reference: response.operational_intent_reference.clone(),
            details: OperationalIntentDetails {
                volumes: nominal,
                off_nominal_volumes: off_nominal,
                priority,
            },
        };
        let declaration = FlightDeclaration {
            id: flight_plan_id.to_string(),
            aircraft_id: plan
                .uspace_flight_authorisation
                .as_ref()
                .map(|data| data.uas_serial_number.clone())
                .unwrap_or_else(|| UNKNOWN_AIRCRAFT_ID.to_string()),
            state: target,
            priority,
            bounds: envelope.bounds_string(),
            start_datetime: envelope.time_start,
            end_datetime: envelope.time_end,
            raw_geojson: to_geojson(area),
            operational_intent: Some(intent.clone()),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.repository.save(&declaration).await {
            error!(
                "Operational intent {} was created but flight plan {} could not be stored: {}",
                operational_intent_id, flight_plan_id, err
            );
            return PlanningOutcome::failed(format!(
                "operational intent {} was created but could not be stored: {}",
                operational_intent_id, err
            ));
        }

        remote
            .notifier
            .notify_peers(&response.subscribers, Some(&intent), operational_intent_id)
            .await;

        accepted_outcome(target, operational_intent_id)
    }

    async fn transition(
        &self,
        remote: &Collaborators,
        record: FlightDeclaration,
        plan: &FlightPlan,
        target: OperationalIntentState,
    ) -> PlanningOutcome {
        if record.state == OperationalIntentState::Ended {
            return PlanningOutcome::failed(format!("flight plan {} has already ended", record.id));
        }

        match target {
            OperationalIntentState::Accepted => PlanningOutcome::not_planned(
                NotPlannedReason::AlreadyPlanned,
                format!("flight plan {} is already planned", record.id),
            ),
            OperationalIntentState::Ended => PlanningOutcome::failed(format!(
                "transition from {} to Ended is not supported; delete the flight plan instead",
                record.state
            )),
            OperationalIntentState::Activated
            | OperationalIntentState::Nonconforming
            | OperationalIntentState::Contingent => {
                self.update(remote, record, plan, target).await
            }
        }
    }

    async fn update(
        &self,
        remote: &Collaborators,
        mut record: FlightDeclaration,
        plan: &FlightPlan,
        target: OperationalIntentState,
    ) -> PlanningOutcome {
        let Some(intent) = record.operational_intent.clone() else {
            return PlanningOutcome::failed(format!(
                "flight plan {} has no operational intent reference",
                record.id
            ));
        };
        let Some(ovn) = intent.reference.ovn.clone() else {
            return PlanningOutcome::failed(format!("flight plan {} has no stored OVN", record.id));
        };

        let area = &plan.basic_information.area;
        let priority = plan.priority();
        let (nominal, off_nominal) = if target.is_off_nominal() {
            (intent.details.volumes.clone(), area.clone())
        } else {
            (area.clone(), Vec::new())
        };
        let extents: Vec<Volume4D> = nominal.iter().chain(off_nominal.iter()).cloned().collect();
        let envelope = match validate_volumes(&extents) {
            Ok(envelope) => envelope,
            Err(err) => {
                return PlanningOutcome::not_planned(
                    NotPlannedReason::InvalidFlightPlan,
                    err.to_string(),
                )
            }
        };

        let current_volumes = intent.details.all_volumes();
        let required = requires_check(Some(record.state), target);
        if required {
            let local = match self.local_intents(&envelope, Some(&record.id)).await {
                Ok(local) => local,
                Err(err) => {
                    error!("Local deconfliction for {} failed: {:#}", record.id, err);
                    return PlanningOutcome::failed(format!("local deconfliction failed: {}", err));
                }
            };
            let decision = evaluate(&extents, priority, &local);
            if let Some(info) = classify_conflict(&decision, &local, record.state, &current_volumes) {
                return additional_information_outcome(&info, priority);
            }
        } else {
            debug!("Deconfliction skipped for {} ({} -> {})", record.id, record.state, target);
        }

        let operational_intent_id = intent.reference.id;
        let mut current_ovn = ovn;
        let mut refreshed = false;
        let response = loop {
            let update = IntentUpdate {
                id: operational_intent_id,
                ovn: &current_ovn,
                state: target,
                volumes: &extents,
                priority,
                current_state: record.state,
                current_volumes: &current_volumes,
                deconfliction_required: required,
                subscription_id: intent.reference.subscription_id,
            };
            let result = remote.scd.update_operational_intent(update).await;
            match result {
                Ok(UpdateOutcome::Updated(response)) => break response,
                Ok(UpdateOutcome::NeedsMoreInfo(info)) => {
                    return additional_information_outcome(&info, priority)
                }
                Err(DssError::StaleVersion { .. }) if !refreshed => {
                    warn!(
                        "Stale OVN for operational intent {}, refetching",
                        operational_intent_id
                    );
                    refreshed = true;
                    match self
                        .refresh_reference(remote, &mut record, operational_intent_id)
                        .await
                    {
                        Ok(fresh) => current_ovn = fresh,
                        Err(err) => {
                            warn!("Could not refresh OVN of {}: {:#}", operational_intent_id, err);
                            return PlanningOutcome::failed(format!(
                                "stale OVN could not be refreshed: {}",
                                err
                            ));
                        }
                    }
                }
                Err(err) => {
                    warn!("Update of operational intent {} failed: {}", operational_intent_id, err);
                    return PlanningOutcome::failed(err.to_string());
                }
            }
        };

        let updated = OperationalIntent {
            reference: response.operational_intent_reference.clone(),
            details: OperationalIntentDetails {
                volumes: nominal,
                off_nominal_volumes: off_nominal,
                priority,
            },
        };
        record.state = target;
        record.priority = priority;
        record.bounds = envelope.bounds_string();
        record.start_datetime = envelope.time_start;
        record.end_datetime = envelope.time_end;
        record.raw_geojson = to_geojson(&extents);
        record.operational_intent = Some(updated.clone());
        record.updated_at = Utc::now();

        if let Err(err) = self.repository.save(&record).await {
            error!(
                "Operational intent {} was updated but flight plan {} could not be stored: {}",
                operational_intent_id, record.id, err
            );
            return PlanningOutcome::failed(format!(
                "operational intent {} was updated but could not be stored: {}",
                operational_intent_id, err
            ));
        }

        remote
            .notifier
            .notify_peers(&response.subscribers, Some(&updated), operational_intent_id)
            .await;

        accepted_outcome(target, operational_intent_id)
    }

    /// Delete the flight plan `flight_plan_id` and its DSS reference.
    pub async fn delete_flight_plan(
        &self,
        flight_plan_id: &str,
        request_id: Option<String>,
    ) -> DeletionOutcome {
        let lock = self.lock_for(flight_plan_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.delete_locked(flight_plan_id, request_id).await
        };
        self.release_lock(flight_plan_id, lock);
        outcome
    }

    async fn delete_locked(
        &self,
        flight_plan_id: &str,
        request_id: Option<String>,
    ) -> DeletionOutcome {
        let remote = self.collaborators(request_id);

        let mut record = match self.repository.get_flight_declaration(flight_plan_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return DeletionOutcome::failure(format!(
                    "flight plan {} not found",
                    flight_plan_id
                ))
            }
            Err(err) => {
                error!("Failed to load flight plan {}: {}", flight_plan_id, err);
                return DeletionOutcome::failure(format!("could not load flight plan: {}", err));
            }
        };

        let (Some(operational_intent_id), Some(ovn)) =
            (record.operational_intent_id(), record.ovn().map(str::to_string))
        else {
            return DeletionOutcome::failure(format!(
                "flight plan {} has no operational intent reference",
                flight_plan_id
            ));
        };

        let mut current_ovn = ovn;
        let mut refreshed = false;
        let response = loop {
            let result = remote
                .scd
                .delete_operational_intent(operational_intent_id, &current_ovn)
                .await;
            match result {
                Ok(response) => break response,
                Err(DssError::StaleVersion { .. }) if !refreshed => {
                    warn!(
                        "Stale OVN deleting operational intent {}, refetching",
                        operational_intent_id
                    );
                    refreshed = true;
                    match self
                        .refresh_reference(&remote, &mut record, operational_intent_id)
                        .await
                    {
                        Ok(fresh) => current_ovn = fresh,
                        Err(err) => {
                            return DeletionOutcome::failure(format!(
                                "stale OVN could not be refreshed: {}",
                                err
                            ))
                        }
                    }
                }
                Err(err) => {
                    warn!("Deletion of operational intent {} failed: {}", operational_intent_id, err);
                    return DeletionOutcome::failure(err.to_string());
                }
            }
        };

        if let Err(err) = self.repository.delete(flight_plan_id).await {
            error!(
                "Operational intent {} was deleted but flight plan {} could not be removed: {}",
                operational_intent_id, flight_plan_id, err
            );
            return DeletionOutcome::failure(format!(
                "operational intent {} was deleted but the local record could not be removed: {}",
                operational_intent_id, err
            ));
        }

        remote
            .notifier
            .notify_peers(&response.subscribers, None, operational_intent_id)
            .await;

        info!("Flight plan {} deleted", flight_plan_id);
        DeletionOutcome::Success
    }

    /// Refetch the DSS reference after a stale-version failure and persist it.
    async fn refresh_reference(
        &self,
        remote: &Collaborators,
        record: &mut FlightDeclaration,
        operational_intent_id: Uuid,
    ) -> Result<String> {
        let reference = remote
            .scd
            .get_operational_intent_reference(operational_intent_id)
            .await
            .context("refetching operational intent reference")?;
        let ovn = reference
            .ovn
            .clone()
            .context("DSS did not disclose the current OVN")?;

        if let Some(intent) = record.operational_intent.as_mut() {
            intent.reference = reference;
        }
        self.repository
            .save(record)
            .await
            .context("storing refreshed OVN")?;
        Ok(ovn)
    }

    /// Local declarations whose bounds overlap `envelope`, found through a
    /// single-use spatial index over the time-filtered store.
    async fn local_declarations(&self, envelope: &VolumeEnvelope) -> Result<Vec<FlightDeclaration>> {
        let records = self
            .repository
            .list_by_time_window(envelope.time_start, envelope.time_end)
            .await
            .context("listing flight declarations")?;

        let mut index = SpatialIndex::new();
        index.build(records.into_iter().filter_map(|record| {
            match record.bounds.parse::<BoundingBox>() {
                Ok(bbox) => Some(IndexEntry::new(record.id.clone(), bbox, record)),
                Err(err) => {
                    warn!("Skipping flight plan {} with bad bounds: {}", record.id, err);
                    None
                }
            }
        }));

        let hits: Vec<FlightDeclaration> = index
            .intersects(&envelope.bbox)
            .into_iter()
            .map(|entry| entry.metadata.clone())
            .collect();
        index.teardown();
        Ok(hits)
    }

    /// Locally managed intents overlapping `envelope`, except `exclude`.
    async fn local_intents(
        &self,
        envelope: &VolumeEnvelope,
        exclude: Option<&str>,
    ) -> Result<Vec<ExistingIntent>> {
        let records = self.local_declarations(envelope).await?;
        Ok(records
            .into_iter()
            .filter(|record| {
                Some(record.id.as_str()) != exclude && record.state != OperationalIntentState::Ended
            })
            .filter_map(|record| {
                let intent = record.operational_intent?;
                Some(ExistingIntent {
                    id: intent.reference.id.to_string(),
                    priority: record.priority,
                    state: record.state,
                    volumes: intent.details.all_volumes(),
                    ovn: intent.reference.ovn,
                    uss_base_url: Some(intent.reference.uss_base_url),
                })
            })
            .collect())
    }

    /// Remove every flight this node manages inside `extent`: local flight
    /// plans through the regular deletion path, then any reference the DSS
    /// still lists for this node without a local record.
    pub async fn clear_area(&self, extent: &Volume4D, request_id: Option<String>) -> ClearAreaOutcome {
        let extent = std::slice::from_ref(extent);
        let envelope = match validate_volumes(extent) {
            Ok(envelope) => envelope,
            Err(err) => return ClearAreaOutcome::incomplete(format!("invalid extent: {}", err)),
        };

        let records = match self.local_declarations(&envelope).await {
            Ok(records) => records,
            Err(err) => {
                error!("Clear area could not list flight plans: {:#}", err);
                return ClearAreaOutcome::incomplete(format!("could not list flight plans: {}", err));
            }
        };

        let mut problems = Vec::new();
        let mut removed = 0usize;
        for record in records {
            let inside = record
                .operational_intent
                .as_ref()
                .map_or(true, |intent| any_intersect(extent, &intent.details.all_volumes()));
            if !inside {
                continue;
            }
            let lock = self.lock_for(&record.id);
            let outcome = {
                let _guard = lock.lock().await;
                self.delete_locked(&record.id, request_id.clone()).await
            };
            self.release_lock(&record.id, lock);
            match outcome {
                DeletionOutcome::Success => removed += 1,
                DeletionOutcome::Failure { notes } => problems.push(format!("{}: {}", record.id, notes)),
            }
        }

        let remote = self.collaborators(request_id);
        if let Err(err) = self.clear_orphaned_references(&remote, extent, &mut removed).await {
            problems.push(err);
        }

        info!("Clear area removed {} operational intents", removed);
        if problems.is_empty() {
            ClearAreaOutcome::cleared()
        } else {
            warn!("Clear area incomplete: {}", problems.join("; "));
            ClearAreaOutcome::incomplete(problems.join("; "))
        }
    }

    async fn clear_orphaned_references(
        &self,
        remote: &Collaborators,
        extent: &[Volume4D],
        removed: &mut usize,
    ) -> std::result::Result<(), String> {
        let Some(area) = area_of_interest(extent) else {
            return Ok(());
        };
        let references = remote
            .scd
            .dss()
            .query_operational_intent_references(&area)
            .await
            .map_err(|err| format!("DSS query failed: {}", err))?;

        let mut problems = Vec::new();
        for reference in references {
            if !remote.scd.is_own(&reference) {
                continue;
            }
            match self.repository.find_by_operational_intent_id(reference.id).await {
                Ok(None) => {}
                Ok(Some(_)) => continue,
                Err(err) => {
                    problems.push(format!("{}: {}", reference.id, err));
                    continue;
                }
            }
            let Some(ovn) = reference.ovn.as_deref() else {
                problems.push(format!("{}: DSS did not disclose the OVN", reference.id));
                continue;
            };
            match remote.scd.delete_operational_intent(reference.id, ovn).await {
                Ok(response) => {
                    debug!("Removed orphaned operational intent {}", reference.id);
                    *removed += 1;
                    remote
                        .notifier
                        .notify_peers(&response.subscribers, None, reference.id)
                        .await;
                }
                Err(err) => problems.push(format!("{}: {}", reference.id, err)),
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

fn accepted_outcome(target: OperationalIntentState, operational_intent_id: Uuid) -> PlanningOutcome {
    match target {
        OperationalIntentState::Accepted => PlanningOutcome::Planned {
            operational_intent_id,
        },
        OperationalIntentState::Nonconforming | OperationalIntentState::Contingent => {
            PlanningOutcome::PlannedOffNominal {
                operational_intent_id,
            }
        }
        OperationalIntentState::Activated | OperationalIntentState::Ended => {
            PlanningOutcome::ReadyToFly {
                operational_intent_id,
            }
        }
    }
}

/// Map a blocked update to its NotPlanned variant.
pub fn additional_information_outcome(
    info: &AdditionalInformation,
    requesting_priority: i32,
) -> PlanningOutcome {
    let notes = format!(
        "check {} blocked by {}",
        info.check_id,
        info.conflicting_ids.join(", ")
    );
    let higher_priority_ok = info.check_id == "B"
        && info.tentative_flight_plan_processing_response == TentativeResponse::OkToFly;

    if higher_priority_ok || requesting_priority == HIGH_PRIORITY_SENTINEL {
        PlanningOutcome::not_planned(NotPlannedReason::ActivatedHigherPriorityOkToFly, notes)
    } else {
        PlanningOutcome::not_planned(NotPlannedReason::ActivatedConflict, notes)
    }
}
