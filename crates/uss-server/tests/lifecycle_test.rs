//! End-to-end lifecycle tests against a fake DSS and fake peer USSes.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

use uss_core::models::OperationalIntentState;
use uss_core::planning::{DeletionOutcome, NotPlannedReason, PlanningOutcome, UpsertFlightPlanRequest};
use uss_dss::StaticCredentialProvider;
use uss_server::api;
use uss_server::config::Config;
use uss_server::persistence::InMemoryFlightDeclarationRepository;
use uss_server::state::AppState;

const OWN: &str = "http://self.local";
const CREATE_PATH: &str = r"^/dss/v1/operational_intent_references/[0-9a-f-]+$";

fn config(dss: &MockServer) -> Config {
    let mut config = Config::from_env();
    config.uss_base_url = OWN.to_string();
    config.dss_base_url = dss.uri();
    config.database_path = String::new();
    config.enforce_scopes = false;
    config.dss_timeout_secs = 2;
    config.peer_notification_timeout_secs = 1;
    config
}

fn state_with_token(dss: &MockServer, token: &str) -> Arc<AppState> {
    Arc::new(AppState::new(
        config(dss),
        Arc::new(InMemoryFlightDeclarationRepository::new()),
        Arc::new(StaticCredentialProvider::new(token, false)),
    ))
}

fn state(dss: &MockServer) -> Arc<AppState> {
    state_with_token(dss, "dss-token")
}

fn volume_json(lat: f64, lng: f64) -> Value {
    let start = Utc::now() + Duration::minutes(1);
    let end = start + Duration::minutes(30);
    json!({
        "volume": {
            "outline_circle": {
                "center": {"lat": lat, "lng": lng},
                "radius": {"value": 200.0, "units": "M"}
            },
            "altitude_lower": {"value": 100.0, "reference": "W84", "units": "M"},
            "altitude_upper": {"value": 150.0, "reference": "W84", "units": "M"}
        },
        "time_start": {"value": start.to_rfc3339(), "format": "RFC3339"},
        "time_end": {"value": end.to_rfc3339(), "format": "RFC3339"}
    })
}

fn plan_json(usage_state: &str, uas_state: &str, lat: f64, priority: i32) -> Value {
    json!({
        "request_id": Uuid::new_v4().to_string(),
        "flight_plan": {
            "basic_information": {
                "usage_state": usage_state,
                "uas_state": uas_state,
                "area": [volume_json(lat, 7.47)]
            },
            "astm_f3548_21": {"priority": priority}
        }
    })
}

fn plan(usage_state: &str, uas_state: &str, lat: f64, priority: i32) -> UpsertFlightPlanRequest {
    serde_json::from_value(plan_json(usage_state, uas_state, lat, priority)).unwrap()
}

fn reference(id: &str, base: &str, ovn: Option<&str>, state: &str) -> Value {
    json!({
        "id": id,
        "manager": "uss",
        "version": 1,
        "state": state,
        "ovn": ovn,
        "uss_base_url": base,
    })
}

/// Echoes the requested id back in the created reference.
struct CreateResponder {
    ovn: &'static str,
    subscribers: Value,
}

impl Respond for CreateResponder {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let id = request.url.path().rsplit('/').next().unwrap_or_default().to_string();
        ResponseTemplate::new(201).set_body_json(json!({
            "subscribers": self.subscribers,
            "operational_intent_reference": reference(&id, OWN, Some(self.ovn), "Accepted"),
        }))
    }
}

async fn mount_query(dss: &MockServer, refs: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path("/dss/v1/operational_intent_references/query"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"operational_intent_references": refs})),
        )
        .mount(dss)
        .await;
}

async fn mount_create(dss: &MockServer, subscribers: Value, expected: u64) {
    Mock::given(method("PUT"))
        .and(path_regex(CREATE_PATH))
        .respond_with(CreateResponder {
            ovn: "ovn-1",
            subscribers,
        })
        .expect(expected)
        .mount(dss)
        .await;
}

fn change_response(id: Uuid, ovn: &str, state: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "subscribers": [],
        "operational_intent_reference": reference(&id.to_string(), OWN, Some(ovn), state),
    }))
}

fn planned_id(outcome: &PlanningOutcome) -> Uuid {
    match outcome {
        PlanningOutcome::Planned {
            operational_intent_id,
        } => *operational_intent_id,
        other => panic!("expected Planned, got {:?}", other),
    }
}

fn not_planned_reason(outcome: &PlanningOutcome) -> NotPlannedReason {
    match outcome {
        PlanningOutcome::NotPlanned { reason, .. } => *reason,
        other => panic!("expected NotPlanned, got {:?}", other),
    }
}

#[tokio::test]
async fn plan_activate_and_delete_notifies_subscribers() {
    let dss = MockServer::start().await;
    let peer = MockServer::start().await;
    let subscription_id = Uuid::new_v4();
    mount_query(&dss, vec![]).await;
    mount_create(
        &dss,
        json!([
            {"uss_base_url": peer.uri(), "subscriptions": [{"subscription_id": subscription_id, "notification_index": 1}]},
            {"uss_base_url": OWN, "subscriptions": [{"subscription_id": Uuid::new_v4(), "notification_index": 4}]}
        ]),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/uss/v1/operational_intents/[0-9a-f-]{36}$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&peer)
        .await;

    let state = state(&dss);
    let planned = state
        .lifecycle
        .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
        .await;
    let id = planned_id(&planned);
    let delivered = peer.received_requests().await.unwrap();
    assert_eq!(
        delivered[0].url.path(),
        format!("/uss/v1/operational_intents/{}", id)
    );

    let record = state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .expect("record stored after DSS accepted");
    assert_eq!(record.state, OperationalIntentState::Accepted);
    assert_eq!(record.ovn(), Some("ovn-1"));
    assert_eq!(record.aircraft_id, "0000");

    // Identical re-submission is idempotent.
    let again = state
        .lifecycle
        .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
        .await;
    assert_eq!(not_planned_reason(&again), NotPlannedReason::AlreadyPlanned);

    Mock::given(method("PUT"))
        .and(path(format!("/dss/v1/operational_intent_references/{}/ovn-1", id)))
        .respond_with(change_response(id, "ovn-2", "Activated"))
        .expect(1)
        .mount(&dss)
        .await;
    let activated = state
        .lifecycle
        .upsert_flight_plan("fp-1", plan("InUse", "Nominal", 46.97, 0), None)
        .await;
    assert_eq!(
        activated,
        PlanningOutcome::ReadyToFly {
            operational_intent_id: id
        }
    );
    let record = state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, OperationalIntentState::Activated);
    assert_eq!(record.ovn(), Some("ovn-2"));

    Mock::given(method("DELETE"))
        .and(path(format!("/dss/v1/operational_intent_references/{}/ovn-2", id)))
        .respond_with(change_response(id, "ovn-3", "Ended"))
        .expect(1)
        .mount(&dss)
        .await;
    let deleted = state.lifecycle.delete_flight_plan("fp-1", None).await;
    assert_eq!(deleted, DeletionOutcome::Success);
    assert!(state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn lower_priority_loses_to_remote_higher_priority() {
    let dss = MockServer::start().await;
    let peer = MockServer::start().await;
    let remote = Uuid::new_v4();
    mount_query(
        &dss,
        vec![reference(&remote.to_string(), &peer.uri(), None, "Accepted")],
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("/uss/v1/operational_intents/{}", remote)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operational_intent": {
                "reference": reference(&remote.to_string(), &peer.uri(), Some("peer-ovn"), "Accepted"),
                "details": {"volumes": [volume_json(46.97, 7.47)], "priority": 80}
            }
        })))
        .mount(&peer)
        .await;
    mount_create(&dss, json!([]), 1).await;

    let state = state(&dss);
    let lower = state
        .lifecycle
        .upsert_flight_plan("low", plan("Planned", "Nominal", 46.97, 40), None)
        .await;
    assert_eq!(not_planned_reason(&lower), NotPlannedReason::ConflictWithFlight);
    assert!(state
        .repository()
        .get_flight_declaration("low")
        .await
        .unwrap()
        .is_none());

    let higher = state
        .lifecycle
        .upsert_flight_plan("high", plan("Planned", "Nominal", 46.97, 90), None)
        .await;
    planned_id(&higher);
}

#[tokio::test]
async fn equal_priority_local_overlap_is_a_conflict() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 2).await;

    let state = state(&dss);
    planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("first", plan("Planned", "Nominal", 46.97, 50), None)
            .await,
    );

    let second = state
        .lifecycle
        .upsert_flight_plan("second", plan("Planned", "Nominal", 46.9705, 50), None)
        .await;
    assert_eq!(not_planned_reason(&second), NotPlannedReason::ConflictWithFlight);

    // Far away is fine.
    planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("third", plan("Planned", "Nominal", 47.5, 50), None)
            .await,
    );
}

#[tokio::test]
async fn activation_into_higher_priority_flight_is_activated_conflict() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 2).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/dss/v1/operational_intent_references/[0-9a-f-]+/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&dss)
        .await;

    let state = state(&dss);
    planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("emergency", plan("Planned", "Nominal", 46.97, 100), None)
            .await,
    );
    planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("survey", plan("Planned", "Nominal", 47.5, 10), None)
            .await,
    );

    let moved = state
        .lifecycle
        .upsert_flight_plan("survey", plan("InUse", "Nominal", 46.97, 10), None)
        .await;
    assert_eq!(not_planned_reason(&moved), NotPlannedReason::ActivatedConflict);

    let sentinel = state
        .lifecycle
        .upsert_flight_plan("survey", plan("InUse", "Nominal", 46.97, 100), None)
        .await;
    assert_eq!(
        not_planned_reason(&sentinel),
        NotPlannedReason::ActivatedHigherPriorityOkToFly
    );

    let record = state
        .repository()
        .get_flight_declaration("survey")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, OperationalIntentState::Accepted);
}

#[tokio::test]
async fn stale_ovn_is_refetched_and_retried_once() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 1).await;

    let state = state(&dss);
    let id = planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
            .await,
    );

    Mock::given(method("PUT"))
        .and(path(format!("/dss/v1/operational_intent_references/{}/ovn-1", id)))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&dss)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/dss/v1/operational_intent_references/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operational_intent_reference": reference(&id.to_string(), OWN, Some("ovn-9"), "Accepted")
        })))
        .expect(1)
        .mount(&dss)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/dss/v1/operational_intent_references/{}/ovn-9", id)))
        .respond_with(change_response(id, "ovn-10", "Nonconforming"))
        .expect(1)
        .mount(&dss)
        .await;

    let outcome = state
        .lifecycle
        .upsert_flight_plan("fp-1", plan("InUse", "OffNominal", 46.97, 0), None)
        .await;
    assert_eq!(
        outcome,
        PlanningOutcome::PlannedOffNominal {
            operational_intent_id: id
        }
    );
    let record = state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, OperationalIntentState::Nonconforming);
    assert_eq!(record.ovn(), Some("ovn-10"));
    let details = &record.operational_intent.unwrap().details;
    assert_eq!(details.off_nominal_volumes.len(), 1);
}

#[tokio::test]
async fn repeated_staleness_fails_deletion() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 1).await;

    let state = state(&dss);
    let id = planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
            .await,
    );

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(409))
        .expect(2)
        .mount(&dss)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/dss/v1/operational_intent_references/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operational_intent_reference": reference(&id.to_string(), OWN, Some("ovn-2"), "Accepted")
        })))
        .mount(&dss)
        .await;

    let outcome = state.lifecycle.delete_flight_plan("fp-1", None).await;
    assert!(matches!(outcome, DeletionOutcome::Failure { .. }));
    let record = state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .expect("record kept after failed deletion");
    assert_eq!(record.ovn(), Some("ovn-2"));
}

#[tokio::test]
async fn dss_timeout_on_create_is_retryable_and_not_persisted() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    Mock::given(method("PUT"))
        .and(path_regex(CREATE_PATH))
        .respond_with(ResponseTemplate::new(408))
        .mount(&dss)
        .await;

    let state = state(&dss);
    let outcome = state
        .lifecycle
        .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
        .await;
    assert_eq!(not_planned_reason(&outcome), NotPlannedReason::Retryable);
    assert!(state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn dss_rejection_on_create_is_failed() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    Mock::given(method("PUT"))
        .and(path_regex(CREATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad extents"))
        .mount(&dss)
        .await;

    let outcome = state(&dss)
        .lifecycle
        .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
        .await;
    assert!(matches!(outcome, PlanningOutcome::Failed { .. }));
}

#[tokio::test]
async fn missing_credentials_fail_before_any_dss_call() {
    let dss = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&dss)
        .await;

    let outcome = state_with_token(&dss, "")
        .lifecycle
        .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
        .await;
    assert!(matches!(outcome, PlanningOutcome::Failed { .. }));
}

#[tokio::test]
async fn closing_is_not_an_upsert_transition() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 1).await;

    let state = state(&dss);
    let unknown = state
        .lifecycle
        .upsert_flight_plan("fp-0", plan("Closed", "Nominal", 46.97, 0), None)
        .await;
    assert_eq!(not_planned_reason(&unknown), NotPlannedReason::InvalidFlightPlan);

    planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 0), None)
            .await,
    );
    let closed = state
        .lifecycle
        .upsert_flight_plan("fp-1", plan("Closed", "Nominal", 46.97, 0), None)
        .await;
    assert!(matches!(closed, PlanningOutcome::Failed { .. }));
    let record = state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, OperationalIntentState::Accepted);
}

#[tokio::test]
async fn injection_api_round_trip() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 1).await;

    let state = state(&dss);
    let app = api::app(state.clone());

    let request = Request::builder()
        .method("PUT")
        .uri("/flight_planning/v1/flight_plans/fp-http")
        .header("content-type", "application/json")
        .header("x-request-id", "req-42")
        .body(Body::from(plan_json("Planned", "Nominal", 46.97, 0).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["result"], "Planned");
    assert_eq!(body["flight_plan_status"], "Planned");
    assert!(body["operational_intent_id"].is_string());

    let received = dss.received_requests().await.unwrap();
    assert!(received.iter().all(|request| request
        .headers
        .get("x-request-id")
        .map(|value| value == "req-42")
        .unwrap_or(false)));
}

#[tokio::test]
async fn invalid_serial_number_is_rejected_without_dss() {
    let dss = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&dss)
        .await;

    let mut request = plan_json("Planned", "Nominal", 46.97, 0);
    request["flight_plan"]["uspace_flight_authorisation"] = json!({
        "uas_serial_number": "INVALID-SERIAL",
        "operator_id": "FIN87astrdge12k8-xyz"
    });
    let request: UpsertFlightPlanRequest = serde_json::from_value(request).unwrap();

    let outcome = state(&dss)
        .lifecycle
        .upsert_flight_plan("fp-1", request, None)
        .await;
    assert_eq!(not_planned_reason(&outcome), NotPlannedReason::InvalidFlightPlan);
}

#[tokio::test]
async fn valid_authorisation_sets_aircraft_id() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 1).await;

    let mut request = plan_json("Planned", "Nominal", 46.97, 0);
    request["flight_plan"]["uspace_flight_authorisation"] = json!({
        "uas_serial_number": "1AF49UL5CC5J6K",
        "operator_id": "FIN87astrdge12k8-xyz"
    });
    let request: UpsertFlightPlanRequest = serde_json::from_value(request).unwrap();

    let state = state(&dss);
    planned_id(&state.lifecycle.upsert_flight_plan("fp-1", request, None).await);
    let record = state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.aircraft_id, "1AF49UL5CC5J6K");
}

#[tokio::test]
async fn slow_peer_details_make_creation_retryable() {
    let dss = MockServer::start().await;
    let peer = MockServer::start().await;
    let remote = Uuid::new_v4();
    mount_query(
        &dss,
        vec![reference(&remote.to_string(), &peer.uri(), None, "Accepted")],
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&peer)
        .await;
    mount_create(&dss, json!([]), 0).await;

    let mut config = config(&dss);
    config.dss_timeout_secs = 1;
    let state = AppState::new(
        config,
        Arc::new(InMemoryFlightDeclarationRepository::new()),
        Arc::new(StaticCredentialProvider::new("dss-token", false)),
    );

    let outcome = state
        .lifecycle
        .upsert_flight_plan("fp-1", plan("Planned", "Nominal", 46.97, 40), None)
        .await;
    assert_eq!(not_planned_reason(&outcome), NotPlannedReason::Retryable);
    assert!(state
        .repository()
        .get_flight_declaration("fp-1")
        .await
        .unwrap()
        .is_none());
}

/// Holds every response back for a fixed delay.
struct Delayed<R>(R, std::time::Duration);

impl<R: Respond> Respond for Delayed<R> {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        self.0.respond(request).set_delay(self.1)
    }
}

#[tokio::test]
async fn disconnected_client_does_not_orphan_the_dss_reference() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    Mock::given(method("PUT"))
        .and(path_regex(CREATE_PATH))
        .respond_with(Delayed(
            CreateResponder {
                ovn: "ovn-1",
                subscribers: json!([]),
            },
            std::time::Duration::from_millis(500),
        ))
        .expect(1)
        .mount(&dss)
        .await;

    let state = state(&dss);
    let app = api::app(state.clone());
    let request = Request::builder()
        .method("PUT")
        .uri("/flight_planning/v1/flight_plans/fp-gone")
        .header("content-type", "application/json")
        .body(Body::from(plan_json("Planned", "Nominal", 46.97, 0).to_string()))
        .unwrap();

    // The caller gives up while the DSS write is still in flight.
    let abandoned =
        tokio::time::timeout(std::time::Duration::from_millis(100), app.oneshot(request)).await;
    assert!(abandoned.is_err());

    let mut stored = None;
    for _ in 0..40 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stored = state
            .repository()
            .get_flight_declaration("fp-gone")
            .await
            .unwrap();
        if stored.is_some() {
            break;
        }
    }
    let record = stored.expect("record stored after the caller disconnected");
    assert_eq!(record.ovn(), Some("ovn-1"));
}

#[tokio::test]
async fn clear_area_removes_local_and_orphaned_intents_inside_extent() {
    let dss = MockServer::start().await;
    let orphan = Uuid::new_v4();
    mount_query(
        &dss,
        vec![reference(&orphan.to_string(), OWN, Some("orphan-ovn"), "Accepted")],
    )
    .await;
    mount_create(&dss, json!([]), 2).await;

    let state = state(&dss);
    let near = planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("near", plan("Planned", "Nominal", 46.97, 0), None)
            .await,
    );
    planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("far", plan("Planned", "Nominal", 47.5, 0), None)
            .await,
    );

    Mock::given(method("DELETE"))
        .and(path(format!("/dss/v1/operational_intent_references/{}/ovn-1", near)))
        .respond_with(change_response(near, "ovn-2", "Ended"))
        .expect(1)
        .mount(&dss)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!(
            "/dss/v1/operational_intent_references/{}/orphan-ovn",
            orphan
        )))
        .respond_with(change_response(orphan, "orphan-ovn-2", "Ended"))
        .expect(1)
        .mount(&dss)
        .await;

    let extent = serde_json::from_value(volume_json(46.97, 7.47)).unwrap();
    let outcome = state
        .lifecycle
        .clear_area(&extent, Some("clear-1".to_string()))
        .await;
    assert!(outcome.success, "{:?}", outcome.message);

    assert!(state
        .repository()
        .get_flight_declaration("near")
        .await
        .unwrap()
        .is_none());
    assert!(state
        .repository()
        .get_flight_declaration("far")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn clear_area_reports_failed_deletions() {
    let dss = MockServer::start().await;
    mount_query(&dss, vec![]).await;
    mount_create(&dss, json!([]), 1).await;

    let state = state(&dss);
    planned_id(
        &state
            .lifecycle
            .upsert_flight_plan("stuck", plan("Planned", "Nominal", 46.97, 0), None)
            .await,
    );
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&dss)
        .await;

    let extent = serde_json::from_value(volume_json(46.97, 7.47)).unwrap();
    let outcome = state.lifecycle.clear_area(&extent, None).await;
    assert!(!outcome.success);
    assert!(outcome.message.unwrap().starts_with("stuck:"));
    assert!(state
        .repository()
        .get_flight_declaration("stuck")
        .await
        .unwrap()
        .is_some());
}
