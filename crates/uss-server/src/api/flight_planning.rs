//! Flight planning injection endpoints.
//!
//! Outcomes are always returned with HTTP 200; the result lives in the body.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::{error, info, Instrument, Span};

use uss_core::planning::{
    CapabilitiesResponse, ClearAreaOutcome, ClearAreaRequest, ClearAreaResponse, DeletionOutcome,
    DeletionResponse, NotPlannedReason, PlanningOutcome, PlanningResponse, UpsertFlightPlanRequest,
};

use crate::api::request_id::RequestId;
use crate::state::AppState;

/// PUT /flight_planning/v1/flight_plans/:flight_plan_id
pub async fn upsert_flight_plan(
    State(state): State<Arc<AppState>>,
    Path(flight_plan_id): Path<String>,
    request_id: Option<Extension<RequestId>>,
    body: Bytes,
) -> Json<PlanningResponse> {
    let request: UpsertFlightPlanRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return Json(
                PlanningOutcome::not_planned(
                    NotPlannedReason::InvalidFlightPlan,
                    format!("malformed flight plan: {}", err),
                )
                .into(),
            )
        }
    };

    let request_id = request_id
        .map(|Extension(id)| id.0)
        .or_else(|| request.request_id.clone());
    // Detached so a dropped connection cannot interrupt a DSS write before
    // the local record and peer notifications catch up.
    let task = tokio::spawn(
        async move {
            state
                .lifecycle
                .upsert_flight_plan(&flight_plan_id, request, request_id)
                .await
        }
        .instrument(Span::current()),
    );
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Flight plan task failed: {}", err);
            PlanningOutcome::failed(format!("flight plan processing aborted: {}", err))
        }
    };
    Json(outcome.into())
}

/// DELETE /flight_planning/v1/flight_plans/:flight_plan_id
pub async fn delete_flight_plan(
    State(state): State<Arc<AppState>>,
    Path(flight_plan_id): Path<String>,
    request_id: Option<Extension<RequestId>>,
) -> Json<DeletionResponse> {
    let request_id = request_id.map(|Extension(id)| id.0);
    let task = tokio::spawn(
        async move {
            state
                .lifecycle
                .delete_flight_plan(&flight_plan_id, request_id)
                .await
        }
        .instrument(Span::current()),
    );
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Flight plan deletion task failed: {}", err);
            DeletionOutcome::failure(format!("flight plan deletion aborted: {}", err))
        }
    };
    Json(outcome.into())
}

/// GET /flight_planning/v1/status
pub async fn status() -> Json<Value> {
    Json(json!({
        "status": "Ready",
        "system_version": env!("CARGO_PKG_VERSION"),
        "api_name": "Flight Planning Automated Testing Interface",
        "api_version": "v1",
    }))
}

/// POST /flight_planning/v1/clear_area_requests
pub async fn clear_area(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ClearAreaRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"result": format!("Could not parse clear area payload: {}", err)})),
            )
                .into_response()
        }
    };

    info!("Clear area request {}", request.request_id);
    let task = tokio::spawn(
        async move {
            state
                .lifecycle
                .clear_area(&request.extent, Some(request.request_id))
                .await
        }
        .instrument(Span::current()),
    );
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Clear area task failed: {}", err);
            ClearAreaOutcome::incomplete(format!("clear area aborted: {}", err))
        }
    };
    Json(ClearAreaResponse { outcome }).into_response()
}

/// GET /scd/v1/capabilities
pub async fn capabilities() -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse::default())
}
