//! Endpoints served to peer USSes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use uss_core::ledger::NotificationFreshness;
use uss_dss::peer::GetOperationalIntentDetailsResponse;
use uss_dss::PutOperationalIntentDetailsParameters;

use crate::state::AppState;

/// GET /uss/v1/operational_intents/:entity_id
pub async fn get_operational_intent_details(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Response {
    let Ok(id) = entity_id.parse::<Uuid>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": format!("'{}' is not a valid operational intent id", entity_id)})),
        )
            .into_response();
    };

    match state.repository().find_by_operational_intent_id(id).await {
        Ok(Some(declaration)) => match declaration.operational_intent {
            Some(operational_intent) => {
                Json(GetOperationalIntentDetailsResponse { operational_intent }).into_response()
            }
            None => not_found(id),
        },
        Ok(None) => not_found(id),
        Err(err) => {
            tracing::error!("Failed to load operational intent {}: {}", id, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "could not load operational intent"})),
            )
                .into_response()
        }
    }
}

fn not_found(id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": format!("operational intent {} is not managed here", id)})),
    )
        .into_response()
}

/// POST /uss/v1/operational_intents/:entity_id
pub async fn notify_operational_intent_changed(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(notification): Json<PutOperationalIntentDetailsParameters>,
) -> Response {
    if entity_id.parse::<Uuid>().ok() != Some(notification.operational_intent_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": format!(
                "path id '{}' does not match operational_intent_id {}",
                entity_id, notification.operational_intent_id
            )})),
        )
            .into_response();
    }
    record_notification(&state, &notification);
    StatusCode::NO_CONTENT.into_response()
}

/// POST /uss/v1/operational_intents
///
/// Same notification without the id in the path.
pub async fn notify_operational_intent_details_changed(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<PutOperationalIntentDetailsParameters>,
) -> StatusCode {
    record_notification(&state, &notification);
    StatusCode::NO_CONTENT
}

fn record_notification(state: &AppState, notification: &PutOperationalIntentDetailsParameters) {
    match state.observe_notification(&notification.subscriptions) {
        NotificationFreshness::Fresh => tracing::info!(
            "Operational intent {} changed ({})",
            notification.operational_intent_id,
            if notification.operational_intent.is_some() {
                "updated"
            } else {
                "removed"
            }
        ),
        NotificationFreshness::Duplicate => tracing::debug!(
            "Ignoring duplicate notification for {}",
            notification.operational_intent_id
        ),
        NotificationFreshness::Malformed => tracing::warn!(
            "Notification for {} names no subscriptions, ignoring",
            notification.operational_intent_id
        ),
    }
}
