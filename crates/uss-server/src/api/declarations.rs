//! Viewport listing of local flight declarations.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use uss_core::index::{IndexEntry, SpatialIndex};
use uss_core::models::{FlightDeclaration, OperationalIntentState};
use uss_core::spatial::BoundingBox;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeclarationQuery {
    /// "minLon,minLat,maxLon,maxLat"
    pub view: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DeclarationSummary {
    pub id: String,
    pub aircraft_id: String,
    pub state: OperationalIntentState,
    pub priority: i32,
    pub bounds: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub operational_intent_id: Option<Uuid>,
    pub raw_geojson: serde_json::Value,
}

impl From<FlightDeclaration> for DeclarationSummary {
    fn from(declaration: FlightDeclaration) -> Self {
        Self {
            operational_intent_id: declaration.operational_intent_id(),
            id: declaration.id,
            aircraft_id: declaration.aircraft_id,
            state: declaration.state,
            priority: declaration.priority,
            bounds: declaration.bounds,
            start_datetime: declaration.start_datetime,
            end_datetime: declaration.end_datetime,
            raw_geojson: declaration.raw_geojson,
        }
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

/// GET /v1/flight_declarations
pub async fn list_flight_declarations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeclarationQuery>,
) -> Response {
    let now = Utc::now();
    let start = query.start.unwrap_or(now - Duration::days(1));
    let end = query.end.unwrap_or(now + Duration::days(1));
    if start >= end {
        return bad_request("start must be before end".to_string());
    }

    let view = match query.view.as_deref().map(str::parse::<BoundingBox>) {
        None => None,
        Some(Ok(view)) => Some(view),
        Some(Err(err)) => return bad_request(format!("invalid view: {}", err)),
    };

    let declarations = match state.repository().list_by_time_window(start, end).await {
        Ok(declarations) => declarations,
        Err(err) => {
            tracing::error!("Failed to list flight declarations: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "could not list flight declarations"})),
            )
                .into_response();
        }
    };

    let selected: Vec<FlightDeclaration> = match view {
        None => declarations,
        Some(view) => {
            let mut index = SpatialIndex::new();
            index.build(declarations.into_iter().filter_map(|declaration| {
                let bbox = declaration.bounds.parse::<BoundingBox>().ok()?;
                Some(IndexEntry::new(declaration.id.clone(), bbox, declaration))
            }));
            let hits: Vec<FlightDeclaration> = index
                .intersects(&view)
                .into_iter()
                .map(|entry| entry.metadata.clone())
                .collect();
            index.teardown();
            hits
        }
    };

    let summaries: Vec<DeclarationSummary> = selected.into_iter().map(Into::into).collect();
    Json(json!({
        "count": summaries.len(),
        "flight_declarations": summaries,
    }))
    .into_response()
}
