//! API routes for the USS server.

pub mod auth;
pub mod declarations;
pub mod flight_planning;
pub mod request_id;
mod routes;
pub mod uss;

use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::state::AppState;

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    routes::create_router(config)
}

/// Complete application with state and cross-cutting layers.
pub fn app(state: Arc<AppState>) -> Router {
    routes(&state.config)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::ensure_request_id))
        .layer(CorsLayer::permissive())
}
