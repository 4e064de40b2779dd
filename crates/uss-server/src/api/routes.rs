//! REST API routes.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::api::auth::{
    require_scope, ScopeGuard, ScopeSettings, SCOPE_DIRECT_AUTOMATED_TEST, SCOPE_FLIGHT_PLANNING,
    SCOPE_INJECT_TEST_DATA, SCOPE_STRATEGIC_COORDINATION,
};
use crate::api::{declarations, flight_planning, uss};
use crate::config::Config;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(config: &Config) -> Router<Arc<AppState>> {
    let settings = Arc::new(ScopeSettings::from_config(config));

    let planning_routes = Router::new()
        .route(
            "/flight_planning/v1/flight_plans/:flight_plan_id",
            put(flight_planning::upsert_flight_plan).delete(flight_planning::delete_flight_plan),
        )
        .layer(middleware::from_fn_with_state(
            ScopeGuard::new(settings.clone(), SCOPE_FLIGHT_PLANNING),
            require_scope,
        ));

    let status_routes = Router::new()
        .route("/flight_planning/v1/status", get(flight_planning::status))
        .route(
            "/flight_planning/v1/clear_area_requests",
            post(flight_planning::clear_area),
        )
        .layer(middleware::from_fn_with_state(
            ScopeGuard::new(settings.clone(), SCOPE_DIRECT_AUTOMATED_TEST),
            require_scope,
        ));

    let test_data_routes = Router::new()
        .route("/scd/v1/capabilities", get(flight_planning::capabilities))
        .layer(middleware::from_fn_with_state(
            ScopeGuard::new(settings.clone(), SCOPE_INJECT_TEST_DATA),
            require_scope,
        ));

    let uss_routes = Router::new()
        .route(
            "/uss/v1/operational_intents/:entity_id",
            get(uss::get_operational_intent_details).post(uss::notify_operational_intent_changed),
        )
        .route(
            "/uss/v1/operational_intents",
            post(uss::notify_operational_intent_details_changed),
        )
        .layer(middleware::from_fn_with_state(
            ScopeGuard::new(settings.clone(), SCOPE_STRATEGIC_COORDINATION),
            require_scope,
        ));

    let read_routes = Router::new()
        .route(
            "/v1/flight_declarations",
            get(declarations::list_flight_declarations),
        )
        .layer(middleware::from_fn_with_state(
            ScopeGuard::new(settings, config.read_scope.as_str()),
            require_scope,
        ));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(planning_routes)
        .merge(status_routes)
        .merge(test_data_routes)
        .merge(uss_routes)
        .merge(read_routes)
}
