use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::SchedulingState;

/// Doctor-scoped scheduling routes, mounted under `/doctors`.
pub fn scheduling_routes(state: Arc<SchedulingState>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots))
        .route("/{doctor_id}/schedule/day", get(handlers::get_day_schedule))
        .route("/{doctor_id}/schedule/range", get(handlers::get_range_schedule));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        // Schedule template management
        .route("/{doctor_id}/schedule-settings", get(handlers::get_schedule_settings))
        .route("/{doctor_id}/schedule-settings", put(handlers::save_schedule_settings))
        .route("/{doctor_id}/periodic-settings", get(handlers::get_periodic_settings))
        .route("/{doctor_id}/periodic-settings", put(handlers::save_periodic_settings))

        // Slot window management
        .route("/{doctor_id}/schedule/materialize", post(handlers::materialize_schedule))
        .route("/{doctor_id}/slots", patch(handlers::mark_slot))
        .route("/{doctor_id}/conflicts", get(handlers::check_conflicts))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Renewal sweep routes, mounted under `/schedule`.
pub fn renewal_routes(state: Arc<SchedulingState>) -> Router {
    let protected_routes = Router::new()
        .route("/renewal/run", post(handlers::run_renewal))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
