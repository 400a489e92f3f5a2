use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use scheduling_cell::router::{renewal_routes, scheduling_routes};
use scheduling_cell::SchedulingState;

pub fn create_router(state: Arc<SchedulingState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Alshifa Clinic API is running!" }))
        .nest("/doctors", scheduling_routes(state.clone()))
        .nest("/schedule", renewal_routes(state.clone()))
        // Other cells added later
}
