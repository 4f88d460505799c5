use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_schedules_public))
        .route("/doctors/{doctor_id}/availability", get(handlers::get_doctor_availability_public));

    let protected_routes = Router::new()
        .route("/", post(handlers::submit_schedule).get(handlers::list_schedules))
        .route("/multi-day", post(handlers::submit_multi_day))
        .route("/recurring", post(handlers::submit_recurring))
        .route(
            "/{schedule_id}",
            patch(handlers::update_schedule).delete(handlers::delete_schedule),
        )
        .route("/{schedule_id}/approve", post(handlers::approve_session))
        .route("/{schedule_id}/reject", post(handlers::reject_session))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
