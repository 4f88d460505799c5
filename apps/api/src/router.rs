use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::appointment_routes;
use notification_cell::NotificationQueue;
use package_cell::router::package_routes;
use schedule_cell::router::schedule_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>, notifications: NotificationQueue) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/work-schedules", schedule_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone(), notifications))
        .nest("/packages", package_routes(state))
}
