// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use notification_cell::NotificationQueue;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub notifications: NotificationQueue,
}

pub fn appointment_routes(config: Arc<AppConfig>, notifications: NotificationQueue) -> Router {
    let state = AppointmentState {
        config: config.clone(),
        notifications,
    };

    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route("/video-meetings", get(handlers::list_video_meetings))
        .route("/video-meetings/{meeting_id}", get(handlers::get_video_meeting))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).patch(handlers::update_appointment),
        )
        .route("/{appointment_id}/approve", post(handlers::approve_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/follow-ups", post(handlers::create_follow_up))
        .route("/{appointment_id}/video/join", post(handlers::join_video_call))
        .route("/{appointment_id}/video/end", post(handlers::end_video_call))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
