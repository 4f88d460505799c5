// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentListQuery, AppointmentPatch, CancelAppointmentRequest, CreateAppointmentRequest,
    CreateFollowUpRequest,
};
use crate::router::AppointmentState;
use crate::services::booking::AppointmentService;

fn service(state: &AppointmentState) -> AppointmentService {
    AppointmentService::new(&state.config, state.notifications.clone())
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state).create(&user, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked and waiting for approval"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = service(&state).list(&user, query, auth.token()).await?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state).get(&user, appointment_id, auth.token()).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(patch): Json<AppointmentPatch>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state)
        .update(&user, appointment_id, patch, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

#[axum::debug_handler]
pub async fn approve_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state)
        .approve(&user, appointment_id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment approved successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state)
        .cancel(&user, appointment_id, request.reason, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn create_follow_up(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CreateFollowUpRequest>,
) -> Result<Json<Value>, AppError> {
    let follow_up = service(&state)
        .create_follow_up(&user, appointment_id, request, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": follow_up,
        "message": "Follow-up appointment created"
    })))
}

// ==============================================================================
// VIDEO CALLS
// ==============================================================================

#[axum::debug_handler]
pub async fn join_video_call(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state)
        .join_video_call(&user, appointment_id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "video_call_info": appointment.video_call_info,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn end_video_call(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state)
        .end_video_call(&user, appointment_id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "video_call_info": appointment.video_call_info,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn list_video_meetings(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let meetings = service(&state).list_video_meetings(&user, auth.token()).await?;

    Ok(Json(json!({
        "meetings": meetings,
        "total": meetings.len()
    })))
}

#[axum::debug_handler]
pub async fn get_video_meeting(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(meeting_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state)
        .get_video_meeting(&user, &meeting_id, auth.token())
        .await?;

    Ok(Json(json!({
        "appointment_id": appointment.id,
        "video_call_info": appointment.video_call_info,
        "appointment": appointment
    })))
}
