// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    ApproveSessionRequest, AvailabilityRangeQuery, DoctorScheduleQuery, MultiDayScheduleRequest,
    RecurringScheduleRequest, RejectSessionRequest, ScheduleListQuery, SubmitScheduleRequest,
    UpdateScheduleRequest,
};
use crate::services::{availability::AvailabilityResolver, schedule::WorkScheduleService};

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_schedules_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DoctorScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let schedules = service
        .list_for_doctor(
            doctor_id,
            query.include_all.unwrap_or(false),
            query.start_date,
            query.end_date,
            None,
        )
        .await?;

    Ok(Json(json!({
        "schedules": schedules,
        "total": schedules.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_availability_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailabilityRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(&state);

    let days = resolver
        .availability_with_bookings(doctor_id, query.start_date, query.end_date, None)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "availability": days
    })))
}

// ==============================================================================
// DOCTOR SUBMISSIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn submit_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SubmitScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let outcome = service.submit(&user, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "created": outcome.created,
        "schedule": outcome.schedule,
        "applied_sessions": outcome.applied_sessions,
        "skipped_sessions": outcome.skipped_sessions
    })))
}

#[axum::debug_handler]
pub async fn submit_multi_day(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<MultiDayScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let result = service.submit_multi_day(&user, request, auth.token()).await?;

    Ok(Json(json!(result)))
}

#[axum::debug_handler]
pub async fn submit_recurring(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RecurringScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let result = service.submit_recurring(&user, request, auth.token()).await?;

    Ok(Json(json!(result)))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let schedule = service.update_schedule(&user, schedule_id, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ScheduleListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let schedules = service.list_schedules(&user, query, auth.token()).await?;

    Ok(Json(json!({
        "schedules": schedules,
        "total": schedules.len()
    })))
}

#[axum::debug_handler]
pub async fn approve_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<ApproveSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let schedule = service
        .approve_session(&user, schedule_id, request.session, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} session approved successfully", request.session),
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn reject_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<RejectSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    let schedule = service
        .reject_session(&user, schedule_id, request.session, &request.rejection_reason, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} session rejected", request.session),
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = WorkScheduleService::new(&state);

    service.delete_schedule(&user, schedule_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Work schedule removed"
    })))
}
