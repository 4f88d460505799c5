// libs/appointment-cell/src/services/query.rs
//! PostgREST filters for appointment listings.

use shared_models::auth::User;

use crate::models::{AppointmentError, AppointmentListQuery};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

const SORTABLE_FIELDS: [&str; 5] = [
    "appointment_date",
    "start_date_time",
    "created_at",
    "appointment_fee",
    "status",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ListPlan {
    pub path: String,
    pub page: u32,
    pub limit: u32,
}

/// Builds the listing request. One row past `limit` is requested to detect a next page.
pub fn list_plan(actor: &User, query: &AppointmentListQuery) -> Result<ListPlan, AppointmentError> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(AppointmentError::Validation("page must be at least 1".to_string()));
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppointmentError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let sort_by = query.sort_by.as_deref().unwrap_or("appointment_date");
    if !SORTABLE_FIELDS.contains(&sort_by) {
        return Err(AppointmentError::Validation(format!("Cannot sort by {}", sort_by)));
    }
    let direction = match query.sort_order.as_deref().unwrap_or("desc") {
        "asc" => "asc",
        "desc" => "desc",
        other => {
            return Err(AppointmentError::Validation(format!("Invalid sort order {}", other)));
        }
    };

    let mut filters: Vec<String> = Vec::new();

    // Scope first: patients and doctors only ever see their own rows.
    if actor.is_patient() {
        filters.push(format!("patient_id=eq.{}", urlencoding::encode(&actor.id)));
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
    } else if actor.is_doctor() {
        filters.push(format!("doctor_id=eq.{}", urlencoding::encode(&actor.id)));
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
    } else if actor.is_admin() {
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
    } else {
        return Err(AppointmentError::Forbidden(
            "Your role does not allow listing appointments".to_string(),
        ));
    }

    if let Some(status) = query.status {
        filters.push(format!("status=eq.{}", status));
    }
    if let Some(kind) = query.appointment_type {
        filters.push(format!("appointment_type=eq.{}", kind));
    }
    if let Some(start) = query.start_date {
        filters.push(format!("appointment_date=gte.{}", start));
    }
    if let Some(end) = query.end_date {
        filters.push(format!("appointment_date=lte.{}", end));
    }
    if !query.include_follow_ups.unwrap_or(false) {
        filters.push("is_follow_up=eq.false".to_string());
    }

    let offset = page
        .saturating_sub(1)
        .checked_mul(limit)
        .ok_or_else(|| AppointmentError::Validation("page is out of range".to_string()))?;

    filters.push(format!("order={}.{}", sort_by, direction));
    filters.push(format!("limit={}", limit + 1));
    filters.push(format!("offset={}", offset));

    Ok(ListPlan {
        path: format!("/rest/v1/appointments?{}", filters.join("&")),
        page,
        limit,
    })
}
