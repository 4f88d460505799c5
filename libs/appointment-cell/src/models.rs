// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use package_cell::PackageError;
use schedule_cell::ScheduleError;
use shared_database::SupabaseError;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

pub const FOLLOW_UP_REASON: &str = "Follow-up consultation";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    /// `HH:MM`, zero padded.
    pub start_time: String,
    pub end_time: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub appointment_fee: f64,
    #[serde(default)]
    pub medical_info: MedicalInfo,
    #[serde(default)]
    pub video_call_info: Option<VideoCallInfo>,
    #[serde(default)]
    pub is_video_call_started: bool,
    #[serde(default)]
    pub is_video_call_ended: bool,

    #[serde(default)]
    pub is_follow_up: bool,
    #[serde(default)]
    pub original_appointment_id: Option<Uuid>,
    #[serde(default)]
    pub follow_up_appointment_ids: Vec<Uuid>,

    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub approved_by: Option<Uuid>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_by: Option<Uuid>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub updated_by: Option<Uuid>,

    #[serde(default = "initial_version")]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn initial_version() -> i64 {
    1
}

impl Appointment {
    pub fn is_video(&self) -> bool {
        self.appointment_type == AppointmentType::VideoCall
    }

    /// Still occupies the doctor's calendar.
    pub fn blocks_calendar(&self) -> bool {
        !matches!(self.status, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }

    pub fn is_participant(&self, user: &User) -> bool {
        let id = user.id.as_str();
        self.patient_id.to_string() == id || self.doctor_id.to_string() == id
    }

    pub fn is_assigned_doctor(&self, user: &User) -> bool {
        user.is_doctor() && self.doctor_id.to_string() == user.id
    }

    /// Participant (patient or assigned doctor) or admin.
    pub fn can_be_managed_by(&self, user: &User) -> bool {
        user.is_admin()
            || self.is_assigned_doctor(user)
            || (user.is_patient() && self.patient_id.to_string() == user.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[default]
    InPerson,
    VideoCall,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::InPerson => "in_person",
            AppointmentType::VideoCall => "video_call",
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicalInfo {
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub current_medications: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoProvider {
    #[default]
    Zegocloud,
    Zoom,
    GoogleMeet,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoCallInfo {
    #[serde(default)]
    pub provider: VideoProvider,
    pub meeting_id: String,
    pub meeting_url: String,
    #[serde(default)]
    pub meeting_password: Option<String>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

// ==============================================================================
// PARTICIPANT RECORDS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl ParticipantRecord {
    pub fn is_doctor(&self) -> bool {
        self.role.as_deref().and_then(Role::parse) == Some(Role::Doctor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub doctor_id: Uuid,
    #[serde(default)]
    pub consultation_fee: f64,
    #[serde(default)]
    pub is_available: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub appointment_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub medical_info: MedicalInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Partial update of an appointment. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentPatch {
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub appointment_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub appointment_type: Option<AppointmentType>,
    #[serde(default)]
    pub medical_info: Option<MedicalInfo>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
}

/// Reads `YYYY-MM-DD` or an RFC 3339 timestamp, taking the UTC calendar day of the latter.
pub fn parse_date_value(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

impl AppointmentPatch {
    /// True when any supplied date or time differs from the stored appointment.
    pub fn changes_timing(&self, current: &Appointment) -> bool {
        self.appointment_date
            .as_deref()
            .is_some_and(|d| parse_date_value(d) != Some(current.appointment_date))
            || self.start_time.as_deref().is_some_and(|s| s != current.start_time)
            || self.end_time.as_deref().is_some_and(|e| e != current.end_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFollowUpRequest {
    pub appointment_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
    pub appointment_type: Option<AppointmentType>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub include_follow_ups: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentPage {
    pub appointments: Vec<Appointment>,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoMeetingSummary {
    pub appointment_id: Uuid,
    pub meeting_id: String,
    pub meeting_url: String,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub status: AppointmentStatus,
}

impl VideoMeetingSummary {
    pub fn from_appointment(appointment: &Appointment) -> Option<Self> {
        let info = appointment.video_call_info.as_ref()?;
        Some(Self {
            appointment_id: appointment.id,
            meeting_id: info.meeting_id.clone(),
            meeting_url: info.meeting_url.clone(),
            appointment_date: appointment.appointment_date,
            start_time: appointment.start_time.clone(),
            status: appointment.status,
        })
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Whether a conflicting booking is still waiting for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    PendingApproval,
    Booked,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::PendingApproval => f.write_str("is pending approval"),
            SlotState::Booked => f.write_str("is already booked"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Video meeting not found")]
    MeetingNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor is not available")]
    DoctorUnavailable,

    #[error("Date is invalid or in the past")]
    InvalidDate,

    #[error("Invalid time format")]
    InvalidTimeFormat,

    #[error("End time must be after start time")]
    InvalidTimeOrder,

    #[error("Doctor does not have a valid work schedule for this date")]
    NoWorkSchedule,

    #[error("Appointment time must be within doctor's approved working hours")]
    OutsideWorkingHours,

    #[error("Time slot from {start} to {end} {state}. Please select a different time.")]
    SlotConflict {
        start: String,
        end: String,
        state: SlotState,
    },

    #[error("{0}")]
    Forbidden(String),

    /// Operation not permitted in the appointment's current state.
    #[error("{0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid user id in token")]
    InvalidActor,

    #[error("Appointment was modified concurrently, please retry")]
    ConcurrentModification,

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound
            | AppointmentError::MeetingNotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::DoctorNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::InvalidActor => AppError::Auth(e.to_string()),
            AppointmentError::SlotConflict { .. } | AppointmentError::ConcurrentModification => {
                AppError::Conflict(e.to_string())
            }
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::Package(inner) => inner.into(),
            AppointmentError::Schedule(inner) => inner.into(),
            AppointmentError::Database(inner) => inner.into(),
            AppointmentError::Serialization(_) => AppError::Internal(e.to_string()),
            _ => AppError::BadRequest(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(date: &str, start: &str, end: &str) -> Appointment {
        serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "patient_id": Uuid::new_v4(),
            "doctor_id": Uuid::new_v4(),
            "appointment_date": date,
            "start_time": start,
            "end_time": end,
            "start_date_time": format!("{}T{}:00Z", date, start),
            "end_date_time": format!("{}T{}:00Z", date, end),
            "status": "completed",
            "appointment_fee": 200000.0,
            "created_at": "2030-02-01T08:00:00Z",
            "updated_at": "2030-02-01T08:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn same_calendar_day_in_any_format_is_not_a_timing_change() {
        let current = stored("2030-03-04", "10:00", "10:30");
        for raw in ["2030-03-04", "2030-03-04T00:00:00Z", " 2030-03-04T18:45:00+00:00 "] {
            let patch = AppointmentPatch {
                appointment_date: Some(raw.to_string()),
                ..Default::default()
            };
            assert!(!patch.changes_timing(&current), "{} should match the stored date", raw);
        }
    }

    #[test]
    fn different_or_unreadable_date_is_a_timing_change() {
        let current = stored("2030-03-04", "10:00", "10:30");
        for raw in ["2030-03-05", "2030-03-04T23:30:00-05:00", "next tuesday"] {
            let patch = AppointmentPatch {
                appointment_date: Some(raw.to_string()),
                ..Default::default()
            };
            assert!(patch.changes_timing(&current), "{} should count as a change", raw);
        }

        let moved = AppointmentPatch {
            end_time: Some("11:00".to_string()),
            ..Default::default()
        };
        assert!(moved.changes_timing(&current));
    }

    #[test]
    fn participant_role_is_read_like_a_token_role() {
        let record = |role: Option<&str>| ParticipantRecord {
            id: Uuid::new_v4(),
            email: None,
            role: role.map(str::to_string),
        };

        assert!(record(Some("doctor")).is_doctor());
        assert!(record(Some("Doctor")).is_doctor());
        assert!(!record(Some("user")).is_doctor());
        assert!(!record(Some("physician")).is_doctor());
        assert!(!record(None).is_doctor());
    }
}
