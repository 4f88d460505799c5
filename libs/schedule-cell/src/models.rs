use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;

pub const DEFAULT_CONSULTATION_DURATION: i32 = 30;

// ==============================================================================
// SESSIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Morning,
    Afternoon,
    Evening,
}

impl Session {
    /// Lookup order used everywhere a session has to be picked.
    pub const ALL: [Session; 3] = [Session::Morning, Session::Afternoon, Session::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Morning => "morning",
            Session::Afternoon => "afternoon",
            Session::Evening => "evening",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSlot {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub rejection_reason: String,
}

impl SessionSlot {
    pub fn is_bookable(&self) -> bool {
        self.enabled && self.approval_status == ApprovalStatus::Approved
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    #[serde(default)]
    pub morning: SessionSlot,
    #[serde(default)]
    pub afternoon: SessionSlot,
    #[serde(default)]
    pub evening: SessionSlot,
}

impl DailySchedule {
    pub fn slot(&self, session: Session) -> &SessionSlot {
        match session {
            Session::Morning => &self.morning,
            Session::Afternoon => &self.afternoon,
            Session::Evening => &self.evening,
        }
    }

    pub fn slot_mut(&mut self, session: Session) -> &mut SessionSlot {
        match session {
            Session::Morning => &mut self.morning,
            Session::Afternoon => &mut self.afternoon,
            Session::Evening => &mut self.evening,
        }
    }

    pub fn has_approved_session(&self) -> bool {
        Session::ALL
            .iter()
            .any(|s| self.slot(*s).approval_status == ApprovalStatus::Approved)
    }

    pub fn has_session_with_status(&self, status: ApprovalStatus) -> bool {
        Session::ALL.iter().any(|s| self.slot(*s).approval_status == status)
    }

    /// Approved and enabled sessions in lookup order.
    pub fn bookable_sessions(&self) -> impl Iterator<Item = (Session, &SessionSlot)> + '_ {
        Session::ALL
            .into_iter()
            .map(move |s| (s, self.slot(s)))
            .filter(|(_, slot)| slot.is_bookable())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(default = "default_duration")]
    pub default_consultation_duration: i32,
    #[serde(default)]
    pub schedules: DailySchedule,
    #[serde(default = "initial_version")]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkSchedule {
    /// Standard slot length in minutes, never zero.
    pub fn consultation_duration(&self) -> i32 {
        if self.default_consultation_duration > 0 {
            self.default_consultation_duration
        } else {
            DEFAULT_CONSULTATION_DURATION
        }
    }
}

fn default_duration() -> i32 {
    DEFAULT_CONSULTATION_DURATION
}

fn initial_version() -> i64 {
    1
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSubmission {
    pub enabled: bool,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyScheduleSubmission {
    #[serde(default)]
    pub morning: Option<SessionSubmission>,
    #[serde(default)]
    pub afternoon: Option<SessionSubmission>,
    #[serde(default)]
    pub evening: Option<SessionSubmission>,
}

impl DailyScheduleSubmission {
    pub fn get(&self, session: Session) -> Option<&SessionSubmission> {
        match session {
            Session::Morning => self.morning.as_ref(),
            Session::Afternoon => self.afternoon.as_ref(),
            Session::Evening => self.evening.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Session::ALL.iter().all(|s| self.get(*s).is_none())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitScheduleRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub schedules: DailyScheduleSubmission,
    pub default_consultation_duration: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaySubmission {
    pub date: NaiveDate,
    pub schedules: DailyScheduleSubmission,
    pub default_consultation_duration: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiDayScheduleRequest {
    pub doctor_id: Uuid,
    pub days: Vec<DaySubmission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecurringScheduleRequest {
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// 0 = Sunday through 6 = Saturday.
    pub days_of_week: Vec<u8>,
    pub schedules: DailyScheduleSubmission,
    pub default_consultation_duration: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveSessionRequest {
    pub session: Session,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectSessionRequest {
    pub session: Session,
    pub rejection_reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateScheduleRequest {
    pub schedules: Option<DailyScheduleSubmission>,
    pub default_consultation_duration: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleListQuery {
    pub status: Option<ApprovalStatus>,
    pub doctor_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorScheduleQuery {
    pub include_all: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

// ==============================================================================
// RESULT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub schedule: WorkSchedule,
    pub created: bool,
    pub applied_sessions: Vec<Session>,
    pub skipped_sessions: Vec<Session>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDay {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSubmissionResult {
    pub successful: Vec<WorkSchedule>,
    pub failed: Vec<FailedDay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovedWindow {
    pub session: Session,
    pub start: String,
    pub end: String,
}

/// An appointment row as seen from the schedule side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedSlot {
    pub id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub schedule_id: Uuid,
    pub available_sessions: Vec<ApprovedWindow>,
    pub booked_slots: Vec<BookedSlot>,
    pub default_consultation_duration: i32,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Work schedule not found")]
    NotFound,

    #[error("Schedule exists and cannot be updated (sessions are not rejected or disabled)")]
    Locked,

    #[error("Schedule submission must include at least one session")]
    EmptySubmission,

    #[error("Invalid {session} session hours: {reason}")]
    InvalidSessionHours { session: Session, reason: String },

    #[error("Cannot {action} {session} session with status {status}")]
    InvalidTransition {
        session: Session,
        status: ApprovalStatus,
        action: &'static str,
    },

    #[error("Cannot approve disabled {0} session")]
    SessionDisabled(Session),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Work schedule was modified concurrently, please retry")]
    ConcurrentModification,

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),
}

impl From<ScheduleError> for AppError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::NotFound => AppError::NotFound(e.to_string()),
            ScheduleError::Forbidden(msg) => AppError::Forbidden(msg),
            ScheduleError::ConcurrentModification => AppError::Conflict(e.to_string()),
            ScheduleError::Database(db) => db.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
