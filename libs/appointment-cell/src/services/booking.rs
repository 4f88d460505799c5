// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notification_cell::NotificationQueue;
use package_cell::PackageLedgerService;
use schedule_cell::clock::{is_ordered_window, is_valid_clock};
use schedule_cell::services::availability::find_containing_session;
use schedule_cell::AvailabilityResolver;
use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentPage, AppointmentPatch,
    AppointmentStatus, AppointmentType, CreateAppointmentRequest, CreateFollowUpRequest,
    MedicalInfo, SlotState, VideoMeetingSummary, FOLLOW_UP_REASON,
};
use crate::models::parse_date_value;
use crate::services::conflict::ConflictDetector;
use crate::services::directory::ParticipantDirectory;
use crate::services::{lifecycle, pricing, query, video};

const MAX_LINK_ATTEMPTS: usize = 3;

/// A requested window that passed the date, format, schedule, containment and conflict checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSlot {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    /// Doctor's standard slot length for that day.
    pub consultation_duration: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reschedule {
    pub slot: ValidatedSlot,
    pub fee: f64,
}

pub struct AppointmentService {
    supabase: Arc<SupabaseClient>,
    resolver: AvailabilityResolver,
    conflicts: ConflictDetector,
    directory: ParticipantDirectory,
    ledger: PackageLedgerService,
    notifications: NotificationQueue,
    client_url: String,
}

impl AppointmentService {
    pub fn new(config: &AppConfig, notifications: NotificationQueue) -> Self {
        Self::with_client(
            Arc::new(SupabaseClient::new(config)),
            &config.client_url,
            notifications,
        )
    }

    pub fn with_client(
        supabase: Arc<SupabaseClient>,
        client_url: &str,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            resolver: AvailabilityResolver::with_client(supabase.clone()),
            conflicts: ConflictDetector::new(supabase.clone()),
            directory: ParticipantDirectory::new(supabase.clone()),
            ledger: PackageLedgerService::with_client(supabase.clone()),
            supabase,
            notifications,
            client_url: client_url.trim_end_matches('/').to_string(),
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    #[instrument(skip(self, actor, request, auth_token), fields(doctor_id = %request.doctor_id, date = %request.appointment_date))]
    pub async fn create(
        &self,
        actor: &User,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let actor_id = actor_uuid(actor)?;
        if actor.is_patient() {
            if actor_id != request.patient_id {
                return Err(AppointmentError::Forbidden(
                    "Patients can only book appointments for themselves".to_string(),
                ));
            }
        } else if !actor.is_staff() {
            return Err(AppointmentError::Forbidden(
                "Your role does not allow booking appointments".to_string(),
            ));
        }

        let token = Some(auth_token);
        let (patient, profile) = self
            .directory
            .require_bookable_pair(request.patient_id, request.doctor_id, token)
            .await?;

        let slot = self
            .validate_slot(
                request.doctor_id,
                &request.appointment_date,
                &request.start_time,
                &request.end_time,
                None,
                token,
            )
            .await?;

        let duration = pricing::window_minutes(&slot.start_time, &slot.end_time)
            .ok_or(AppointmentError::InvalidTimeOrder)?;
        let fee = pricing::appointment_fee(profile.consultation_fee, duration, slot.consultation_duration);

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            appointment_date: slot.date,
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            start_date_time: slot.start_date_time,
            end_date_time: slot.end_date_time,
            appointment_type: request.appointment_type,
            status: AppointmentStatus::Pending,
            appointment_fee: fee,
            medical_info: request.medical_info,
            video_call_info: None,
            is_video_call_started: false,
            is_video_call_ended: false,
            is_follow_up: false,
            original_appointment_id: None,
            follow_up_appointment_ids: Vec::new(),
            created_by: Some(actor_id),
            approved_by: None,
            approved_at: None,
            cancelled_by: None,
            cancelled_at: None,
            cancel_reason: None,
            updated_by: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let created = self.insert(&appointment, auth_token).await?;
        info!(
            "Booked appointment {} for patient {} on {} {}-{} (fee {})",
            created.id, created.patient_id, created.appointment_date, created.start_time,
            created.end_time, created.appointment_fee
        );

        if let Some(email) = patient.email.as_deref() {
            self.notifications.notify(
                email,
                "Appointment request received",
                &format!(
                    "Your appointment on {} from {} to {} is waiting for the doctor's approval.",
                    created.appointment_date, created.start_time, created.end_time
                ),
            );
        }

        Ok(created)
    }

    /// Runs the date, time format, work schedule, containment and conflict checks for a window.
    pub async fn validate_slot(
        &self,
        doctor_id: Uuid,
        raw_date: &str,
        start: &str,
        end: &str,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<ValidatedSlot, AppointmentError> {
        let date = parse_appointment_date(raw_date, Utc::now().date_naive())?;
        check_window(start, end)?;

        let schedule = self
            .resolver
            .resolve_approved_schedule(doctor_id, date, auth_token)
            .await?
            .ok_or(AppointmentError::NoWorkSchedule)?;

        let session = find_containing_session(&schedule.schedules, start, end)
            .ok_or(AppointmentError::OutsideWorkingHours)?;
        debug!("Window {}-{} fits the {} session", start, end, session);

        self.conflicts
            .ensure_slot_free(doctor_id, date, start, end, exclude_appointment_id, auth_token)
            .await?;

        let (start_date_time, end_date_time) = slot_instants(date, start, end)?;
        Ok(ValidatedSlot {
            date,
            start_time: start.to_string(),
            end_time: end.to_string(),
            start_date_time,
            end_date_time,
            consultation_duration: schedule.consultation_duration(),
        })
    }

    // ==============================================================================
    // LIFECYCLE
    // ==============================================================================

    #[instrument(skip(self, actor, auth_token))]
    pub async fn approve(
        &self,
        actor: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !actor.is_staff() {
            return Err(AppointmentError::Forbidden(
                "Only doctors or administrators can approve appointments".to_string(),
            ));
        }
        let actor_id = actor_uuid(actor)?;

        let current = self.fetch(appointment_id, auth_token).await?;
        if actor.is_doctor() && current.doctor_id != actor_id {
            return Err(AppointmentError::Forbidden(
                "You can only approve your own appointments".to_string(),
            ));
        }
        if current.status != AppointmentStatus::Pending {
            return Err(AppointmentError::InvalidState(format!(
                "Cannot approve appointment with status {}",
                current.status
            )));
        }

        let credit = self.ledger.consume_credit(current.patient_id, Some(auth_token)).await?;

        let confirmed = confirm(&current, actor_id, &self.client_url, Utc::now());
        let saved = match self.persist(&current, confirmed, auth_token).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Approval of {} failed after debit, restoring credit: {}", appointment_id, e);
                if let Err(restore_err) = self.ledger.restore_credit(&credit, Some(auth_token)).await {
                    error!(
                        "Could not restore credit on package {}: {}",
                        credit.package.id, restore_err
                    );
                }
                return Err(e);
            }
        };

        info!(
            "Appointment {} confirmed by {} ({} credits left on package {})",
            saved.id, actor_id, credit.package.remaining_appointments, credit.package.id
        );

        let mut body = format!(
            "Your appointment on {} from {} to {} has been confirmed.",
            saved.appointment_date, saved.start_time, saved.end_time
        );
        if let Some(info) = &saved.video_call_info {
            body.push_str(&format!(" Join the video call at {}", info.meeting_url));
        }
        self.notify_user(saved.patient_id, "Appointment confirmed", &body, auth_token).await;

        Ok(saved)
    }

    #[instrument(skip(self, actor, reason, auth_token))]
    pub async fn cancel(
        &self,
        actor: &User,
        appointment_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let actor_id = actor_uuid(actor)?;
        let current = self.fetch(appointment_id, auth_token).await?;
        authorize_manage(&current, actor)?;
        lifecycle::ensure_cancellable(current.status)?;

        let cancelled = mark_cancelled(&current, actor_id, reason, Utc::now());
        let saved = self.persist(&current, cancelled, auth_token).await?;
        info!("Appointment {} cancelled by {}", saved.id, actor_id);

        self.notify_user(
            saved.patient_id,
            "Appointment cancelled",
            &format!(
                "Your appointment on {} from {} to {} has been cancelled.",
                saved.appointment_date, saved.start_time, saved.end_time
            ),
            auth_token,
        )
        .await;

        Ok(saved)
    }

    #[instrument(skip(self, actor, patch, auth_token))]
    pub async fn update(
        &self,
        actor: &User,
        appointment_id: Uuid,
        patch: AppointmentPatch,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let actor_id = actor_uuid(actor)?;
        let current = self.fetch(appointment_id, auth_token).await?;
        authorize_manage(&current, actor)?;

        if let Some(next_status) = patch.status.filter(|s| *s != current.status) {
            let staff_only = matches!(
                next_status,
                AppointmentStatus::Confirmed | AppointmentStatus::Completed | AppointmentStatus::NoShow
            );
            if staff_only && !actor.is_staff() {
                return Err(AppointmentError::Forbidden(
                    "Only doctors or administrators can confirm or complete appointments".to_string(),
                ));
            }
            if next_status == AppointmentStatus::Confirmed {
                return Err(AppointmentError::InvalidState(
                    "Pending appointments are confirmed through approval".to_string(),
                ));
            }
            if next_status == AppointmentStatus::Cancelled {
                lifecycle::ensure_cancellable(current.status)?;
            }
            lifecycle::validate_transition(current.status, next_status)?;
        }

        let reschedule = if patch.changes_timing(&current) {
            if !matches!(current.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed) {
                return Err(AppointmentError::InvalidState(format!(
                    "Cannot reschedule an appointment with status {}",
                    current.status
                )));
            }

            let raw_date = patch
                .appointment_date
                .clone()
                .unwrap_or_else(|| current.appointment_date.to_string());
            let start = patch.start_time.as_deref().unwrap_or(&current.start_time);
            let end = patch.end_time.as_deref().unwrap_or(&current.end_time);

            let slot = self
                .validate_slot(current.doctor_id, &raw_date, start, end, Some(current.id), Some(auth_token))
                .await?;

            let duration = pricing::window_minutes(&slot.start_time, &slot.end_time)
                .ok_or(AppointmentError::InvalidTimeOrder)?;
            let fee = match self.directory.find_doctor_profile(current.doctor_id, Some(auth_token)).await? {
                Some(profile) => {
                    pricing::appointment_fee(profile.consultation_fee, duration, slot.consultation_duration)
                }
                None => current.appointment_fee,
            };

            Some(Reschedule { slot, fee })
        } else {
            None
        };

        let next = apply_patch(&current, &patch, reschedule.as_ref(), actor_id, Utc::now());
        let saved = self.persist(&current, next, auth_token).await?;
        info!("Appointment {} updated by {} (status {})", saved.id, actor_id, saved.status);

        Ok(saved)
    }

    // ==============================================================================
    // VIDEO CALLS
    // ==============================================================================

    pub async fn join_video_call(
        &self,
        actor: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.fetch(appointment_id, auth_token).await?;
        require_assigned_doctor(&current, actor)?;

        let mut next = video::start_call(&current, &self.client_url, Utc::now())?;
        next.updated_by = Some(actor_uuid(actor)?);

        let saved = self.persist(&current, next, auth_token).await?;
        info!("Video call for appointment {} started", saved.id);
        Ok(saved)
    }

    pub async fn end_video_call(
        &self,
        actor: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.fetch(appointment_id, auth_token).await?;
        require_assigned_doctor(&current, actor)?;

        let mut next = video::end_call(&current, Utc::now())?;
        next.updated_by = Some(actor_uuid(actor)?);

        let saved = self.persist(&current, next, auth_token).await?;
        info!(
            "Video call for appointment {} ended after {:?} minutes",
            saved.id,
            saved.video_call_info.as_ref().and_then(|v| v.duration_minutes)
        );
        Ok(saved)
    }

    pub async fn list_video_meetings(
        &self,
        actor: &User,
        auth_token: &str,
    ) -> Result<Vec<VideoMeetingSummary>, AppointmentError> {
        let mut path = "/rest/v1/appointments?appointment_type=eq.video_call&video_call_info=not.is.null\
                        &order=appointment_date.desc"
            .to_string();
        if actor.is_doctor() {
            path.push_str(&format!("&doctor_id=eq.{}", actor_uuid(actor)?));
        } else if !actor.is_admin() {
            return Err(AppointmentError::Forbidden(
                "Only doctors or administrators can list video meetings".to_string(),
            ));
        }

        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        Ok(rows.iter().filter_map(VideoMeetingSummary::from_appointment).collect())
    }

    pub async fn get_video_meeting(
        &self,
        actor: &User,
        meeting_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?video_call_info->>meeting_id=eq.{}",
            urlencoding::encode(meeting_id)
        );
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        let appointment = rows.into_iter().next().ok_or(AppointmentError::MeetingNotFound)?;

        authorize_view(&appointment, actor)?;
        Ok(appointment)
    }

    // ==============================================================================
    // FOLLOW-UPS
    // ==============================================================================

    #[instrument(skip(self, actor, request, auth_token))]
    pub async fn create_follow_up(
        &self,
        actor: &User,
        original_id: Uuid,
        request: CreateFollowUpRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !actor.is_staff() {
            return Err(AppointmentError::Forbidden(
                "Only doctors or administrators can create follow-up appointments".to_string(),
            ));
        }
        let actor_id = actor_uuid(actor)?;

        let original = self.fetch(original_id, auth_token).await?;
        if actor.is_doctor() && original.doctor_id != actor_id {
            return Err(AppointmentError::Forbidden(
                "You can only create follow-ups for your own appointments".to_string(),
            ));
        }
        if original.status == AppointmentStatus::Cancelled {
            return Err(AppointmentError::InvalidState(
                "Cannot create a follow-up for a cancelled appointment".to_string(),
            ));
        }

        let slot = self
            .validate_slot(
                original.doctor_id,
                &request.appointment_date,
                &request.start_time,
                &request.end_time,
                None,
                Some(auth_token),
            )
            .await?;

        let follow_up = build_follow_up(&original, &slot, &request, actor_id, &self.client_url, Utc::now());
        let created = self.insert(&follow_up, auth_token).await?;
        info!("Follow-up {} created from appointment {}", created.id, original.id);

        self.link_follow_up(original, created.id, auth_token).await;

        let mut body = format!(
            "A follow-up consultation has been scheduled on {} from {} to {}.",
            created.appointment_date, created.start_time, created.end_time
        );
        if let Some(info) = &created.video_call_info {
            body.push_str(&format!(" Join the video call at {}", info.meeting_url));
        }
        self.notify_user(created.patient_id, "Follow-up appointment scheduled", &body, auth_token)
            .await;

        Ok(created)
    }

    async fn link_follow_up(&self, mut original: Appointment, follow_up_id: Uuid, auth_token: &str) {
        for attempt in 1..=MAX_LINK_ATTEMPTS {
            let mut next = original.clone();
            if !next.follow_up_appointment_ids.contains(&follow_up_id) {
                next.follow_up_appointment_ids.push(follow_up_id);
            }

            match self.persist(&original, next, auth_token).await {
                Ok(_) => return,
                Err(AppointmentError::ConcurrentModification) => {
                    debug!("Original {} changed on link attempt {}, re-reading", original.id, attempt);
                    match self.fetch(original.id, auth_token).await {
                        Ok(fresh) => original = fresh,
                        Err(e) => {
                            error!("Could not re-read appointment {}: {}", original.id, e);
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to link follow-up {} to {}: {}", follow_up_id, original.id, e);
                    return;
                }
            }
        }

        error!(
            "Gave up linking follow-up {} to {} after {} attempts",
            follow_up_id, original.id, MAX_LINK_ATTEMPTS
        );
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get(
        &self,
        actor: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id, auth_token).await?;
        authorize_view(&appointment, actor)?;
        Ok(appointment)
    }

    pub async fn list(
        &self,
        actor: &User,
        query: AppointmentListQuery,
        auth_token: &str,
    ) -> Result<AppointmentPage, AppointmentError> {
        let plan = query::list_plan(actor, &query)?;
        let mut rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &plan.path, Some(auth_token), None)
            .await?;

        let has_more = rows.len() > plan.limit as usize;
        rows.truncate(plan.limit as usize);

        Ok(AppointmentPage {
            appointments: rows,
            page: plan.page,
            limit: plan.limit,
            has_more,
        })
    }

    // ==============================================================================
    // STORAGE
    // ==============================================================================

    async fn fetch(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn insert(&self, appointment: &Appointment, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(appointment)?;

        match self
            .supabase
            .insert_returning::<Appointment>("appointments", Some(auth_token), body)
            .await
        {
            Ok(rows) => Ok(rows.into_iter().next().unwrap_or_else(|| appointment.clone())),
            // Overlap exclusion constraint: a concurrent booking took the slot.
            Err(SupabaseError::Conflict(detail)) => {
                warn!("Storage rejected overlapping booking: {}", detail);
                Err(AppointmentError::SlotConflict {
                    start: appointment.start_time.clone(),
                    end: appointment.end_time.clone(),
                    state: SlotState::Booked,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `next` only if the stored row still carries `current.version`.
    async fn persist(
        &self,
        current: &Appointment,
        mut next: Appointment,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        next.version = current.version + 1;
        next.updated_at = Utc::now();

        let mut body = serde_json::to_value(&next)?;
        if let Value::Object(fields) = &mut body {
            fields.remove("id");
            fields.remove("created_at");
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&version=eq.{}",
            current.id, current.version
        );
        let rows: Vec<Appointment> = match self.supabase.update_returning(&path, Some(auth_token), body).await {
            Ok(rows) => rows,
            Err(SupabaseError::Conflict(detail)) => {
                warn!("Storage rejected update of {}: {}", current.id, detail);
                return Err(AppointmentError::SlotConflict {
                    start: next.start_time,
                    end: next.end_time,
                    state: SlotState::Booked,
                });
            }
            Err(e) => return Err(e.into()),
        };

        rows.into_iter().next().ok_or_else(|| {
            debug!("Appointment {} moved past version {}", current.id, current.version);
            AppointmentError::ConcurrentModification
        })
    }

    async fn notify_user(&self, user_id: Uuid, subject: &str, body: &str, auth_token: &str) {
        match self.directory.find_user(user_id, Some(auth_token)).await {
            Ok(Some(user)) => match user.email.as_deref() {
                Some(email) => self.notifications.notify(email, subject, body),
                None => debug!("No email on file for user {}, skipping '{}'", user_id, subject),
            },
            Ok(None) => debug!("User {} not found, skipping '{}'", user_id, subject),
            Err(e) => warn!("Could not look up user {} for notification: {}", user_id, e),
        }
    }
}

// ==============================================================================
// PURE TRANSITIONS
// ==============================================================================

/// Accepts `YYYY-MM-DD` or RFC 3339; dates before `today` are rejected.
pub fn parse_appointment_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, AppointmentError> {
    let date = parse_date_value(raw).ok_or(AppointmentError::InvalidDate)?;

    if date < today {
        return Err(AppointmentError::InvalidDate);
    }
    Ok(date)
}

pub fn check_window(start: &str, end: &str) -> Result<(), AppointmentError> {
    if !is_valid_clock(start) || !is_valid_clock(end) {
        return Err(AppointmentError::InvalidTimeFormat);
    }
    if !is_ordered_window(start, end) {
        return Err(AppointmentError::InvalidTimeOrder);
    }
    Ok(())
}

fn slot_instants(
    date: NaiveDate,
    start: &str,
    end: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppointmentError> {
    let instant = |value: &str| {
        NaiveTime::parse_from_str(value, "%H:%M")
            .map(|time| Utc.from_utc_datetime(&date.and_time(time)))
            .map_err(|_| AppointmentError::InvalidTimeFormat)
    };
    Ok((instant(start)?, instant(end)?))
}

pub fn confirm(current: &Appointment, approver: Uuid, client_url: &str, now: DateTime<Utc>) -> Appointment {
    let mut next = current.clone();
    next.status = AppointmentStatus::Confirmed;
    next.approved_by = Some(approver);
    next.approved_at = Some(now);
    next.updated_by = Some(approver);
    if next.is_video() && next.video_call_info.is_none() {
        next.video_call_info = Some(video::provision_room(client_url));
    }
    next
}

pub fn mark_cancelled(
    current: &Appointment,
    actor_id: Uuid,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Appointment {
    let mut next = current.clone();
    next.status = AppointmentStatus::Cancelled;
    next.cancelled_by = Some(actor_id);
    next.cancelled_at = Some(now);
    next.cancel_reason = reason;
    next.updated_by = Some(actor_id);
    next
}

/// New entity with the patch applied. Authorization and transition checks happen before this.
pub fn apply_patch(
    current: &Appointment,
    patch: &AppointmentPatch,
    reschedule: Option<&Reschedule>,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> Appointment {
    let mut next = current.clone();

    if let Some(status) = patch.status {
        if status == AppointmentStatus::Cancelled && current.status != AppointmentStatus::Cancelled {
            next = mark_cancelled(&next, actor_id, patch.cancel_reason.clone(), now);
        }
        next.status = status;
    }

    if let Some(kind) = patch.appointment_type {
        next.appointment_type = kind;
        if kind == AppointmentType::InPerson && !current.is_video_call_started {
            next.video_call_info = None;
        }
    }

    if let Some(info) = &patch.medical_info {
        next.medical_info = info.clone();
    }

    if let Some(change) = reschedule {
        next.appointment_date = change.slot.date;
        next.start_time = change.slot.start_time.clone();
        next.end_time = change.slot.end_time.clone();
        next.start_date_time = change.slot.start_date_time;
        next.end_date_time = change.slot.end_date_time;
        next.appointment_fee = change.fee;
    }

    next.updated_by = Some(actor_id);
    next
}

/// Confirmed video follow-up carrying the original's fee and medical context.
pub fn build_follow_up(
    original: &Appointment,
    slot: &ValidatedSlot,
    request: &CreateFollowUpRequest,
    actor_id: Uuid,
    client_url: &str,
    now: DateTime<Utc>,
) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        patient_id: original.patient_id,
        doctor_id: original.doctor_id,
        appointment_date: slot.date,
        start_time: slot.start_time.clone(),
        end_time: slot.end_time.clone(),
        start_date_time: slot.start_date_time,
        end_date_time: slot.end_date_time,
        appointment_type: AppointmentType::VideoCall,
        status: AppointmentStatus::Confirmed,
        appointment_fee: original.appointment_fee,
        medical_info: MedicalInfo {
            symptoms: original.medical_info.symptoms.clone(),
            reason: request
                .reason
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| FOLLOW_UP_REASON.to_string()),
            current_medications: original.medical_info.current_medications.clone(),
            notes: request.notes.clone().or_else(|| original.medical_info.notes.clone()),
        },
        video_call_info: Some(video::provision_room(client_url)),
        is_video_call_started: false,
        is_video_call_ended: false,
        is_follow_up: true,
        original_appointment_id: Some(original.id),
        follow_up_appointment_ids: Vec::new(),
        created_by: Some(actor_id),
        approved_by: Some(actor_id),
        approved_at: Some(now),
        cancelled_by: None,
        cancelled_at: None,
        cancel_reason: None,
        updated_by: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn actor_uuid(actor: &User) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(&actor.id).map_err(|_| AppointmentError::InvalidActor)
}

fn authorize_manage(appointment: &Appointment, actor: &User) -> Result<(), AppointmentError> {
    if appointment.can_be_managed_by(actor) {
        Ok(())
    } else {
        Err(AppointmentError::Forbidden(
            "You do not have permission to modify this appointment".to_string(),
        ))
    }
}

fn authorize_view(appointment: &Appointment, actor: &User) -> Result<(), AppointmentError> {
    if actor.is_admin() || appointment.is_participant(actor) {
        Ok(())
    } else {
        Err(AppointmentError::Forbidden(
            "You do not have access to this appointment".to_string(),
        ))
    }
}

fn require_assigned_doctor(appointment: &Appointment, actor: &User) -> Result<(), AppointmentError> {
    if appointment.is_assigned_doctor(actor) {
        Ok(())
    } else {
        Err(AppointmentError::Forbidden(
            "Only the assigned doctor can manage the video call".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn pending_appointment() -> Appointment {
        let date = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();
        let (start, end) = slot_instants(date, "10:00", "10:30").unwrap();
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            appointment_date: date,
            start_time: "10:00".to_string(),
            end_time: "10:30".to_string(),
            start_date_time: start,
            end_date_time: end,
            appointment_type: AppointmentType::VideoCall,
            status: AppointmentStatus::Pending,
            appointment_fee: 200000.0,
            medical_info: MedicalInfo {
                symptoms: "Cough".to_string(),
                reason: "Checkup".to_string(),
                current_medications: vec!["Ibuprofen".to_string()],
                notes: Some("Allergic to penicillin".to_string()),
            },
            video_call_info: None,
            is_video_call_started: false,
            is_video_call_ended: false,
            is_follow_up: false,
            original_appointment_id: None,
            follow_up_appointment_ids: vec![],
            created_by: None,
            approved_by: None,
            approved_at: None,
            cancelled_by: None,
            cancelled_at: None,
            cancel_reason: None,
            updated_by: None,
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn dates_accept_plain_and_rfc3339() {
        let today = NaiveDate::from_ymd_opt(2030, 3, 1).unwrap();
        assert_eq!(
            parse_appointment_date("2030-03-04", today).unwrap(),
            NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
        );
        assert_eq!(
            parse_appointment_date("2030-03-04T23:30:00+00:00", today).unwrap(),
            NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
        );
        assert_eq!(parse_appointment_date("2030-03-01", today).unwrap(), today);
    }

    #[test]
    fn past_or_garbage_dates_are_rejected() {
        let today = NaiveDate::from_ymd_opt(2030, 3, 1).unwrap();
        assert_matches!(parse_appointment_date("2030-02-28", today), Err(AppointmentError::InvalidDate));
        assert_matches!(parse_appointment_date("next tuesday", today), Err(AppointmentError::InvalidDate));
        assert_matches!(parse_appointment_date("2030-02-30", today), Err(AppointmentError::InvalidDate));
    }

    #[test]
    fn window_checks_format_before_order() {
        assert!(check_window("10:00", "10:30").is_ok());
        assert_matches!(check_window("10:00", "25:00"), Err(AppointmentError::InvalidTimeFormat));
        assert_matches!(check_window("9:00", "10:00"), Err(AppointmentError::InvalidTimeFormat));
        assert_matches!(check_window("10:30", "10:00"), Err(AppointmentError::InvalidTimeOrder));
        assert_matches!(check_window("10:00", "10:00"), Err(AppointmentError::InvalidTimeOrder));
    }

    #[test]
    fn slot_instants_are_utc_wall_clock() {
        let date = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();
        let (start, end) = slot_instants(date, "09:15", "10:00").unwrap();
        assert_eq!(start.to_rfc3339(), "2030-03-04T09:15:00+00:00");
        assert_eq!(end - start, Duration::minutes(45));
    }

    #[test]
    fn confirm_provisions_room_for_video_only() {
        let approver = Uuid::new_v4();
        let video = confirm(&pending_appointment(), approver, "https://clinic.test", Utc::now());
        assert_eq!(video.status, AppointmentStatus::Confirmed);
        assert_eq!(video.approved_by, Some(approver));
        assert!(video.video_call_info.is_some());

        let mut visit = pending_appointment();
        visit.appointment_type = AppointmentType::InPerson;
        assert!(confirm(&visit, approver, "https://clinic.test", Utc::now()).video_call_info.is_none());
    }

    #[test]
    fn patch_leaves_unmentioned_fields_alone() {
        let current = pending_appointment();
        let actor = Uuid::new_v4();
        let patch = AppointmentPatch {
            medical_info: Some(MedicalInfo {
                reason: "Rash".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let next = apply_patch(&current, &patch, None, actor, Utc::now());

        assert_eq!(next.medical_info.reason, "Rash");
        assert_eq!(next.status, current.status);
        assert_eq!(next.start_time, current.start_time);
        assert_eq!(next.appointment_fee, current.appointment_fee);
        assert_eq!(next.updated_by, Some(actor));
        assert_eq!(next.version, current.version);
    }

    #[test]
    fn patch_cancellation_records_audit_fields() {
        let current = pending_appointment();
        let actor = Uuid::new_v4();
        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Cancelled),
            cancel_reason: Some("Travelling".to_string()),
            ..Default::default()
        };

        let next = apply_patch(&current, &patch, None, actor, Utc::now());

        assert_eq!(next.status, AppointmentStatus::Cancelled);
        assert_eq!(next.cancelled_by, Some(actor));
        assert_eq!(next.cancel_reason.as_deref(), Some("Travelling"));
        assert!(next.cancelled_at.is_some());
    }

    #[test]
    fn patch_reschedule_moves_window_and_fee() {
        let current = pending_appointment();
        let date = NaiveDate::from_ymd_opt(2030, 3, 5).unwrap();
        let (start, end) = slot_instants(date, "14:00", "15:00").unwrap();
        let change = Reschedule {
            slot: ValidatedSlot {
                date,
                start_time: "14:00".to_string(),
                end_time: "15:00".to_string(),
                start_date_time: start,
                end_date_time: end,
                consultation_duration: 30,
            },
            fee: 400000.0,
        };

        let next = apply_patch(&current, &AppointmentPatch::default(), Some(&change), Uuid::new_v4(), Utc::now());

        assert_eq!(next.appointment_date, date);
        assert_eq!(next.start_time, "14:00");
        assert_eq!(next.end_date_time, end);
        assert_eq!(next.appointment_fee, 400000.0);
    }

    #[test]
    fn follow_up_copies_context_and_links_back() {
        let mut original = pending_appointment();
        original.status = AppointmentStatus::Completed;
        original.appointment_type = AppointmentType::InPerson;
        let date = NaiveDate::from_ymd_opt(2030, 3, 11).unwrap();
        let (start, end) = slot_instants(date, "09:00", "09:30").unwrap();
        let slot = ValidatedSlot {
            date,
            start_time: "09:00".to_string(),
            end_time: "09:30".to_string(),
            start_date_time: start,
            end_date_time: end,
            consultation_duration: 30,
        };
        let request = CreateFollowUpRequest {
            appointment_date: "2030-03-11".to_string(),
            start_time: "09:00".to_string(),
            end_time: "09:30".to_string(),
            reason: None,
            notes: None,
        };

        let follow_up = build_follow_up(&original, &slot, &request, original.doctor_id, "https://clinic.test", Utc::now());

        assert_eq!(follow_up.status, AppointmentStatus::Confirmed);
        assert_eq!(follow_up.appointment_type, AppointmentType::VideoCall);
        assert!(follow_up.is_follow_up);
        assert_eq!(follow_up.original_appointment_id, Some(original.id));
        assert_eq!(follow_up.appointment_fee, original.appointment_fee);
        assert_eq!(follow_up.medical_info.reason, FOLLOW_UP_REASON);
        assert_eq!(follow_up.medical_info.symptoms, "Cough");
        assert_eq!(follow_up.medical_info.notes.as_deref(), Some("Allergic to penicillin"));
        assert!(follow_up.video_call_info.is_some());
    }
}
