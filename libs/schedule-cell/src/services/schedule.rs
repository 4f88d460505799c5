// libs/schedule-cell/src/services/schedule.rs
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::User;

use crate::models::{
    BatchSubmissionResult, DailyScheduleSubmission, FailedDay, MultiDayScheduleRequest,
    RecurringScheduleRequest, ScheduleError, ScheduleListQuery, Session, SubmissionOutcome,
    SubmitScheduleRequest, UpdateScheduleRequest, WorkSchedule, DEFAULT_CONSULTATION_DURATION,
};
use crate::services::session;

/// Admin approve/reject re-read and re-apply this many times on a lost version race.
const MAX_WRITE_ATTEMPTS: usize = 3;
const MAX_RECURRENCE_DAYS: i64 = 366;
const MAX_CONSULTATION_DURATION: i32 = 240;

pub struct WorkScheduleService {
    supabase: Arc<SupabaseClient>,
}

impl WorkScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    // ==============================================================================
    // DOCTOR SUBMISSIONS
    // ==============================================================================

    #[instrument(skip(self, actor, request, auth_token), fields(doctor_id = %request.doctor_id, date = %request.date))]
    pub async fn submit(
        &self,
        actor: &User,
        request: SubmitScheduleRequest,
        auth_token: &str,
    ) -> Result<SubmissionOutcome, ScheduleError> {
        authorize_doctor(actor, request.doctor_id)?;

        self.submit_day(
            request.doctor_id,
            request.date,
            &request.schedules,
            request.default_consultation_duration,
            auth_token,
        )
        .await
    }

    /// Each day is submitted on its own; failures are collected, successes are kept.
    pub async fn submit_multi_day(
        &self,
        actor: &User,
        request: MultiDayScheduleRequest,
        auth_token: &str,
    ) -> Result<BatchSubmissionResult, ScheduleError> {
        authorize_doctor(actor, request.doctor_id)?;
        info!("Multi-day submission of {} days for doctor {}", request.days.len(), request.doctor_id);

        let mut result = BatchSubmissionResult::default();
        for day in request.days {
            let outcome = self
                .submit_day(
                    request.doctor_id,
                    day.date,
                    &day.schedules,
                    day.default_consultation_duration,
                    auth_token,
                )
                .await;
            record_day(&mut result, day.date, outcome);
        }

        Ok(result)
    }

    pub async fn submit_recurring(
        &self,
        actor: &User,
        request: RecurringScheduleRequest,
        auth_token: &str,
    ) -> Result<BatchSubmissionResult, ScheduleError> {
        authorize_doctor(actor, request.doctor_id)?;

        let dates = expand_recurrence(request.start_date, request.end_date, &request.days_of_week)?;
        info!("Recurring submission expands to {} days for doctor {}", dates.len(), request.doctor_id);

        let mut result = BatchSubmissionResult::default();
        for date in dates {
            let outcome = self
                .submit_day(
                    request.doctor_id,
                    date,
                    &request.schedules,
                    request.default_consultation_duration,
                    auth_token,
                )
                .await;
            record_day(&mut result, date, outcome);
        }

        Ok(result)
    }

    async fn submit_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        submission: &DailyScheduleSubmission,
        duration: Option<i32>,
        auth_token: &str,
    ) -> Result<SubmissionOutcome, ScheduleError> {
        session::validate_submission(submission)?;
        let duration = validate_duration(duration)?;

        if let Some(existing) = self.find_for_day(doctor_id, date, auth_token).await? {
            return self.resubmit(existing, submission, duration, auth_token).await;
        }

        let now = Utc::now();
        let schedule = WorkSchedule {
            id: Uuid::new_v4(),
            doctor_id,
            date,
            default_consultation_duration: duration.unwrap_or(DEFAULT_CONSULTATION_DURATION),
            schedules: session::initial_schedule(submission),
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let body = serde_json::to_value(&schedule)
            .map_err(|e| ScheduleError::Validation(e.to_string()))?;

        match self
            .supabase
            .insert_returning::<WorkSchedule>("work_schedules", Some(auth_token), body)
            .await
        {
            Ok(mut rows) if !rows.is_empty() => {
                let created = rows.remove(0);
                info!("Created work schedule {} for doctor {} on {}", created.id, doctor_id, date);
                Ok(SubmissionOutcome {
                    applied_sessions: Session::ALL
                        .into_iter()
                        .filter(|s| submission.get(*s).is_some())
                        .collect(),
                    schedule: created,
                    created: true,
                    skipped_sessions: Vec::new(),
                })
            }
            Ok(_) => Err(ScheduleError::Validation("Schedule insert returned no rows".to_string())),
            Err(SupabaseError::Conflict(_)) => {
                // Another submission created the day first; treat ours as a resubmission.
                warn!("Concurrent first submission for doctor {} on {}", doctor_id, date);
                let existing = self
                    .find_for_day(doctor_id, date, auth_token)
                    .await?
                    .ok_or(ScheduleError::ConcurrentModification)?;
                self.resubmit(existing, submission, duration, auth_token).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resubmit(
        &self,
        existing: WorkSchedule,
        submission: &DailyScheduleSubmission,
        duration: Option<i32>,
        auth_token: &str,
    ) -> Result<SubmissionOutcome, ScheduleError> {
        let applied = session::apply_submission(&existing.schedules, submission)?;

        let mut next = existing.clone();
        next.schedules = applied.schedules;
        if let Some(minutes) = duration {
            next.default_consultation_duration = minutes;
        }

        let saved = self.persist(&next, existing.version, auth_token).await?;
        info!(
            "Resubmitted schedule {} (applied {:?}, skipped {:?})",
            saved.id, applied.applied, applied.skipped
        );

        Ok(SubmissionOutcome {
            schedule: saved,
            created: false,
            applied_sessions: applied.applied,
            skipped_sessions: applied.skipped,
        })
    }

    pub async fn update_schedule(
        &self,
        actor: &User,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<WorkSchedule, ScheduleError> {
        let existing = self.get_schedule(schedule_id, auth_token).await?;
        authorize_doctor(actor, existing.doctor_id)?;

        let duration = validate_duration(request.default_consultation_duration)?;
        let mut next = existing.clone();

        if let Some(submission) = &request.schedules {
            session::validate_submission(submission)?;
            next.schedules = session::apply_submission(&existing.schedules, submission)?.schedules;
        }
        if let Some(minutes) = duration {
            next.default_consultation_duration = minutes;
        }

        self.persist(&next, existing.version, auth_token).await
    }

    // ==============================================================================
    // ADMIN DECISIONS
    // ==============================================================================

    #[instrument(skip(self, actor, auth_token))]
    pub async fn approve_session(
        &self,
        actor: &User,
        schedule_id: Uuid,
        session: Session,
        auth_token: &str,
    ) -> Result<WorkSchedule, ScheduleError> {
        require_admin(actor)?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.get_schedule(schedule_id, auth_token).await?;
            let mut next = current.clone();
            next.schedules = session::approve_session(&current.schedules, session)?;

            match self.persist(&next, current.version, auth_token).await {
                Ok(saved) => {
                    info!("{} session approved successfully on schedule {}", session, schedule_id);
                    return Ok(saved);
                }
                Err(ScheduleError::ConcurrentModification) => {
                    debug!("Approve lost version race on attempt {}", attempt);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ScheduleError::ConcurrentModification)
    }

    #[instrument(skip(self, actor, reason, auth_token))]
    pub async fn reject_session(
        &self,
        actor: &User,
        schedule_id: Uuid,
        session: Session,
        reason: &str,
        auth_token: &str,
    ) -> Result<WorkSchedule, ScheduleError> {
        require_admin(actor)?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.get_schedule(schedule_id, auth_token).await?;
            let mut next = current.clone();
            next.schedules = session::reject_session(&current.schedules, session, reason)?;

            match self.persist(&next, current.version, auth_token).await {
                Ok(saved) => {
                    info!("{} session rejected on schedule {}", session, schedule_id);
                    return Ok(saved);
                }
                Err(ScheduleError::ConcurrentModification) => {
                    debug!("Reject lost version race on attempt {}", attempt);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ScheduleError::ConcurrentModification)
    }

    pub async fn delete_schedule(
        &self,
        actor: &User,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        require_admin(actor)?;

        let path = format!("/rest/v1/work_schedules?id=eq.{}", schedule_id);
        let removed: Vec<WorkSchedule> = self.supabase.delete_returning(&path, Some(auth_token)).await?;
        if removed.is_empty() {
            return Err(ScheduleError::NotFound);
        }

        info!("Removed work schedule {}", schedule_id);
        Ok(())
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_schedule(&self, schedule_id: Uuid, auth_token: &str) -> Result<WorkSchedule, ScheduleError> {
        let path = format!("/rest/v1/work_schedules?id=eq.{}", schedule_id);
        let rows: Vec<WorkSchedule> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        rows.into_iter().next().ok_or(ScheduleError::NotFound)
    }

    pub async fn find_for_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<WorkSchedule>, ScheduleError> {
        let path = format!(
            "/rest/v1/work_schedules?doctor_id=eq.{}&date=eq.{}",
            doctor_id, date
        );
        let rows: Vec<WorkSchedule> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(rows.into_iter().next())
    }

    pub async fn list_schedules(
        &self,
        actor: &User,
        query: ScheduleListQuery,
        auth_token: &str,
    ) -> Result<Vec<WorkSchedule>, ScheduleError> {
        require_admin(actor)?;

        let mut filters = Vec::new();
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(start) = query.start_date {
            filters.push(format!("date=gte.{}", start));
        }
        if let Some(end) = query.end_date {
            filters.push(format!("date=lte.{}", end));
        }
        filters.push("order=date.asc".to_string());

        let path = format!("/rest/v1/work_schedules?{}", filters.join("&"));
        let rows: Vec<WorkSchedule> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(match query.status {
            Some(status) => rows
                .into_iter()
                .filter(|s| s.schedules.has_session_with_status(status))
                .collect(),
            None => rows,
        })
    }

    /// Public view of a doctor's schedules; approved-only unless `include_all`.
    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        include_all: bool,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        auth_token: Option<&str>,
    ) -> Result<Vec<WorkSchedule>, ScheduleError> {
        let mut path = format!("/rest/v1/work_schedules?doctor_id=eq.{}", doctor_id);
        if let Some(start) = start_date {
            path.push_str(&format!("&date=gte.{}", start));
        }
        if let Some(end) = end_date {
            path.push_str(&format!("&date=lte.{}", end));
        }
        path.push_str("&order=date.asc");

        let rows: Vec<WorkSchedule> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        Ok(rows
            .into_iter()
            .filter(|s| include_all || s.schedules.has_approved_session())
            .collect())
    }

    async fn persist(
        &self,
        schedule: &WorkSchedule,
        expected_version: i64,
        auth_token: &str,
    ) -> Result<WorkSchedule, ScheduleError> {
        let path = format!(
            "/rest/v1/work_schedules?id=eq.{}&version=eq.{}",
            schedule.id, expected_version
        );
        let body = json!({
            "schedules": schedule.schedules,
            "default_consultation_duration": schedule.default_consultation_duration,
            "version": expected_version + 1,
            "updated_at": Utc::now(),
        });

        let rows: Vec<WorkSchedule> = self.supabase.update_returning(&path, Some(auth_token), body).await?;
        rows.into_iter().next().ok_or(ScheduleError::ConcurrentModification)
    }
}

fn record_day(result: &mut BatchSubmissionResult, date: NaiveDate, outcome: Result<SubmissionOutcome, ScheduleError>) {
    match outcome {
        Ok(outcome) => result.successful.push(outcome.schedule),
        Err(e) => {
            warn!("Schedule submission for {} failed: {}", date, e);
            result.failed.push(FailedDay { date, reason: e.to_string() });
        }
    }
}

fn validate_duration(duration: Option<i32>) -> Result<Option<i32>, ScheduleError> {
    match duration {
        Some(minutes) if minutes <= 0 || minutes > MAX_CONSULTATION_DURATION => Err(ScheduleError::Validation(
            format!("Consultation duration must be between 1 and {} minutes", MAX_CONSULTATION_DURATION),
        )),
        other => Ok(other),
    }
}

/// Dates between `start` and `end` inclusive whose weekday (0 = Sunday) is listed.
pub fn expand_recurrence(
    start: NaiveDate,
    end: NaiveDate,
    days_of_week: &[u8],
) -> Result<Vec<NaiveDate>, ScheduleError> {
    if end < start {
        return Err(ScheduleError::Validation("End date must not be before start date".to_string()));
    }
    if (end - start).num_days() >= MAX_RECURRENCE_DAYS {
        return Err(ScheduleError::Validation(format!(
            "Recurrence may span at most {} days",
            MAX_RECURRENCE_DAYS
        )));
    }
    if days_of_week.is_empty() || days_of_week.iter().any(|d| *d > 6) {
        return Err(ScheduleError::Validation(
            "days_of_week must list weekdays from 0 (Sunday) to 6 (Saturday)".to_string(),
        ));
    }

    Ok(start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| days_of_week.contains(&(d.weekday().num_days_from_sunday() as u8)))
        .collect())
}

pub(crate) fn require_admin(actor: &User) -> Result<(), ScheduleError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ScheduleError::Forbidden("Only administrators can perform this action".to_string()))
    }
}

fn authorize_doctor(actor: &User, doctor_id: Uuid) -> Result<(), ScheduleError> {
    if actor.is_admin() || (actor.is_doctor() && actor.id == doctor_id.to_string()) {
        Ok(())
    } else {
        Err(ScheduleError::Forbidden(
            "Doctors can only manage their own work schedules".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn recurrence_picks_listed_weekdays() {
        // 2025-06-01 is a Sunday.
        let dates = expand_recurrence(date("2025-06-01"), date("2025-06-14"), &[1, 3]).unwrap();
        let expected: Vec<NaiveDate> = ["2025-06-02", "2025-06-04", "2025-06-09", "2025-06-11"]
            .iter()
            .map(|d| date(d))
            .collect();
        assert_eq!(dates, expected);
    }

    #[test]
    fn recurrence_includes_both_ends() {
        let dates = expand_recurrence(date("2025-06-01"), date("2025-06-08"), &[0]).unwrap();
        assert_eq!(dates, vec![date("2025-06-01"), date("2025-06-08")]);
    }

    #[test]
    fn recurrence_rejects_bad_input() {
        assert_matches!(
            expand_recurrence(date("2025-06-10"), date("2025-06-01"), &[1]),
            Err(ScheduleError::Validation(_))
        );
        assert_matches!(
            expand_recurrence(date("2025-06-01"), date("2025-06-10"), &[7]),
            Err(ScheduleError::Validation(_))
        );
        assert_matches!(
            expand_recurrence(date("2025-01-01"), date("2026-06-01"), &[1]),
            Err(ScheduleError::Validation(_))
        );
    }

    #[test]
    fn duration_bounds() {
        assert_matches!(validate_duration(Some(0)), Err(ScheduleError::Validation(_)));
        assert_matches!(validate_duration(Some(45)), Ok(Some(45)));
        assert_matches!(validate_duration(None), Ok(None));
    }
}
