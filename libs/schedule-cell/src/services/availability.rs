use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::clock::minute_of_day;
use crate::models::{
    ApprovedWindow, BookedSlot, DailySchedule, DayAvailability, ScheduleError, Session,
    WorkSchedule,
};

const MAX_AVAILABILITY_RANGE_DAYS: i64 = 92;

/// Answers "when may this doctor be booked" from approved work schedules.
pub struct AvailabilityResolver {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// The doctor's schedule for `date` if at least one of its sessions is approved.
    #[instrument(skip(self, auth_token))]
    pub async fn resolve_approved_schedule(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Option<WorkSchedule>, ScheduleError> {
        let path = format!(
            "/rest/v1/work_schedules?doctor_id=eq.{}&date=eq.{}",
            doctor_id, date
        );
        let rows: Vec<WorkSchedule> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        let schedule = rows.into_iter().find(|s| s.schedules.has_approved_session());
        debug!("Approved schedule for doctor {} on {}: {}", doctor_id, date, schedule.is_some());
        Ok(schedule)
    }

    /// Approved sessions merged with booked slots for each day in `[start, end]`.
    pub async fn availability_with_bookings(
        &self,
        doctor_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<DayAvailability>, ScheduleError> {
        if end < start || (end - start).num_days() > MAX_AVAILABILITY_RANGE_DAYS {
            return Err(ScheduleError::Validation(format!(
                "Availability range must be ordered and at most {} days",
                MAX_AVAILABILITY_RANGE_DAYS
            )));
        }

        let schedule_path = format!(
            "/rest/v1/work_schedules?doctor_id=eq.{}&date=gte.{}&date=lte.{}&order=date.asc",
            doctor_id, start, end
        );
        let schedules: Vec<WorkSchedule> = self
            .supabase
            .request(Method::GET, &schedule_path, auth_token, None)
            .await?;

        let booking_path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=gte.{}&appointment_date=lte.{}\
             &status=not.in.(cancelled,completed)&select=id,appointment_date,start_time,end_time,status\
             &order=start_time.asc",
            doctor_id, start, end
        );
        let booked: Vec<BookedSlot> = self
            .supabase
            .request(Method::GET, &booking_path, auth_token, None)
            .await?;

        let mut booked_by_day: BTreeMap<NaiveDate, Vec<BookedSlot>> = BTreeMap::new();
        for slot in booked {
            booked_by_day.entry(slot.appointment_date).or_default().push(slot);
        }

        Ok(schedules
            .into_iter()
            .filter_map(|schedule| {
                let available_sessions: Vec<ApprovedWindow> = schedule
                    .schedules
                    .bookable_sessions()
                    .map(|(session, slot)| ApprovedWindow {
                        session,
                        start: slot.start.clone(),
                        end: slot.end.clone(),
                    })
                    .collect();

                if available_sessions.is_empty() {
                    return None;
                }

                Some(DayAvailability {
                    date: schedule.date,
                    schedule_id: schedule.id,
                    booked_slots: booked_by_day.remove(&schedule.date).unwrap_or_default(),
                    default_consultation_duration: schedule.consultation_duration(),
                    available_sessions,
                })
            })
            .collect())
    }
}

/// First approved session (morning, afternoon, evening) that fully contains the window.
pub fn find_containing_session(schedules: &DailySchedule, start: &str, end: &str) -> Option<Session> {
    let (start, end) = (minute_of_day(start)?, minute_of_day(end)?);
    if start >= end {
        return None;
    }

    schedules.bookable_sessions().find_map(|(session, slot)| {
        let open = minute_of_day(&slot.start)?;
        let close = minute_of_day(&slot.end)?;
        (open <= start && end <= close).then_some(session)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalStatus, SessionSlot};

    fn slot(start: &str, end: &str, status: ApprovalStatus) -> SessionSlot {
        SessionSlot {
            enabled: true,
            start: start.to_string(),
            end: end.to_string(),
            approval_status: status,
            rejection_reason: String::new(),
        }
    }

    fn morning_only() -> DailySchedule {
        DailySchedule {
            morning: slot("09:00", "12:00", ApprovalStatus::Approved),
            afternoon: slot("13:00", "17:00", ApprovalStatus::Pending),
            evening: SessionSlot::default(),
        }
    }

    #[test]
    fn window_inside_approved_session() {
        assert_eq!(find_containing_session(&morning_only(), "10:00", "10:30"), Some(Session::Morning));
        assert_eq!(find_containing_session(&morning_only(), "09:00", "12:00"), Some(Session::Morning));
    }

    #[test]
    fn window_crossing_session_end_is_rejected() {
        assert_eq!(find_containing_session(&morning_only(), "11:30", "12:30"), None);
    }

    #[test]
    fn pending_session_is_not_bookable() {
        assert_eq!(find_containing_session(&morning_only(), "14:00", "14:30"), None);
    }

    #[test]
    fn straddling_two_approved_sessions_is_rejected() {
        let day = DailySchedule {
            morning: slot("09:00", "12:00", ApprovalStatus::Approved),
            afternoon: slot("12:00", "17:00", ApprovalStatus::Approved),
            evening: SessionSlot::default(),
        };
        assert_eq!(find_containing_session(&day, "11:30", "12:30"), None);
        assert_eq!(find_containing_session(&day, "12:00", "12:30"), Some(Session::Afternoon));
    }

    #[test]
    fn disabled_approved_session_is_skipped() {
        let mut day = morning_only();
        day.morning.enabled = false;
        assert_eq!(find_containing_session(&day, "10:00", "10:30"), None);
    }
}
