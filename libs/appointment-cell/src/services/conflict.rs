// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, SlotState};

/// Rejects a requested window that overlaps a doctor's live bookings on the same day.
pub struct ConflictDetector {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetector {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn ensure_slot_free(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: &str,
        end: &str,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let existing = self
            .live_appointments(doctor_id, date, exclude_appointment_id, auth_token)
            .await?;

        match find_conflict(&existing, start, end, exclude_appointment_id) {
            Some(conflict) => {
                warn!(
                    "Slot {}-{} on {} for doctor {} collides with appointment {}",
                    start, end, date, doctor_id, conflict.id
                );
                Err(AppointmentError::SlotConflict {
                    start: start.to_string(),
                    end: end.to_string(),
                    state: if conflict.status == AppointmentStatus::Pending {
                        SlotState::PendingApproval
                    } else {
                        SlotState::Booked
                    },
                })
            }
            None => Ok(()),
        }
    }

    async fn live_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=not.in.(cancelled,completed)",
            doctor_id, date
        );
        if let Some(excluded) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", excluded));
        }

        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, auth_token, None).await?;
        debug!("{} live appointments for doctor {} on {}", rows.len(), doctor_id, date);
        Ok(rows)
    }
}

/// Four-case overlap on zero-padded `HH:MM` strings, which order lexicographically.
pub fn windows_overlap(new_start: &str, new_end: &str, existing_start: &str, existing_end: &str) -> bool {
    // new starts inside existing
    (new_start >= existing_start && new_start < existing_end)
        // new ends inside existing
        || (new_end > existing_start && new_end <= existing_end)
        // new contains existing
        || (new_start <= existing_start && new_end >= existing_end)
        // existing contains new
        || (existing_start <= new_start && existing_end >= new_end)
}

pub fn find_conflict<'a>(
    existing: &'a [Appointment],
    start: &str,
    end: &str,
    exclude_appointment_id: Option<Uuid>,
) -> Option<&'a Appointment> {
    existing
        .iter()
        .filter(|a| a.blocks_calendar())
        .filter(|a| Some(a.id) != exclude_appointment_id)
        .find(|a| windows_overlap(start, end, &a.start_time, &a.end_time))
}
