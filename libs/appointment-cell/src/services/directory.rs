// libs/appointment-cell/src/services/directory.rs
use std::sync::Arc;

use reqwest::Method;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{AppointmentError, DoctorProfile, ParticipantRecord};

/// Read-only lookups of users and doctor profiles owned by the identity service.
pub struct ParticipantDirectory {
    supabase: Arc<SupabaseClient>,
}

impl ParticipantDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn find_user(
        &self,
        user_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<ParticipantRecord>, AppointmentError> {
        let path = format!("/rest/v1/users?id=eq.{}&select=id,email,role", user_id);
        let rows: Vec<ParticipantRecord> = self.supabase.request(Method::GET, &path, auth_token, None).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_doctor_profile(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<DoctorProfile>, AppointmentError> {
        let path = format!("/rest/v1/doctor_profiles?doctor_id=eq.{}", doctor_id);
        let rows: Vec<DoctorProfile> = self.supabase.request(Method::GET, &path, auth_token, None).await?;
        Ok(rows.into_iter().next())
    }

    /// Patient must exist; doctor must exist, hold the doctor role and be accepting bookings.
    pub async fn require_bookable_pair(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<(ParticipantRecord, DoctorProfile), AppointmentError> {
        let patient = self
            .find_user(patient_id, auth_token)
            .await?
            .ok_or(AppointmentError::PatientNotFound)?;

        let doctor = self
            .find_user(doctor_id, auth_token)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)?;
        if !doctor.is_doctor() {
            return Err(AppointmentError::DoctorNotFound);
        }

        let profile = self
            .find_doctor_profile(doctor_id, auth_token)
            .await?
            .filter(|p| p.is_available)
            .ok_or(AppointmentError::DoctorUnavailable)?;

        Ok((patient, profile))
    }
}
