// libs/appointment-cell/src/services/video.rs
//! Video room bookkeeping. Media transport lives with the provider; only room identity and
//! call timestamps are tracked here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, VideoCallInfo, VideoProvider};

pub fn provision_room(client_url: &str) -> VideoCallInfo {
    let meeting_id = Uuid::new_v4().simple().to_string();
    VideoCallInfo {
        provider: VideoProvider::Zegocloud,
        meeting_url: format!(
            "{}/room/{}",
            client_url.trim_end_matches('/'),
            urlencoding::encode(&meeting_id)
        ),
        meeting_id,
        meeting_password: None,
        joined_at: None,
        ended_at: None,
        duration_minutes: None,
    }
}

/// Marks the call started. Only the first join stamps `joined_at`.
pub fn start_call(
    appointment: &Appointment,
    client_url: &str,
    now: DateTime<Utc>,
) -> Result<Appointment, AppointmentError> {
    if !appointment.is_video() {
        return Err(AppointmentError::InvalidState(
            "Video calls are only available for video appointments".to_string(),
        ));
    }
    if appointment.status != AppointmentStatus::Confirmed || appointment.is_video_call_ended {
        return Err(AppointmentError::InvalidState(
            "Cannot join: appointment not confirmed".to_string(),
        ));
    }

    let mut next = appointment.clone();
    let info = next.video_call_info.get_or_insert_with(|| provision_room(client_url));
    if info.joined_at.is_none() {
        info.joined_at = Some(now);
    }
    next.is_video_call_started = true;
    Ok(next)
}

pub fn end_call(appointment: &Appointment, now: DateTime<Utc>) -> Result<Appointment, AppointmentError> {
    if !appointment.is_video_call_started || appointment.is_video_call_ended {
        return Err(AppointmentError::InvalidState("Cannot end: call not started".to_string()));
    }

    let mut next = appointment.clone();
    if let Some(info) = next.video_call_info.as_mut() {
        info.ended_at = Some(now);
        info.duration_minutes = info
            .joined_at
            .map(|joined| ((now - joined).num_milliseconds() as f64 / 60_000.0).round() as i64);
    }
    next.is_video_call_ended = true;
    Ok(next)
}
