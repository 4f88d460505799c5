// libs/appointment-cell/src/services/lifecycle.rs
use tracing::warn;

use crate::models::{AppointmentError, AppointmentStatus};

/// Statuses reachable in one step from `current`.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Pending => &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
        AppointmentStatus::Confirmed => &[
            AppointmentStatus::Cancelled,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
        ],
        // Terminal states
        AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => &[],
    }
}

pub fn is_terminal(status: AppointmentStatus) -> bool {
    valid_transitions(status).is_empty()
}

pub fn validate_transition(current: AppointmentStatus, next: AppointmentStatus) -> Result<(), AppointmentError> {
    if current == next || valid_transitions(current).contains(&next) {
        return Ok(());
    }

    warn!("Invalid status transition attempted: {} -> {}", current, next);
    Err(AppointmentError::InvalidState(format!(
        "Cannot change appointment status from {} to {}",
        current, next
    )))
}

/// Guards the cancel operation; the messages differ per blocking state.
pub fn ensure_cancellable(current: AppointmentStatus) -> Result<(), AppointmentError> {
    match current {
        AppointmentStatus::Pending | AppointmentStatus::Confirmed => Ok(()),
        AppointmentStatus::Completed => Err(AppointmentError::InvalidState(
            "Cannot cancel a completed appointment".to_string(),
        )),
        AppointmentStatus::Cancelled => Err(AppointmentError::InvalidState(
            "Appointment is already cancelled".to_string(),
        )),
        other => Err(AppointmentError::InvalidState(format!(
            "Cannot cancel an appointment with status {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pending_moves_to_confirmed_or_cancelled_only() {
        assert!(validate_transition(AppointmentStatus::Pending, AppointmentStatus::Confirmed).is_ok());
        assert!(validate_transition(AppointmentStatus::Pending, AppointmentStatus::Cancelled).is_ok());
        assert!(validate_transition(AppointmentStatus::Pending, AppointmentStatus::Completed).is_err());
        assert!(validate_transition(AppointmentStatus::Pending, AppointmentStatus::NoShow).is_err());
    }

    #[test]
    fn confirmed_can_finish_or_be_missed() {
        for next in [AppointmentStatus::Completed, AppointmentStatus::NoShow, AppointmentStatus::Cancelled] {
            assert!(validate_transition(AppointmentStatus::Confirmed, next).is_ok());
        }
        assert!(validate_transition(AppointmentStatus::Confirmed, AppointmentStatus::Pending).is_err());
    }

    #[test]
    fn terminal_states_stay_put() {
        for status in [AppointmentStatus::Completed, AppointmentStatus::Cancelled, AppointmentStatus::NoShow] {
            assert!(is_terminal(status));
            assert!(validate_transition(status, AppointmentStatus::Confirmed).is_err());
        }
    }

    #[test]
    fn cancel_guard_messages() {
        assert!(ensure_cancellable(AppointmentStatus::Confirmed).is_ok());
        assert_matches!(
            ensure_cancellable(AppointmentStatus::Completed),
            Err(AppointmentError::InvalidState(msg)) if msg == "Cannot cancel a completed appointment"
        );
        assert_matches!(
            ensure_cancellable(AppointmentStatus::Cancelled),
            Err(AppointmentError::InvalidState(msg)) if msg == "Appointment is already cancelled"
        );
        assert_matches!(
            ensure_cancellable(AppointmentStatus::NoShow),
            Err(AppointmentError::InvalidState(msg)) if msg.contains("no_show")
        );
    }
}
