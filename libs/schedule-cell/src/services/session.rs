// libs/schedule-cell/src/services/session.rs
//
// Per-session approval state machine. Every function here is pure: it takes the
// current `DailySchedule` and returns the next one, leaving persistence to the caller.
use tracing::debug;

use crate::clock::is_ordered_window;
use crate::models::{
    ApprovalStatus, DailySchedule, DailyScheduleSubmission, ScheduleError, Session,
    SessionSlot, SessionSubmission,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSubmission {
    pub schedules: DailySchedule,
    pub applied: Vec<Session>,
    pub skipped: Vec<Session>,
}

/// A doctor may only reconfigure a session that is disabled or was rejected.
pub fn doctor_can_edit(slot: &SessionSlot) -> bool {
    !slot.enabled || slot.approval_status == ApprovalStatus::Rejected
}

/// Shape checks that do not depend on stored state.
pub fn validate_submission(submission: &DailyScheduleSubmission) -> Result<(), ScheduleError> {
    if submission.is_empty() {
        return Err(ScheduleError::EmptySubmission);
    }

    for session in Session::ALL {
        let Some(block) = submission.get(session) else {
            continue;
        };
        if !block.enabled {
            continue;
        }

        let start = block.start.as_deref().unwrap_or_default();
        let end = block.end.as_deref().unwrap_or_default();
        if !is_ordered_window(start, end) {
            return Err(ScheduleError::InvalidSessionHours {
                session,
                reason: format!("expected HH:MM start before end, got '{}'-'{}'", start, end),
            });
        }
    }

    Ok(())
}

/// First submission for a day: every provided session starts out pending.
pub fn initial_schedule(submission: &DailyScheduleSubmission) -> DailySchedule {
    let mut schedules = DailySchedule::default();
    for session in Session::ALL {
        if let Some(block) = submission.get(session) {
            configure(schedules.slot_mut(session), block);
        }
    }
    schedules
}

/// Applies a doctor resubmission. Locked sessions are reported in `skipped` and left
/// untouched; if nothing could be applied the whole submission is refused.
pub fn apply_submission(
    current: &DailySchedule,
    submission: &DailyScheduleSubmission,
) -> Result<AppliedSubmission, ScheduleError> {
    let mut schedules = current.clone();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for session in Session::ALL {
        let Some(block) = submission.get(session) else {
            continue;
        };

        if doctor_can_edit(current.slot(session)) {
            configure(schedules.slot_mut(session), block);
            applied.push(session);
        } else {
            debug!(
                "Skipping {} session in status {}",
                session,
                current.slot(session).approval_status
            );
            skipped.push(session);
        }
    }

    if applied.is_empty() {
        return Err(ScheduleError::Locked);
    }

    Ok(AppliedSubmission { schedules, applied, skipped })
}

pub fn approve_session(current: &DailySchedule, session: Session) -> Result<DailySchedule, ScheduleError> {
    let slot = current.slot(session);
    if slot.approval_status != ApprovalStatus::Pending {
        return Err(ScheduleError::InvalidTransition {
            session,
            status: slot.approval_status,
            action: "approve",
        });
    }
    if !slot.enabled {
        return Err(ScheduleError::SessionDisabled(session));
    }

    let mut next = current.clone();
    let target = next.slot_mut(session);
    target.approval_status = ApprovalStatus::Approved;
    target.rejection_reason.clear();
    Ok(next)
}

pub fn reject_session(
    current: &DailySchedule,
    session: Session,
    reason: &str,
) -> Result<DailySchedule, ScheduleError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ScheduleError::Validation("Rejection reason is required".to_string()));
    }

    let slot = current.slot(session);
    if slot.approval_status != ApprovalStatus::Pending {
        return Err(ScheduleError::InvalidTransition {
            session,
            status: slot.approval_status,
            action: "reject",
        });
    }

    let mut next = current.clone();
    let target = next.slot_mut(session);
    target.approval_status = ApprovalStatus::Rejected;
    target.rejection_reason = reason.to_string();
    Ok(next)
}

fn configure(slot: &mut SessionSlot, block: &SessionSubmission) {
    slot.enabled = block.enabled;
    slot.start = block.start.clone().unwrap_or_default();
    slot.end = block.end.clone().unwrap_or_default();
    slot.approval_status = ApprovalStatus::Pending;
    slot.rejection_reason.clear();
}
