use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Which side of an appointment the caller is on, decided by matching ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Patient,
    Doctor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentAction {
    Confirm,
    Cancel,
    Delete,
}

impl AppointmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentAction::Confirm => "confirm",
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::Delete => "delete",
        }
    }
}

/// What a permitted action does to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Compare-and-set the status.
    Update { from: AppointmentStatus, to: AppointmentStatus },
    /// Remove the row (only ever from `cancelled`).
    Remove,
    /// Already in the target state; nothing is written.
    Unchanged,
}

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// The caller must be the appointment's patient or its doctor. If one
    /// account id is both, it acts as the doctor.
    pub fn authorize(
        &self,
        caller_id: i64,
        appointment: &Appointment,
        action: AppointmentAction,
    ) -> Result<Party, AppointmentError> {
        let party = if caller_id == appointment.doctor_id {
            Party::Doctor
        } else if caller_id == appointment.user_id {
            Party::Patient
        } else {
            warn!(
                "Caller {} attempted to {} appointment {} they are not part of",
                caller_id,
                action.as_str(),
                appointment.id
            );
            return Err(AppointmentError::Unauthorized(format!(
                "You are not allowed to {} this appointment",
                action.as_str()
            )));
        };

        if action == AppointmentAction::Confirm && party != Party::Doctor {
            warn!("Patient {} attempted to confirm appointment {}", caller_id, appointment.id);
            return Err(AppointmentError::Unauthorized(
                "Only the doctor can confirm this appointment".to_string(),
            ));
        }

        Ok(party)
    }

    /// Validate an action against the current status.
    pub fn plan(
        &self,
        action: AppointmentAction,
        current: AppointmentStatus,
    ) -> Result<Transition, AppointmentError> {
        debug!("Planning {} from {}", action.as_str(), current);

        use AppointmentStatus::*;
        let transition = match (action, current) {
            (AppointmentAction::Confirm, Pending) => Transition::Update { from: Pending, to: Confirmed },
            (AppointmentAction::Confirm, Confirmed) => Transition::Unchanged,
            (AppointmentAction::Confirm, Cancelled) => {
                return Err(AppointmentError::invalid_transition("Cannot confirm a cancelled appointment", current));
            }
            (AppointmentAction::Confirm, Completed) => {
                return Err(AppointmentError::invalid_transition("Cannot confirm a completed appointment", current));
            }

            (AppointmentAction::Cancel, Pending | Confirmed) => Transition::Update { from: current, to: Cancelled },
            (AppointmentAction::Cancel, Cancelled) => {
                return Err(AppointmentError::invalid_transition("Appointment is already cancelled", current));
            }
            (AppointmentAction::Cancel, Completed) => {
                return Err(AppointmentError::invalid_transition("Cannot cancel a completed appointment", current));
            }

            (AppointmentAction::Delete, Cancelled) => Transition::Remove,
            (AppointmentAction::Delete, _) => {
                return Err(AppointmentError::invalid_transition(
                    "Only cancelled appointments can be deleted",
                    current,
                ));
            }
        };

        Ok(transition)
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
