// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::{Appointment, AppointmentError, AppointmentPatch, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition { from: current_status, to: new_status });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => vec![],
        }
    }

    /// Whether the appointment's date, time or service may still change.
    pub fn ensure_reschedulable(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        match appointment.status {
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed => Ok(()),
            status => Err(AppointmentError::AppointmentClosed { status }),
        }
    }

    /// Builds the write for a validated transition.
    ///
    /// Completing an appointment with no recorded value charges the service's
    /// current price.
    pub fn apply_status_change(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        service_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<AppointmentPatch, AppointmentError> {
        self.validate_status_transition(appointment.status, new_status)?;

        let mut patch = AppointmentPatch {
            status: Some(new_status),
            updated_at: Some(now),
            ..AppointmentPatch::default()
        };

        if new_status == AppointmentStatus::Completed && appointment.total_value.is_none() {
            if let Some(price) = service_price {
                debug!("Charging service price {:.2} on completion of {}", price, appointment.id);
                patch.total_value = Some(Some(price));
            }
        }

        info!("Appointment {} status: {} -> {}", appointment.id, appointment.status, new_status);
        Ok(patch)
    }
}
