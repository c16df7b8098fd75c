// libs/appointment-cell/src/services/access.rs
//! Role scopes enforced by the engine and the directory.

use tracing::warn;
use uuid::Uuid;

use shared_models::auth::UserRole;

use crate::models::{ActingUser, Appointment, AppointmentError, AppointmentFilter, AppointmentStatus};

fn denied(message: impl Into<String>) -> AppointmentError {
    let message = message.into();
    warn!("Access denied: {}", message);
    AppointmentError::Unauthorized(message)
}

/// Booking or moving an appointment for `patient_id` onto `professional_id`'s calendar.
pub fn authorize_booking(actor: &ActingUser, patient_id: Uuid, professional_id: Uuid) -> Result<(), AppointmentError> {
    if actor.role == UserRole::Patient && actor.patient_id != Some(patient_id) {
        return Err(denied("patients can only book appointments for themselves"));
    }
    if let Some(locked) = actor.locked_professional_id {
        if locked != professional_id {
            return Err(denied(format!("calendar is locked to professional {}", locked)));
        }
    }
    Ok(())
}

/// Reading or editing an existing appointment.
pub fn authorize_appointment(actor: &ActingUser, appointment: &Appointment) -> Result<(), AppointmentError> {
    authorize_booking(actor, appointment.patient_id, appointment.professional_id)
}

pub fn authorize_status_change(
    actor: &ActingUser,
    appointment: &Appointment,
    new_status: AppointmentStatus,
) -> Result<(), AppointmentError> {
    authorize_appointment(actor, appointment)?;

    match (actor.role, new_status) {
        (UserRole::Patient, AppointmentStatus::Cancelled) => Ok(()),
        (UserRole::Patient, status) => Err(denied(format!("patients cannot set status {}", status))),
        _ => Ok(()),
    }
}

pub fn authorize_admin(actor: &ActingUser, action: &str) -> Result<(), AppointmentError> {
    if actor.role != UserRole::Admin {
        return Err(denied(format!("only administrators can {}", action)));
    }
    Ok(())
}

/// Admins and professionals.
pub fn authorize_staff(actor: &ActingUser, action: &str) -> Result<(), AppointmentError> {
    if actor.role == UserRole::Patient {
        return Err(denied(format!("patients cannot {}", action)));
    }
    Ok(())
}

/// Patient record edits: staff, or the patient themself.
pub fn authorize_patient_record(actor: &ActingUser, patient_id: Uuid) -> Result<(), AppointmentError> {
    match actor.role {
        UserRole::Patient if actor.patient_id != Some(patient_id) => {
            Err(denied("patients can only update their own record"))
        }
        _ => Ok(()),
    }
}

/// Narrows a list filter to what the caller may see. Asking explicitly for
/// someone else's appointments is refused rather than silently rewritten.
pub fn scope_filter(actor: &ActingUser, mut filter: AppointmentFilter) -> Result<AppointmentFilter, AppointmentError> {
    if actor.role == UserRole::Patient {
        let own = actor
            .patient_id
            .ok_or_else(|| denied("patient caller has no patient record"))?;
        match filter.patient_id {
            Some(requested) if requested != own => {
                return Err(denied("patients can only list their own appointments"))
            }
            _ => filter.patient_id = Some(own),
        }
    }

    if let Some(locked) = actor.locked_professional_id {
        match filter.professional_id {
            Some(requested) if requested != locked => {
                return Err(denied(format!("calendar is locked to professional {}", locked)))
            }
            _ => filter.professional_id = Some(locked),
        }
    }

    Ok(filter)
}
