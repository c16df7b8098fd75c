// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::{User, UserRole};

use crate::services::time_utils::ClockTime;

// ==============================================================================
// CLINIC ENTITIES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub cpf: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Weekly availability window. `day_of_week` is 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingHours {
    #[serde(alias = "dayOfWeek")]
    pub day_of_week: u8,
    pub start: ClockTime,
    pub end: ClockTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Professional {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: String,
    pub color: String,
    pub working_hours: Vec<WorkingHours>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Minutes, always positive.
    pub duration: u32,
    pub price: f64,
    pub category: String,
    pub professional_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn is_performed_by(&self, professional_id: Uuid) -> bool {
        self.professional_ids.contains(&professional_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub total_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_occupying(&self) -> bool {
        self.status.is_occupying()
    }

    pub fn duration_minutes(&self) -> u32 {
        crate::services::time_utils::minutes_between(self.start_time, self.end_time)
    }
}

/// Read-only join used for display. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppointmentWithDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: Patient,
    pub professional: Professional,
    pub service: Service,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    #[serde(rename = "agendado", alias = "scheduled")]
    Scheduled,
    #[serde(rename = "confirmado", alias = "confirmed")]
    Confirmed,
    #[serde(rename = "realizado", alias = "completed")]
    Completed,
    #[serde(rename = "cancelado", alias = "cancelled")]
    Cancelled,
    #[serde(rename = "faltou", alias = "no_show")]
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that reserve their time slot.
    pub fn is_occupying(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed | AppointmentStatus::Completed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "agendado"),
            AppointmentStatus::Confirmed => write!(f, "confirmado"),
            AppointmentStatus::Completed => write!(f, "realizado"),
            AppointmentStatus::Cancelled => write!(f, "cancelado"),
            AppointmentStatus::NoShow => write!(f, "faltou"),
        }
    }
}

// ==============================================================================
// CALLER CONTEXT
// ==============================================================================

/// Resolved identity of the caller. Authorization policy happens upstream; the
/// engine only enforces the scopes carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser {
    pub role: UserRole,
    /// Clinic patient record a patient-role caller acts for.
    pub patient_id: Option<Uuid>,
    /// Calendar lock: the caller may only touch this professional's agenda.
    pub locked_professional_id: Option<Uuid>,
}

impl ActingUser {
    pub fn admin() -> Self {
        Self { role: UserRole::Admin, patient_id: None, locked_professional_id: None }
    }

    pub fn professional(professional_id: Uuid) -> Self {
        Self {
            role: UserRole::Professional,
            patient_id: None,
            locked_professional_id: Some(professional_id),
        }
    }

    pub fn patient(patient_id: Uuid) -> Self {
        Self { role: UserRole::Patient, patient_id: Some(patient_id), locked_professional_id: None }
    }

    /// Builds the scope from a validated token. Patients and professionals are
    /// bound to `patient_id` / `professional_id` metadata, or to their own id.
    pub fn from_user(user: &User) -> Self {
        let own_id = || Uuid::parse_str(&user.id).ok();
        let metadata_id = |key: &str| user.metadata_str(key).and_then(|v| Uuid::parse_str(v).ok());

        match user.role {
            UserRole::Admin => Self::admin(),
            UserRole::Professional => Self {
                role: UserRole::Professional,
                patient_id: None,
                locked_professional_id: metadata_id("professional_id").or_else(own_id),
            },
            UserRole::Patient => Self {
                role: UserRole::Patient,
                patient_id: metadata_id("patient_id").or_else(own_id),
                locked_professional_id: None,
            },
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub professional_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentFilter {
    pub professional_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl AppointmentFilter {
    /// Appointments of one professional on one day, as read by the conflict check.
    pub fn calendar(professional_id: Uuid, date: NaiveDate) -> Self {
        Self { professional_id: Some(professional_id), date: Some(date), ..Self::default() }
    }

    pub fn for_patient(patient_id: Uuid) -> Self {
        Self { patient_id: Some(patient_id), ..Self::default() }
    }

    pub fn for_service(service_id: Uuid) -> Self {
        Self { service_id: Some(service_id), ..Self::default() }
    }

    pub fn for_professional(professional_id: Uuid) -> Self {
        Self { professional_id: Some(professional_id), ..Self::default() }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.professional_id.map_or(true, |id| appointment.professional_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.service_id.map_or(true, |id| appointment.service_id == id)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.date.map_or(true, |d| appointment.date == d)
            && self.date_from.map_or(true, |d| appointment.date >= d)
            && self.date_to.map_or(true, |d| appointment.date <= d)
    }
}

/// Partial update of an appointment. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentPatch {
    pub professional_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<Option<String>>,
    pub total_value: Option<Option<f64>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AppointmentPatch {
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(id) = self.professional_id {
            appointment.professional_id = id;
        }
        if let Some(id) = self.service_id {
            appointment.service_id = id;
        }
        if let Some(date) = self.date {
            appointment.date = date;
        }
        if let Some(start) = self.start_time {
            appointment.start_time = start;
        }
        if let Some(end) = self.end_time {
            appointment.end_time = end;
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(notes) = &self.notes {
            appointment.notes = notes.clone();
        }
        if let Some(total) = self.total_value {
            appointment.total_value = total;
        }
        if let Some(updated_at) = self.updated_at {
            appointment.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub cpf: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub cpf: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfessionalRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: String,
    pub color: Option<String>,
    #[serde(default)]
    pub working_hours: Vec<WorkingHours>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfessionalRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub color: Option<String>,
    pub working_hours: Option<Vec<WorkingHours>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration: u32,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub professional_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration: Option<u32>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub professional_ids: Option<Vec<Uuid>>,
}

// ==============================================================================
// AVAILABILITY & STATISTICS MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreeInterval {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl FreeInterval {
    pub fn duration_minutes(&self) -> u32 {
        crate::services::time_utils::minutes_between(self.start, self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardMetrics {
    pub appointments_today: usize,
    pub monthly_revenue: f64,
    pub new_patients_this_month: usize,
    pub completed_appointments: usize,
    pub cancelled_appointments: usize,
    pub average_appointment_duration: f64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Why a slot cannot be booked.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictReason {
    /// Overlaps an occupying appointment of the same professional.
    Overlap {
        appointment_id: Uuid,
        date: NaiveDate,
        start_time: ClockTime,
        end_time: ClockTime,
    },
    /// Not fully inside the professional's window for that weekday.
    OutsideWorkingHours {
        date: NaiveDate,
        start_time: ClockTime,
        end_time: ClockTime,
        window: Option<(ClockTime, ClockTime)>,
    },
    /// Rejected by the store's exclusion constraint after passing the check.
    SlotTaken {
        date: NaiveDate,
        start_time: ClockTime,
        end_time: ClockTime,
    },
}

impl ConflictReason {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::Overlap { .. } | ConflictReason::SlotTaken { .. } => "conflict",
            ConflictReason::OutsideWorkingHours { .. } => "outside-working-hours",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::Overlap { appointment_id, date, start_time, end_time } => write!(
                f,
                "overlaps appointment {} booked on {} from {} to {}",
                appointment_id, date, start_time, end_time
            ),
            ConflictReason::OutsideWorkingHours { date, start_time, end_time, window: Some((open, close)) } => write!(
                f,
                "{}-{} on {} is outside working hours {}-{}",
                start_time, end_time, date, open, close
            ),
            ConflictReason::OutsideWorkingHours { date, start_time, end_time, window: None } => write!(
                f,
                "{}-{} on {} is outside working hours: professional does not work on {}",
                start_time, end_time, date, date.format("%A")
            ),
            ConflictReason::SlotTaken { date, start_time, end_time } => write!(
                f,
                "slot {} {}-{} was taken by a concurrent booking",
                date, start_time, end_time
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Scheduling conflict: {0}")]
    Conflict(ConflictReason),

    /// A uniqueness constraint outside the calendar, e.g. a patient's CPF.
    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Appointment is {status} and can no longer be rescheduled")]
    AppointmentClosed { status: AppointmentStatus },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Storage did not respond within {after_ms} ms")]
    StorageTimeout { after_ms: u64 },
}

impl AppointmentError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppointmentError::Validation { field, message: message.into() }
    }

    /// Expected business outcome, returned as a value to the caller.
    pub fn is_business_error(&self) -> bool {
        !self.is_retryable()
    }

    /// Infrastructure failure; the whole operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppointmentError::StorageFailure(_) | AppointmentError::StorageTimeout { .. }
        )
    }
}
