// libs/appointment-cell/src/store/mod.rs
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use shared_database::SupabaseError;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentPatch, ConflictReason, Patient, Professional,
    Service,
};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryStore;
pub use supabase::SupabaseStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Uniqueness or exclusion constraint rejected the write.
    #[error("Write rejected by constraint: {0}")]
    Exclusion(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage call exceeded {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("Malformed record: {0}")]
    Decode(String),
}

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Constraint { code, message } => {
                StoreError::Exclusion(format!("{} ({})", message, code))
            }
            SupabaseError::Decode(message) => StoreError::Decode(message),
            SupabaseError::Timeout => StoreError::Timeout { after_ms: 0 },
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => AppointmentError::NotFound { entity, id },
            StoreError::Exclusion(message) => AppointmentError::Duplicate(message),
            StoreError::Timeout { after_ms } => AppointmentError::StorageTimeout { after_ms },
            StoreError::Unavailable(message) | StoreError::Decode(message) => {
                error!("Storage failure: {}", message);
                AppointmentError::StorageFailure(message)
            }
        }
    }
}

impl StoreError {
    /// Maps a rejected appointment write onto the slot it tried to claim.
    pub fn into_slot_error(self, slot: &Appointment) -> AppointmentError {
        match self {
            StoreError::Exclusion(_) => AppointmentError::Conflict(ConflictReason::SlotTaken {
                date: slot.date,
                start_time: slot.start_time,
                end_time: slot.end_time,
            }),
            other => other.into(),
        }
    }
}

/// Runs one storage call under `after`, surfacing `StoreError::Timeout` instead of hanging.
pub async fn timed<T, F>(after: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let after_ms = after.as_millis() as u64;
    match tokio::time::timeout(after, call).await {
        Ok(Err(StoreError::Timeout { .. })) => Err(StoreError::Timeout { after_ms }),
        Ok(result) => result,
        Err(_) => {
            error!("Storage call timed out after {} ms", after_ms);
            Err(StoreError::Timeout { after_ms })
        }
    }
}

/// Persistence collaborator of the scheduling engine and the directory.
///
/// Appointment writes return the record as stored, so callers never echo
/// their own request back as if it were authoritative.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;
    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError>;
    async fn update_appointment(&self, id: Uuid, patch: &AppointmentPatch) -> Result<Appointment, StoreError>;
    async fn delete_appointment(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;
    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError>;
    async fn insert_patient(&self, patient: Patient) -> Result<Patient, StoreError>;
    async fn update_patient(&self, patient: Patient) -> Result<Patient, StoreError>;
    async fn delete_patient(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_professionals(&self) -> Result<Vec<Professional>, StoreError>;
    async fn get_professional(&self, id: Uuid) -> Result<Option<Professional>, StoreError>;
    async fn insert_professional(&self, professional: Professional) -> Result<Professional, StoreError>;
    async fn update_professional(&self, professional: Professional) -> Result<Professional, StoreError>;
    async fn delete_professional(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_services(&self) -> Result<Vec<Service>, StoreError>;
    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StoreError>;
    async fn insert_service(&self, service: Service) -> Result<Service, StoreError>;
    async fn update_service(&self, service: Service) -> Result<Service, StoreError>;
    async fn delete_service(&self, id: Uuid) -> Result<(), StoreError>;
}
