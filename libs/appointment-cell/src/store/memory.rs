// libs/appointment-cell/src/store/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentFilter, AppointmentPatch, Patient, Professional, Service};
use crate::services::time_utils::overlaps;
use crate::store::{ClinicStore, StoreError};

#[derive(Default)]
struct Tables {
    patients: HashMap<Uuid, Patient>,
    professionals: HashMap<Uuid, Professional>,
    services: HashMap<Uuid, Service>,
    appointments: HashMap<Uuid, Appointment>,
}

impl Tables {
    /// Same guarantee as an exclusion constraint on
    /// (professional_id, date, [start_time, end_time)) over occupying rows.
    fn check_exclusion(&self, candidate: &Appointment) -> Result<(), StoreError> {
        if !candidate.is_occupying() {
            return Ok(());
        }

        let clash = self.appointments.values().find(|other| {
            other.id != candidate.id
                && other.is_occupying()
                && other.professional_id == candidate.professional_id
                && other.date == candidate.date
                && overlaps(candidate.start_time, candidate.end_time, other.start_time, other.end_time)
        });

        match clash {
            Some(other) => {
                warn!("Exclusion constraint: {} overlaps {}", candidate.id, other.id);
                Err(StoreError::Exclusion(format!(
                    "appointment overlaps {} on {} {}-{}",
                    other.id, other.date, other.start_time, other.end_time
                )))
            }
            None => Ok(()),
        }
    }
}

/// Process-local store. Backs the API when no database is configured, and tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by<T, K: Ord>(rows: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(key);
    rows
}

#[async_trait]
impl ClinicStore for InMemoryStore {
    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables.appointments.values().filter(|a| filter.matches(a)).cloned();
        Ok(sorted_by(rows, |a| (a.date, a.start_time)))
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_exclusion(&appointment)?;
        debug!("Inserted appointment {}", appointment.id);
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(&self, id: Uuid, patch: &AppointmentPatch) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        let mut updated = tables
            .appointments
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "Appointment", id })?;

        patch.apply_to(&mut updated);
        tables.check_exclusion(&updated)?;
        tables.appointments.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .appointments
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { entity: "Appointment", id })
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let tables = self.tables.read().await;
        Ok(sorted_by(tables.patients.values().cloned(), |p| p.name.clone()))
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.tables.read().await.patients.get(&id).cloned())
    }

    async fn insert_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        self.tables.write().await.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn update_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.patients.get_mut(&patient.id) {
            Some(row) => {
                *row = patient.clone();
                Ok(patient)
            }
            None => Err(StoreError::NotFound { entity: "Patient", id: patient.id }),
        }
    }

    async fn delete_patient(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .patients
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { entity: "Patient", id })
    }

    async fn list_professionals(&self) -> Result<Vec<Professional>, StoreError> {
        let tables = self.tables.read().await;
        Ok(sorted_by(tables.professionals.values().cloned(), |p| p.name.clone()))
    }

    async fn get_professional(&self, id: Uuid) -> Result<Option<Professional>, StoreError> {
        Ok(self.tables.read().await.professionals.get(&id).cloned())
    }

    async fn insert_professional(&self, professional: Professional) -> Result<Professional, StoreError> {
        self.tables
            .write()
            .await
            .professionals
            .insert(professional.id, professional.clone());
        Ok(professional)
    }

    async fn update_professional(&self, professional: Professional) -> Result<Professional, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.professionals.get_mut(&professional.id) {
            Some(row) => {
                *row = professional.clone();
                Ok(professional)
            }
            None => Err(StoreError::NotFound { entity: "Professional", id: professional.id }),
        }
    }

    async fn delete_professional(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .professionals
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { entity: "Professional", id })
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        let tables = self.tables.read().await;
        Ok(sorted_by(tables.services.values().cloned(), |s| s.name.clone()))
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn insert_service(&self, service: Service) -> Result<Service, StoreError> {
        self.tables.write().await.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn update_service(&self, service: Service) -> Result<Service, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.services.get_mut(&service.id) {
            Some(row) => {
                *row = service.clone();
                Ok(service)
            }
            None => Err(StoreError::NotFound { entity: "Service", id: service.id }),
        }
    }

    async fn delete_service(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .services
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { entity: "Service", id })
    }
}
