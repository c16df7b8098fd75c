// libs/appointment-cell/src/services/directory.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    ActingUser, AppointmentError, AppointmentFilter, CreatePatientRequest, CreateProfessionalRequest,
    CreateServiceRequest, Patient, Professional, Service, UpdatePatientRequest, UpdateProfessionalRequest,
    UpdateServiceRequest,
};
use crate::services::access;
use crate::services::working_hours::validate_working_hours;
use crate::store::{timed, ClinicStore, StoreError};

const DEFAULT_PROFESSIONAL_COLOR: &str = "#3b82f6";

fn required(field: &'static str, value: &str) -> Result<String, AppointmentError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppointmentError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_email(email: &Option<String>) -> Result<(), AppointmentError> {
    match email {
        Some(address) if !address.contains('@') => Err(AppointmentError::validation(
            "email",
            format!("'{}' is not an e-mail address", address),
        )),
        _ => Ok(()),
    }
}

fn validate_color(color: &str) -> Result<(), AppointmentError> {
    let hex = color.strip_prefix('#').unwrap_or("");
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppointmentError::validation("color", format!("'{}' is not a #rrggbb color", color)));
    }
    Ok(())
}

fn validate_pricing(duration: u32, price: f64) -> Result<(), AppointmentError> {
    if duration == 0 {
        return Err(AppointmentError::validation("duration", "must be a positive number of minutes"));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(AppointmentError::validation("price", "must be a non-negative amount"));
    }
    Ok(())
}

/// Patients, professionals and services referenced by appointments.
pub struct ClinicDirectoryService {
    store: Arc<dyn ClinicStore>,
    storage_timeout: Duration,
}

impl ClinicDirectoryService {
    pub fn new(store: Arc<dyn ClinicStore>, storage_timeout: Duration) -> Self {
        Self { store, storage_timeout }
    }

    async fn call<T, F>(&self, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        timed(self.storage_timeout, future).await
    }

    async fn appointment_count(&self, filter: AppointmentFilter) -> Result<usize, AppointmentError> {
        Ok(self.call(self.store.list_appointments(&filter)).await?.len())
    }

    // ==============================================================================
    // PATIENTS
    // ==============================================================================

    pub async fn list_patients(&self, actor: &ActingUser) -> Result<Vec<Patient>, AppointmentError> {
        access::authorize_staff(actor, "list patients")?;
        Ok(self.call(self.store.list_patients()).await?)
    }

    pub async fn get_patient(&self, actor: &ActingUser, id: Uuid) -> Result<Patient, AppointmentError> {
        access::authorize_patient_record(actor, id)?;
        self.call(self.store.get_patient(id))
            .await?
            .ok_or(AppointmentError::NotFound { entity: "Patient", id })
    }

    pub async fn create_patient(
        &self,
        actor: &ActingUser,
        request: CreatePatientRequest,
    ) -> Result<Patient, AppointmentError> {
        access::authorize_staff(actor, "register patients")?;

        let patient = Patient {
            id: Uuid::new_v4(),
            name: required("name", &request.name)?,
            email: optional(request.email),
            phone: optional(request.phone),
            birth_date: request.birth_date,
            cpf: optional(request.cpf),
            address: optional(request.address),
            notes: optional(request.notes),
            created_at: Utc::now(),
        };
        validate_email(&patient.email)?;

        let stored = self.call(self.store.insert_patient(patient)).await?;
        info!("Patient {} registered", stored.id);
        Ok(stored)
    }

    pub async fn update_patient(
        &self,
        actor: &ActingUser,
        id: Uuid,
        request: UpdatePatientRequest,
    ) -> Result<Patient, AppointmentError> {
        let mut patient = self.get_patient(actor, id).await?;

        if let Some(name) = request.name {
            patient.name = required("name", &name)?;
        }
        if request.email.is_some() {
            patient.email = optional(request.email);
            validate_email(&patient.email)?;
        }
        if request.phone.is_some() {
            patient.phone = optional(request.phone);
        }
        if request.birth_date.is_some() {
            patient.birth_date = request.birth_date;
        }
        if request.cpf.is_some() {
            patient.cpf = optional(request.cpf);
        }
        if request.address.is_some() {
            patient.address = optional(request.address);
        }
        if request.notes.is_some() {
            patient.notes = optional(request.notes);
        }

        let stored = self.call(self.store.update_patient(patient)).await?;
        info!("Patient {} updated", stored.id);
        Ok(stored)
    }

    /// Refuses while appointments reference the patient, unless `cascade`
    /// removes those appointments first.
    pub async fn delete_patient(&self, actor: &ActingUser, id: Uuid, cascade: bool) -> Result<(), AppointmentError> {
        access::authorize_staff(actor, "delete patients")?;

        let appointments = self
            .call(self.store.list_appointments(&AppointmentFilter::for_patient(id)))
            .await?;

        if !appointments.is_empty() {
            if !cascade {
                return Err(AppointmentError::validation(
                    "cascade",
                    format!(
                        "patient {} still has {} appointment(s); delete with cascade to remove them",
                        id,
                        appointments.len()
                    ),
                ));
            }
            for appointment in &appointments {
                debug!("Cascading delete of appointment {}", appointment.id);
                self.call(self.store.delete_appointment(appointment.id)).await?;
            }
            warn!("Removed {} appointment(s) of patient {}", appointments.len(), id);
        }

        self.call(self.store.delete_patient(id)).await?;
        info!("Patient {} deleted", id);
        Ok(())
    }

    // ==============================================================================
    // PROFESSIONALS
    // ==============================================================================

    pub async fn list_professionals(&self) -> Result<Vec<Professional>, AppointmentError> {
        Ok(self.call(self.store.list_professionals()).await?)
    }

    pub async fn get_professional(&self, id: Uuid) -> Result<Professional, AppointmentError> {
        self.call(self.store.get_professional(id))
            .await?
            .ok_or(AppointmentError::NotFound { entity: "Professional", id })
    }

    pub async fn create_professional(
        &self,
        actor: &ActingUser,
        request: CreateProfessionalRequest,
    ) -> Result<Professional, AppointmentError> {
        access::authorize_admin(actor, "register professionals")?;

        let color = optional(request.color).unwrap_or_else(|| DEFAULT_PROFESSIONAL_COLOR.to_string());
        validate_color(&color)?;
        validate_working_hours(&request.working_hours)?;

        let professional = Professional {
            id: Uuid::new_v4(),
            name: required("name", &request.name)?,
            email: optional(request.email),
            phone: optional(request.phone),
            specialty: required("specialty", &request.specialty)?,
            color,
            working_hours: request.working_hours,
            created_at: Utc::now(),
        };
        validate_email(&professional.email)?;

        let stored = self.call(self.store.insert_professional(professional)).await?;
        info!("Professional {} registered", stored.id);
        Ok(stored)
    }

    pub async fn update_professional(
        &self,
        actor: &ActingUser,
        id: Uuid,
        request: UpdateProfessionalRequest,
    ) -> Result<Professional, AppointmentError> {
        access::authorize_admin(actor, "update professionals")?;
        let mut professional = self.get_professional(id).await?;

        if let Some(name) = request.name {
            professional.name = required("name", &name)?;
        }
        if request.email.is_some() {
            professional.email = optional(request.email);
            validate_email(&professional.email)?;
        }
        if request.phone.is_some() {
            professional.phone = optional(request.phone);
        }
        if let Some(specialty) = request.specialty {
            professional.specialty = required("specialty", &specialty)?;
        }
        if let Some(color) = request.color {
            validate_color(color.trim())?;
            professional.color = color.trim().to_string();
        }
        if let Some(hours) = request.working_hours {
            validate_working_hours(&hours)?;
            professional.working_hours = hours;
        }

        let stored = self.call(self.store.update_professional(professional)).await?;
        info!("Professional {} updated", stored.id);
        Ok(stored)
    }

    pub async fn delete_professional(&self, actor: &ActingUser, id: Uuid) -> Result<(), AppointmentError> {
        access::authorize_admin(actor, "delete professionals")?;

        let booked = self.appointment_count(AppointmentFilter::for_professional(id)).await?;
        if booked > 0 {
            return Err(AppointmentError::validation(
                "professional_id",
                format!("professional {} is referenced by {} appointment(s)", id, booked),
            ));
        }

        self.call(self.store.delete_professional(id)).await?;
        info!("Professional {} deleted", id);
        Ok(())
    }

    // ==============================================================================
    // SERVICES
    // ==============================================================================

    pub async fn list_services(&self) -> Result<Vec<Service>, AppointmentError> {
        Ok(self.call(self.store.list_services()).await?)
    }

    pub async fn get_service(&self, id: Uuid) -> Result<Service, AppointmentError> {
        self.call(self.store.get_service(id))
            .await?
            .ok_or(AppointmentError::NotFound { entity: "Service", id })
    }

    async fn ensure_professionals_exist(&self, ids: &[Uuid]) -> Result<(), AppointmentError> {
        for &id in ids {
            self.get_professional(id).await?;
        }
        Ok(())
    }

    pub async fn create_service(
        &self,
        actor: &ActingUser,
        request: CreateServiceRequest,
    ) -> Result<Service, AppointmentError> {
        access::authorize_admin(actor, "create services")?;
        validate_pricing(request.duration, request.price)?;
        self.ensure_professionals_exist(&request.professional_ids).await?;

        let mut professional_ids = request.professional_ids;
        professional_ids.sort();
        professional_ids.dedup();

        let service = Service {
            id: Uuid::new_v4(),
            name: required("name", &request.name)?,
            description: optional(request.description),
            duration: request.duration,
            price: request.price,
            category: request.category.trim().to_string(),
            professional_ids,
            created_at: Utc::now(),
        };

        let stored = self.call(self.store.insert_service(service)).await?;
        info!("Service {} created", stored.id);
        Ok(stored)
    }

    /// Price changes apply to future bookings only; recorded totals stay as they are.
    pub async fn update_service(
        &self,
        actor: &ActingUser,
        id: Uuid,
        request: UpdateServiceRequest,
    ) -> Result<Service, AppointmentError> {
        access::authorize_admin(actor, "update services")?;
        let mut service = self.get_service(id).await?;

        if let Some(name) = request.name {
            service.name = required("name", &name)?;
        }
        if request.description.is_some() {
            service.description = optional(request.description);
        }
        if let Some(duration) = request.duration {
            service.duration = duration;
        }
        if let Some(price) = request.price {
            service.price = price;
        }
        if let Some(category) = request.category {
            service.category = category.trim().to_string();
        }
        if let Some(mut ids) = request.professional_ids {
            self.ensure_professionals_exist(&ids).await?;
            ids.sort();
            ids.dedup();
            service.professional_ids = ids;
        }
        validate_pricing(service.duration, service.price)?;

        let stored = self.call(self.store.update_service(service)).await?;
        info!("Service {} updated", stored.id);
        Ok(stored)
    }

    pub async fn delete_service(&self, actor: &ActingUser, id: Uuid) -> Result<(), AppointmentError> {
        access::authorize_admin(actor, "delete services")?;

        let booked = self.appointment_count(AppointmentFilter::for_service(id)).await?;
        if booked > 0 {
            return Err(AppointmentError::validation(
                "service_id",
                format!("service {} is referenced by {} appointment(s)", id, booked),
            ));
        }

        self.call(self.store.delete_service(id)).await?;
        info!("Service {} deleted", id);
        Ok(())
    }
}
