// libs/appointment-cell/src/services/booking.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{
    ActingUser, Appointment, AppointmentError, AppointmentFilter, AppointmentPatch, AppointmentStatus,
    AppointmentWithDetails, ChangeStatusRequest, CreateAppointmentRequest, DashboardMetrics, Patient, Professional,
    RescheduleAppointmentRequest, Service,
};
use crate::services::access;
use crate::services::availability::Availability;
use crate::services::conflict::{ConflictDetectionService, SlotCandidate};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockRegistry;
use crate::services::notification::{appointment_payload, dispatch, NotificationKind, Notifier};
use crate::services::time_utils::{add_minutes, ClockTime, MINUTES_PER_DAY};
use crate::store::{timed, ClinicStore, StoreError};

/// Engine settings derived from [`AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulingRules {
    pub enforce_working_hours: bool,
    pub storage_timeout: Duration,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            enforce_working_hours: true,
            storage_timeout: Duration::from_secs(5),
        }
    }
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enforce_working_hours: config.enforce_working_hours,
            storage_timeout: config.storage_timeout(),
        }
    }
}

/// Computes `[start, start + duration)`, refusing slots that would cross midnight.
pub fn service_window(start: ClockTime, duration: u32) -> Result<(ClockTime, ClockTime), AppointmentError> {
    if duration == 0 {
        return Err(AppointmentError::validation("duration", "service duration must be positive"));
    }

    if start.minutes_since_midnight().saturating_add(duration) >= MINUTES_PER_DAY {
        return Err(AppointmentError::validation(
            "start_time",
            format!("a {} minute service starting at {} would end after midnight", duration, start),
        ));
    }
    Ok((start, add_minutes(start, i64::from(duration))))
}

/// Orchestrates conflict detection, the status lifecycle and persistence.
///
/// Every read-check-write runs under the (professional, date) lock of the
/// calendar being written, and every store call is bounded by the configured
/// timeout.
pub struct AppointmentBookingService {
    store: Arc<dyn ClinicStore>,
    notifier: Arc<dyn Notifier>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    locks: SlotLockRegistry,
    rules: SchedulingRules,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn ClinicStore>, notifier: Arc<dyn Notifier>, rules: SchedulingRules) -> Self {
        Self {
            store,
            notifier,
            conflict_service: ConflictDetectionService::new(rules.enforce_working_hours),
            lifecycle_service: AppointmentLifecycleService::new(),
            locks: SlotLockRegistry::new(),
            rules,
        }
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn ClinicStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(store, notifier, SchedulingRules::from_config(config))
    }

    pub fn rules(&self) -> SchedulingRules {
        self.rules
    }

    async fn call<T, F>(&self, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        timed(self.rules.storage_timeout, future).await
    }

    // ==============================================================================
    // LOOKUPS
    // ==============================================================================

    async fn load_appointment(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.call(self.store.get_appointment(id))
            .await?
            .ok_or(AppointmentError::NotFound { entity: "Appointment", id })
    }

    async fn load_patient(&self, id: Uuid) -> Result<Patient, AppointmentError> {
        self.call(self.store.get_patient(id))
            .await?
            .ok_or(AppointmentError::NotFound { entity: "Patient", id })
    }

    async fn load_professional(&self, id: Uuid) -> Result<Professional, AppointmentError> {
        self.call(self.store.get_professional(id))
            .await?
            .ok_or(AppointmentError::NotFound { entity: "Professional", id })
    }

    async fn load_service(&self, id: Uuid) -> Result<Service, AppointmentError> {
        self.call(self.store.get_service(id))
            .await?
            .ok_or(AppointmentError::NotFound { entity: "Service", id })
    }

    async fn calendar(&self, professional_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let filter = AppointmentFilter::calendar(professional_id, date);
        Ok(self.call(self.store.list_appointments(&filter)).await?)
    }

    fn ensure_eligible(&self, service: &Service, professional: &Professional) -> Result<(), AppointmentError> {
        if !service.is_performed_by(professional.id) {
            warn!("Professional {} does not perform service {}", professional.id, service.id);
            return Err(AppointmentError::validation(
                "professional_id",
                format!("{} does not perform the service '{}'", professional.name, service.name),
            ));
        }
        Ok(())
    }

    fn check_slot(
        &self,
        candidate: &SlotCandidate,
        existing: &[Appointment],
        professional: &Professional,
    ) -> Result<(), AppointmentError> {
        self.conflict_service
            .can_book(candidate, existing, &professional.working_hours)
            .map_err(AppointmentError::Conflict)
    }

    // ==============================================================================
    // SCHEDULING OPERATIONS
    // ==============================================================================

    pub async fn create_appointment(
        &self,
        actor: &ActingUser,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with professional {} on {} at {}",
            request.patient_id, request.professional_id, request.date, request.start_time
        );

        access::authorize_booking(actor, request.patient_id, request.professional_id)?;

        let (_patient, professional, service) = futures::try_join!(
            self.load_patient(request.patient_id),
            self.load_professional(request.professional_id),
            self.load_service(request.service_id),
        )?;

        self.ensure_eligible(&service, &professional)?;
        let (start_time, end_time) = service_window(request.start_time, service.duration)?;

        let _guard = self.locks.acquire(professional.id, request.date).await;

        let existing = self.calendar(professional.id, request.date).await?;
        let candidate = SlotCandidate {
            professional_id: professional.id,
            date: request.date,
            start_time,
            end_time,
            exclude_appointment_id: None,
        };
        self.check_slot(&candidate, &existing, &professional)?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            professional_id: professional.id,
            service_id: service.id,
            date: request.date,
            start_time,
            end_time,
            status: AppointmentStatus::Scheduled,
            notes: normalize_notes(request.notes),
            total_value: Some(service.price),
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .call(self.store.insert_appointment(appointment.clone()))
            .await
            .map_err(|e| e.into_slot_error(&appointment))?;

        info!("Appointment {} booked {} {}-{}", stored.id, stored.date, stored.start_time, stored.end_time);
        dispatch(&self.notifier, NotificationKind::AppointmentBooked, appointment_payload(&stored));
        Ok(stored)
    }

    pub async fn reschedule_appointment(
        &self,
        actor: &ActingUser,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Rescheduling appointment {} to {} at {}",
            appointment_id, request.date, request.start_time
        );

        let current = self.load_appointment(appointment_id).await?;
        access::authorize_appointment(actor, &current)?;

        let professional_id = request.professional_id.unwrap_or(current.professional_id);
        let service_id = request.service_id.unwrap_or(current.service_id);
        access::authorize_booking(actor, current.patient_id, professional_id)?;

        let (professional, service) = futures::try_join!(
            self.load_professional(professional_id),
            self.load_service(service_id),
        )?;

        self.ensure_eligible(&service, &professional)?;
        let (start_time, end_time) = service_window(request.start_time, service.duration)?;

        let _guard = self.locks.acquire(professional_id, request.date).await;

        // Re-read inside the lock so a concurrent status change is observed.
        let current = self.load_appointment(appointment_id).await?;
        self.lifecycle_service.ensure_reschedulable(&current)?;

        let existing = self.calendar(professional_id, request.date).await?;
        let candidate = SlotCandidate {
            professional_id,
            date: request.date,
            start_time,
            end_time,
            exclude_appointment_id: Some(current.id),
        };
        self.check_slot(&candidate, &existing, &professional)?;

        let service_changed = service_id != current.service_id;
        let patch = AppointmentPatch {
            professional_id: Some(professional_id),
            service_id: Some(service_id),
            date: Some(request.date),
            start_time: Some(start_time),
            end_time: Some(end_time),
            total_value: service_changed.then_some(Some(service.price)),
            updated_at: Some(Utc::now()),
            ..AppointmentPatch::default()
        };

        let mut target = current.clone();
        patch.apply_to(&mut target);

        let stored = self
            .call(self.store.update_appointment(current.id, &patch))
            .await
            .map_err(|e| e.into_slot_error(&target))?;

        info!(
            "Appointment {} moved from {} {} to {} {}",
            stored.id, current.date, current.start_time, stored.date, stored.start_time
        );
        dispatch(&self.notifier, NotificationKind::AppointmentRescheduled, appointment_payload(&stored));
        Ok(stored)
    }

    pub async fn change_status(
        &self,
        actor: &ActingUser,
        appointment_id: Uuid,
        request: ChangeStatusRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.load_appointment(appointment_id).await?;
        access::authorize_status_change(actor, &current, request.status)?;

        let _guard = self.locks.acquire(current.professional_id, current.date).await;
        let current = self.load_appointment(appointment_id).await?;

        let service_price = if request.status == AppointmentStatus::Completed && current.total_value.is_none() {
            self.call(self.store.get_service(current.service_id))
                .await?
                .map(|service| service.price)
        } else {
            None
        };

        let patch = self
            .lifecycle_service
            .apply_status_change(&current, request.status, service_price, Utc::now())?;

        let stored = self.call(self.store.update_appointment(current.id, &patch)).await?;

        dispatch(&self.notifier, NotificationKind::AppointmentStatusChanged, appointment_payload(&stored));
        Ok(stored)
    }

    /// Free gaps in a professional's working window on `date`.
    pub async fn list_availability(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Availability, AppointmentError> {
        debug!("Listing availability of professional {} on {}", professional_id, date);

        let professional = self.load_professional(professional_id).await?;
        let existing = self.calendar(professional_id, date).await?;
        Ok(Availability::new(professional_id, date, &professional.working_hours, &existing))
    }

    // ==============================================================================
    // READS & ADMINISTRATION
    // ==============================================================================

    pub async fn get_appointment(&self, actor: &ActingUser, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.load_appointment(appointment_id).await?;
        access::authorize_appointment(actor, &appointment)?;
        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        actor: &ActingUser,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let filter = access::scope_filter(actor, filter)?;
        debug!("Listing appointments with filter {:?}", filter);
        Ok(self.call(self.store.list_appointments(&filter)).await?)
    }

    pub async fn get_appointment_with_details(
        &self,
        actor: &ActingUser,
        appointment_id: Uuid,
    ) -> Result<AppointmentWithDetails, AppointmentError> {
        let appointment = self.get_appointment(actor, appointment_id).await?;

        let (patient, professional, service) = futures::try_join!(
            self.load_patient(appointment.patient_id),
            self.load_professional(appointment.professional_id),
            self.load_service(appointment.service_id),
        )?;

        Ok(AppointmentWithDetails { appointment, patient, professional, service })
    }

    pub async fn update_notes(
        &self,
        actor: &ActingUser,
        appointment_id: Uuid,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.load_appointment(appointment_id).await?;
        access::authorize_appointment(actor, &current)?;

        let patch = AppointmentPatch {
            notes: Some(normalize_notes(notes)),
            updated_at: Some(Utc::now()),
            ..AppointmentPatch::default()
        };

        let stored = self.call(self.store.update_appointment(current.id, &patch)).await?;
        info!("Notes of appointment {} updated", stored.id);
        Ok(stored)
    }

    /// Removes the record entirely. Cancellation is a status change; this is not.
    pub async fn delete_appointment(&self, actor: &ActingUser, appointment_id: Uuid) -> Result<(), AppointmentError> {
        access::authorize_admin(actor, "delete appointments")?;

        let appointment = self.load_appointment(appointment_id).await?;
        self.call(self.store.delete_appointment(appointment_id)).await?;

        warn!("Appointment {} deleted by administrator", appointment_id);
        dispatch(&self.notifier, NotificationKind::AppointmentDeleted, appointment_payload(&appointment));
        Ok(())
    }

    pub async fn dashboard(&self, actor: &ActingUser, today: NaiveDate) -> Result<DashboardMetrics, AppointmentError> {
        access::authorize_staff(actor, "view the dashboard")?;

        let filter = access::scope_filter(actor, AppointmentFilter::default())?;
        let (appointments, patients) = futures::try_join!(
            self.call(self.store.list_appointments(&filter)),
            self.call(self.store.list_patients()),
        )?;

        Ok(DashboardMetrics::compute(&appointments, &patients, today))
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
