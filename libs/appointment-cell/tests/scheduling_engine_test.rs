use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::conflict::{ConflictDetectionService, SlotCandidate};
use appointment_cell::services::notification::{NotificationError, NotificationKind, Notifier, TracingNotifier};
use appointment_cell::services::time_utils::{overlaps, ClockTime};
use appointment_cell::{AppointmentBookingService, ClinicStore, InMemoryStore, SchedulingRules, StoreError};

// ==============================================================================
// FIXTURES
// ==============================================================================

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
}

fn sunday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

fn at(time: &str) -> ClockTime {
    time.parse().unwrap()
}

fn patient(name: &str) -> Patient {
    Patient {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: None,
        phone: None,
        birth_date: None,
        cpf: None,
        address: None,
        notes: None,
        created_at: Utc::now(),
    }
}

fn professional(name: &str) -> Professional {
    Professional {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: None,
        phone: None,
        specialty: "Fisioterapia".to_string(),
        color: "#10b981".to_string(),
        working_hours: (1..=5)
            .map(|day| WorkingHours { day_of_week: day, start: at("08:00"), end: at("18:00") })
            .collect(),
        created_at: Utc::now(),
    }
}

fn service(duration: u32, price: f64, professional_ids: Vec<Uuid>) -> Service {
    Service {
        id: Uuid::new_v4(),
        name: format!("Sessão de {} minutos", duration),
        description: None,
        duration,
        price,
        category: "Reabilitação".to_string(),
        professional_ids,
        created_at: Utc::now(),
    }
}

struct Clinic {
    booking: AppointmentBookingService,
    store: Arc<InMemoryStore>,
    patient: Patient,
    professional: Professional,
    service: Service,
}

impl Clinic {
    async fn new() -> Self {
        Self::with(SchedulingRules::default(), Arc::new(TracingNotifier)).await
    }

    async fn with(rules: SchedulingRules, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let patient = store.insert_patient(patient("Ana Souza")).await.unwrap();
        let professional = store.insert_professional(professional("Dra. Helena")).await.unwrap();
        let service = store
            .insert_service(service(30, 120.0, vec![professional.id]))
            .await
            .unwrap();

        let booking = AppointmentBookingService::new(store.clone(), notifier, rules);
        Self { booking, store, patient, professional, service }
    }

    fn request(&self, date: NaiveDate, start: &str) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: self.patient.id,
            professional_id: self.professional.id,
            service_id: self.service.id,
            date,
            start_time: at(start),
            notes: None,
        }
    }

    async fn book(&self, start: &str) -> Result<Appointment, AppointmentError> {
        self.booking
            .create_appointment(&ActingUser::admin(), self.request(monday(), start))
            .await
    }

    /// Second professional who also performs the clinic's service.
    async fn colleague(&self) -> Professional {
        let colleague = self.store.insert_professional(professional("Dr. Paulo")).await.unwrap();
        let mut service = self.service.clone();
        service.professional_ids.push(colleague.id);
        self.store.update_service(service).await.unwrap();
        colleague
    }

    async fn set_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment, AppointmentError> {
        self.booking
            .change_status(&ActingUser::admin(), id, ChangeStatusRequest { status })
            .await
    }
}

fn move_to(date: NaiveDate, start: &str) -> RescheduleAppointmentRequest {
    RescheduleAppointmentRequest {
        date,
        start_time: at(start),
        professional_id: None,
        service_id: None,
    }
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn booking_derives_end_time_and_price_from_service() {
    let clinic = Clinic::new().await;

    let appointment = clinic.book("14:00").await.unwrap();

    assert_eq!(appointment.start_time, at("14:00"));
    assert_eq!(appointment.end_time, at("14:30"));
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.total_value, Some(120.0));
}

#[tokio::test]
async fn back_to_back_appointments_are_allowed() {
    let clinic = Clinic::new().await;

    clinic.book("10:00").await.unwrap();
    clinic.book("10:30").await.unwrap();

    let calendar = clinic
        .store
        .list_appointments(&AppointmentFilter::calendar(clinic.professional.id, monday()))
        .await
        .unwrap();
    assert_eq!(calendar.len(), 2);
}

#[tokio::test]
async fn exact_overlap_is_rejected() {
    let clinic = Clinic::new().await;

    let first = clinic.book("09:00").await.unwrap();
    let second = clinic.book("09:00").await;

    assert_matches!(
        second,
        Err(AppointmentError::Conflict(ConflictReason::Overlap { appointment_id, .. })) if appointment_id == first.id
    );
}

#[tokio::test]
async fn cancelled_slots_can_be_booked_again() {
    let clinic = Clinic::new().await;

    let first = clinic.book("09:00").await.unwrap();
    clinic.set_status(first.id, AppointmentStatus::Cancelled).await.unwrap();

    assert!(clinic.book("09:00").await.is_ok());
}

#[tokio::test]
async fn working_hours_boundary_is_enforced() {
    let clinic = Clinic::new().await;

    assert_matches!(
        clinic.book("17:45").await,
        Err(AppointmentError::Conflict(ConflictReason::OutsideWorkingHours { window: Some(_), .. }))
    );
    assert!(clinic.book("17:30").await.is_ok());
}

#[tokio::test]
async fn days_without_working_hours_are_closed() {
    let clinic = Clinic::new().await;

    let result = clinic
        .booking
        .create_appointment(&ActingUser::admin(), clinic.request(sunday(), "10:00"))
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::Conflict(ConflictReason::OutsideWorkingHours { window: None, .. }))
    );
}

#[tokio::test]
async fn working_hours_can_be_relaxed_by_configuration() {
    let rules = SchedulingRules { enforce_working_hours: false, ..SchedulingRules::default() };
    let clinic = Clinic::with(rules, Arc::new(TracingNotifier)).await;

    assert!(clinic.book("07:00").await.is_ok());
}

#[tokio::test]
async fn professional_must_perform_the_service() {
    let clinic = Clinic::new().await;
    let other = clinic.store.insert_professional(professional("Dr. Paulo")).await.unwrap();

    let mut request = clinic.request(monday(), "09:00");
    request.professional_id = other.id;

    assert_matches!(
        clinic.booking.create_appointment(&ActingUser::admin(), request).await,
        Err(AppointmentError::Validation { field: "professional_id", .. })
    );
}

#[tokio::test]
async fn unknown_references_are_not_found() {
    let clinic = Clinic::new().await;

    let mut request = clinic.request(monday(), "09:00");
    request.service_id = Uuid::new_v4();

    assert_matches!(
        clinic.booking.create_appointment(&ActingUser::admin(), request).await,
        Err(AppointmentError::NotFound { entity: "Service", .. })
    );
}

#[tokio::test]
async fn bookings_crossing_midnight_are_refused() {
    let rules = SchedulingRules { enforce_working_hours: false, ..SchedulingRules::default() };
    let clinic = Clinic::with(rules, Arc::new(TracingNotifier)).await;

    assert_matches!(
        clinic.book("23:45").await,
        Err(AppointmentError::Validation { field: "start_time", .. })
    );
}

#[tokio::test]
async fn concurrent_bookings_for_one_slot_admit_a_single_winner() {
    let clinic = Arc::new(Clinic::new().await);

    let attempts = (0..8).map(|_| {
        let clinic = clinic.clone();
        async move { clinic.book("11:00").await }
    });
    let results = futures::future::join_all(attempts).await;

    let booked = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(booked, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(result, Err(AppointmentError::Conflict(_)));
    }
}

#[tokio::test]
async fn concurrent_bookings_across_tasks_admit_a_single_winner() {
    let clinic = Arc::new(Clinic::new().await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let clinic = clinic.clone();
            tokio::spawn(async move { clinic.book("15:00").await })
        })
        .collect();

    let mut booked = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            booked += 1;
        }
    }
    assert_eq!(booked, 1);
}

// ==============================================================================
// NO DOUBLE-BOOKING PROPERTY
// ==============================================================================

fn random_slot(rng: &mut StdRng) -> (ClockTime, ClockTime) {
    let start = rng.gen_range(8 * 60..17 * 60);
    let length = rng.gen_range(5..=90);
    let end = (start + length).min(18 * 60);
    (ClockTime::from_minutes(start).unwrap(), ClockTime::from_minutes(end).unwrap())
}

fn occupying(professional_id: Uuid, start: ClockTime, end: ClockTime) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        professional_id,
        service_id: Uuid::new_v4(),
        date: monday(),
        start_time: start,
        end_time: end,
        status: AppointmentStatus::Scheduled,
        notes: None,
        total_value: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn detector_rejects_every_synthetic_overlap() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let detector = ConflictDetectionService::new(false);
    let professional_id = Uuid::new_v4();

    for _ in 0..200 {
        let existing: Vec<Appointment> = (0..rng.gen_range(1..6))
            .map(|_| {
                let (start, end) = random_slot(&mut rng);
                occupying(professional_id, start, end)
            })
            .collect();

        // Any candidate sharing at least one minute with a booked interval.
        let target = &existing[rng.gen_range(0..existing.len())];
        let inside = rng.gen_range(target.start_time.minutes_since_midnight()..target.end_time.minutes_since_midnight());
        let start = inside.saturating_sub(rng.gen_range(0..30)).max(8 * 60);
        let end = (inside + rng.gen_range(1..30)).min(18 * 60);

        let candidate = SlotCandidate {
            professional_id,
            date: monday(),
            start_time: ClockTime::from_minutes(start).unwrap(),
            end_time: ClockTime::from_minutes(end).unwrap(),
            exclude_appointment_id: None,
        };

        assert_matches!(
            detector.can_book(&candidate, &existing, &[]),
            Err(ConflictReason::Overlap { .. })
        );
    }
}

#[tokio::test]
async fn random_booking_sequences_never_double_book() {
    let mut rng = StdRng::seed_from_u64(42);
    let clinic = Clinic::new().await;
    let durations = [15, 30, 45, 60];

    let mut services = Vec::new();
    for duration in durations {
        let service = service(duration, 90.0, vec![clinic.professional.id]);
        services.push(clinic.store.insert_service(service).await.unwrap());
    }

    for _ in 0..150 {
        let service = &services[rng.gen_range(0..services.len())];
        let minutes = rng.gen_range(8 * 12..18 * 12) * 5;
        let request = CreateAppointmentRequest {
            service_id: service.id,
            start_time: ClockTime::from_minutes(minutes).unwrap(),
            ..clinic.request(monday(), "08:00")
        };

        match clinic.booking.create_appointment(&ActingUser::admin(), request).await {
            Ok(appointment) if rng.gen_bool(0.2) => {
                clinic.set_status(appointment.id, AppointmentStatus::Cancelled).await.unwrap();
            }
            Ok(_) => {}
            Err(e) => assert_matches!(e, AppointmentError::Conflict(_)),
        }
    }

    let calendar: Vec<Appointment> = clinic
        .store
        .list_appointments(&AppointmentFilter::calendar(clinic.professional.id, monday()))
        .await
        .unwrap()
        .into_iter()
        .filter(Appointment::is_occupying)
        .collect();

    assert!(!calendar.is_empty());
    for (i, a) in calendar.iter().enumerate() {
        for b in &calendar[i + 1..] {
            assert!(
                !overlaps(a.start_time, a.end_time, b.start_time, b.end_time),
                "{}-{} overlaps {}-{}",
                a.start_time,
                a.end_time,
                b.start_time,
                b.end_time
            );
        }
    }
}

// ==============================================================================
// RESCHEDULING
// ==============================================================================

#[tokio::test]
async fn reschedule_does_not_conflict_with_itself() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();

    let moved = clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), appointment.id, move_to(monday(), "09:15"))
        .await
        .unwrap();

    assert_eq!(moved.id, appointment.id);
    assert_eq!(moved.start_time, at("09:15"));
    assert_eq!(moved.end_time, at("09:45"));
}

#[tokio::test]
async fn reschedule_onto_another_booking_conflicts() {
    let clinic = Clinic::new().await;
    let first = clinic.book("09:00").await.unwrap();
    let second = clinic.book("10:00").await.unwrap();

    let result = clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), second.id, move_to(monday(), "09:15"))
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::Conflict(ConflictReason::Overlap { appointment_id, .. })) if appointment_id == first.id
    );
    let unchanged = clinic.booking.get_appointment(&ActingUser::admin(), second.id).await.unwrap();
    assert_eq!(unchanged.start_time, at("10:00"));
}

#[tokio::test]
async fn reschedule_to_another_day_frees_the_original_slot() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();
    let tuesday = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();

    clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), appointment.id, move_to(tuesday, "09:00"))
        .await
        .unwrap();

    assert!(clinic.book("09:00").await.is_ok());
}

#[tokio::test]
async fn reschedule_to_another_professional_checks_their_calendar() {
    let clinic = Clinic::new().await;
    let colleague = clinic.colleague().await;
    let appointment = clinic.book("09:00").await.unwrap();

    let busy = clinic
        .booking
        .create_appointment(
            &ActingUser::admin(),
            CreateAppointmentRequest {
                professional_id: colleague.id,
                ..clinic.request(monday(), "10:00")
            },
        )
        .await
        .unwrap();

    let request = RescheduleAppointmentRequest {
        professional_id: Some(colleague.id),
        ..move_to(monday(), "10:15")
    };
    let result = clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), appointment.id, request)
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::Conflict(ConflictReason::Overlap { appointment_id, .. })) if appointment_id == busy.id
    );
}

#[tokio::test]
async fn reschedule_to_an_ineligible_professional_is_refused() {
    let clinic = Clinic::new().await;
    let outsider = clinic.store.insert_professional(professional("Dra. Marta")).await.unwrap();
    let appointment = clinic.book("09:00").await.unwrap();

    let request = RescheduleAppointmentRequest {
        professional_id: Some(outsider.id),
        ..move_to(monday(), "11:00")
    };
    let result = clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), appointment.id, request)
        .await;

    assert_matches!(result, Err(AppointmentError::Validation { field: "professional_id", .. }));
    let unchanged = clinic.booking.get_appointment(&ActingUser::admin(), appointment.id).await.unwrap();
    assert_eq!(unchanged.professional_id, clinic.professional.id);
    assert_eq!(unchanged.start_time, at("09:00"));
}

#[tokio::test]
async fn moving_to_another_professional_frees_the_original_calendar() {
    let clinic = Clinic::new().await;
    let colleague = clinic.colleague().await;
    let appointment = clinic.book("09:00").await.unwrap();

    let request = RescheduleAppointmentRequest {
        professional_id: Some(colleague.id),
        ..move_to(monday(), "09:00")
    };
    let moved = clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), appointment.id, request)
        .await
        .unwrap();

    assert_eq!(moved.professional_id, colleague.id);
    assert_eq!(moved.total_value, appointment.total_value);
    assert!(clinic.book("09:00").await.is_ok());

    let colleague_day = clinic
        .store
        .list_appointments(&AppointmentFilter::calendar(colleague.id, monday()))
        .await
        .unwrap();
    assert_eq!(colleague_day.len(), 1);
    assert_eq!(colleague_day[0].id, appointment.id);
}

#[tokio::test]
async fn locked_professionals_cannot_move_appointments_to_a_colleague() {
    let clinic = Clinic::new().await;
    let colleague = clinic.colleague().await;
    let appointment = clinic.book("09:00").await.unwrap();

    let request = RescheduleAppointmentRequest {
        professional_id: Some(colleague.id),
        ..move_to(monday(), "09:00")
    };
    let result = clinic
        .booking
        .reschedule_appointment(&ActingUser::professional(clinic.professional.id), appointment.id, request)
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));
}

#[tokio::test]
async fn closed_appointments_cannot_be_rescheduled() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();
    clinic.set_status(appointment.id, AppointmentStatus::Cancelled).await.unwrap();

    let result = clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), appointment.id, move_to(monday(), "10:00"))
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::AppointmentClosed { status: AppointmentStatus::Cancelled })
    );
}

#[tokio::test]
async fn changing_service_reprices_the_appointment() {
    let clinic = Clinic::new().await;
    let longer = clinic
        .store
        .insert_service(service(60, 200.0, vec![clinic.professional.id]))
        .await
        .unwrap();
    let appointment = clinic.book("09:00").await.unwrap();

    let request = RescheduleAppointmentRequest {
        service_id: Some(longer.id),
        ..move_to(monday(), "09:00")
    };
    let moved = clinic
        .booking
        .reschedule_appointment(&ActingUser::admin(), appointment.id, request)
        .await
        .unwrap();

    assert_eq!(moved.end_time, at("10:00"));
    assert_eq!(moved.total_value, Some(200.0));
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

#[tokio::test]
async fn lifecycle_follows_the_transition_table() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();

    assert_matches!(
        clinic.set_status(appointment.id, AppointmentStatus::Completed).await,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Scheduled,
            to: AppointmentStatus::Completed
        })
    );

    clinic.set_status(appointment.id, AppointmentStatus::Confirmed).await.unwrap();
    clinic.set_status(appointment.id, AppointmentStatus::Completed).await.unwrap();

    assert_matches!(
        clinic.set_status(appointment.id, AppointmentStatus::Confirmed).await,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Confirmed
        })
    );
}

#[tokio::test]
async fn completion_falls_back_to_service_price() {
    let clinic = Clinic::new().await;
    let mut legacy = occupying(clinic.professional.id, at("09:00"), at("09:30"));
    legacy.patient_id = clinic.patient.id;
    legacy.service_id = clinic.service.id;
    legacy.status = AppointmentStatus::Confirmed;
    let legacy = clinic.store.insert_appointment(legacy).await.unwrap();

    let completed = clinic.set_status(legacy.id, AppointmentStatus::Completed).await.unwrap();

    assert_eq!(completed.total_value, Some(120.0));
}

// ==============================================================================
// ROLE SCOPES
// ==============================================================================

#[tokio::test]
async fn patients_book_and_cancel_only_their_own_appointments() {
    let clinic = Clinic::new().await;
    let stranger = clinic.store.insert_patient(patient("Bruno Lima")).await.unwrap();
    let own = ActingUser::patient(clinic.patient.id);
    let other = ActingUser::patient(stranger.id);

    let appointment = clinic
        .booking
        .create_appointment(&own, clinic.request(monday(), "09:00"))
        .await
        .unwrap();

    assert_matches!(
        clinic.booking.create_appointment(&other, clinic.request(monday(), "10:00")).await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        clinic
            .booking
            .change_status(&other, appointment.id, ChangeStatusRequest { status: AppointmentStatus::Cancelled })
            .await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        clinic
            .booking
            .change_status(&own, appointment.id, ChangeStatusRequest { status: AppointmentStatus::Confirmed })
            .await,
        Err(AppointmentError::Unauthorized(_))
    );

    let cancelled = clinic
        .booking
        .change_status(&own, appointment.id, ChangeStatusRequest { status: AppointmentStatus::Cancelled })
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn locked_professionals_stay_on_their_calendar() {
    let clinic = Clinic::new().await;
    let colleague = clinic.store.insert_professional(professional("Dr. Paulo")).await.unwrap();
    let actor = ActingUser::professional(colleague.id);

    assert_matches!(
        clinic.booking.create_appointment(&actor, clinic.request(monday(), "09:00")).await,
        Err(AppointmentError::Unauthorized(_))
    );

    clinic.book("09:00").await.unwrap();
    let visible = clinic
        .booking
        .list_appointments(&actor, AppointmentFilter::default())
        .await
        .unwrap();
    assert!(visible.is_empty());
}

#[tokio::test]
async fn only_admins_delete_appointments() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();

    assert_matches!(
        clinic
            .booking
            .delete_appointment(&ActingUser::professional(clinic.professional.id), appointment.id)
            .await,
        Err(AppointmentError::Unauthorized(_))
    );

    clinic.booking.delete_appointment(&ActingUser::admin(), appointment.id).await.unwrap();
    assert_matches!(
        clinic.booking.get_appointment(&ActingUser::admin(), appointment.id).await,
        Err(AppointmentError::NotFound { entity: "Appointment", .. })
    );
}

// ==============================================================================
// READS
// ==============================================================================

#[tokio::test]
async fn availability_excludes_booked_time() {
    let clinic = Clinic::new().await;
    clinic.book("09:00").await.unwrap();
    clinic.book("09:30").await.unwrap();

    let availability = clinic
        .booking
        .list_availability(clinic.professional.id, monday())
        .await
        .unwrap();
    let free: Vec<FreeInterval> = availability.iter().collect();

    assert_eq!(
        free,
        vec![
            FreeInterval { start: at("08:00"), end: at("09:00") },
            FreeInterval { start: at("10:00"), end: at("18:00") },
        ]
    );
}

#[tokio::test]
async fn details_join_the_referenced_records() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();

    let details = clinic
        .booking
        .get_appointment_with_details(&ActingUser::admin(), appointment.id)
        .await
        .unwrap();

    assert_eq!(details.patient.name, "Ana Souza");
    assert_eq!(details.professional.id, clinic.professional.id);
    assert_eq!(details.service.duration, 30);
}

#[tokio::test]
async fn notes_are_trimmed_and_cleared() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();

    let updated = clinic
        .booking
        .update_notes(&ActingUser::admin(), appointment.id, Some("  trazer exames ".to_string()))
        .await
        .unwrap();
    assert_eq!(updated.notes.as_deref(), Some("trazer exames"));
    assert_eq!(updated.start_time, appointment.start_time);

    let cleared = clinic
        .booking
        .update_notes(&ActingUser::admin(), appointment.id, None)
        .await
        .unwrap();
    assert_eq!(cleared.notes, None);
}

#[tokio::test]
async fn dashboard_is_staff_only() {
    let clinic = Clinic::new().await;
    let appointment = clinic.book("09:00").await.unwrap();
    clinic.set_status(appointment.id, AppointmentStatus::Confirmed).await.unwrap();
    clinic.set_status(appointment.id, AppointmentStatus::Completed).await.unwrap();

    let metrics = clinic.booking.dashboard(&ActingUser::admin(), monday()).await.unwrap();
    assert_eq!(metrics.appointments_today, 1);
    assert_eq!(metrics.completed_appointments, 1);
    assert_eq!(metrics.monthly_revenue, 120.0);

    assert_matches!(
        clinic.booking.dashboard(&ActingUser::patient(clinic.patient.id), monday()).await,
        Err(AppointmentError::Unauthorized(_))
    );
}

// ==============================================================================
// NOTIFICATIONS & STORAGE FAILURES
// ==============================================================================

struct ChannelNotifier(mpsc::UnboundedSender<(NotificationKind, Value)>);

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, kind: NotificationKind, payload: Value) -> Result<(), NotificationError> {
        self.0
            .send((kind, payload))
            .map_err(|e| NotificationError::Delivery(e.to_string()))
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _kind: NotificationKind, _payload: Value) -> Result<(), NotificationError> {
        Err(NotificationError::Rejected(500))
    }
}

#[tokio::test]
async fn writes_emit_notifications() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let clinic = Clinic::with(SchedulingRules::default(), Arc::new(ChannelNotifier(tx))).await;

    let appointment = clinic.book("09:00").await.unwrap();
    let (kind, payload) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kind, NotificationKind::AppointmentBooked);
    assert_eq!(payload["appointment_id"], appointment.id.to_string());
    assert_eq!(payload["start_time"], "09:00");

    clinic.set_status(appointment.id, AppointmentStatus::Cancelled).await.unwrap();
    let (kind, payload) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kind, NotificationKind::AppointmentStatusChanged);
    assert_eq!(payload["status"], "cancelado");
}

#[tokio::test]
async fn notification_failures_do_not_fail_the_booking() {
    let clinic = Clinic::with(SchedulingRules::default(), Arc::new(FailingNotifier)).await;
    assert!(clinic.book("09:00").await.is_ok());
}

/// Store whose appointment listing never answers in time.
struct SlowStore {
    inner: InMemoryStore,
    delay: Duration,
}

#[async_trait]
impl ClinicStore for SlowStore {
    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_appointments(filter).await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.get_appointment(id).await
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        self.inner.insert_appointment(appointment).await
    }

    async fn update_appointment(&self, id: Uuid, patch: &AppointmentPatch) -> Result<Appointment, StoreError> {
        self.inner.update_appointment(id, patch).await
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_appointment(id).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        self.inner.list_patients().await
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        self.inner.get_patient(id).await
    }

    async fn insert_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        self.inner.insert_patient(patient).await
    }

    async fn update_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        self.inner.update_patient(patient).await
    }

    async fn delete_patient(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_patient(id).await
    }

    async fn list_professionals(&self) -> Result<Vec<Professional>, StoreError> {
        self.inner.list_professionals().await
    }

    async fn get_professional(&self, id: Uuid) -> Result<Option<Professional>, StoreError> {
        self.inner.get_professional(id).await
    }

    async fn insert_professional(&self, professional: Professional) -> Result<Professional, StoreError> {
        self.inner.insert_professional(professional).await
    }

    async fn update_professional(&self, professional: Professional) -> Result<Professional, StoreError> {
        self.inner.update_professional(professional).await
    }

    async fn delete_professional(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_professional(id).await
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        self.inner.list_services().await
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        self.inner.get_service(id).await
    }

    async fn insert_service(&self, service: Service) -> Result<Service, StoreError> {
        self.inner.insert_service(service).await
    }

    async fn update_service(&self, service: Service) -> Result<Service, StoreError> {
        self.inner.update_service(service).await
    }

    async fn delete_service(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_service(id).await
    }
}

#[tokio::test]
async fn slow_storage_surfaces_a_timeout_and_writes_nothing() {
    let store = Arc::new(SlowStore { inner: InMemoryStore::new(), delay: Duration::from_millis(500) });
    let patient = store.insert_patient(patient("Ana Souza")).await.unwrap();
    let professional = store.insert_professional(professional("Dra. Helena")).await.unwrap();
    let service = store.insert_service(service(30, 120.0, vec![professional.id])).await.unwrap();

    let rules = SchedulingRules { storage_timeout: Duration::from_millis(50), ..SchedulingRules::default() };
    let booking = AppointmentBookingService::new(store.clone(), Arc::new(TracingNotifier), rules);

    let request = CreateAppointmentRequest {
        patient_id: patient.id,
        professional_id: professional.id,
        service_id: service.id,
        date: monday(),
        start_time: at("09:00"),
        notes: None,
    };
    let err = booking.create_appointment(&ActingUser::admin(), request).await.unwrap_err();

    assert_matches!(err, AppointmentError::StorageTimeout { after_ms: 50 });
    assert!(err.is_retryable());
    let stored = store.inner.list_appointments(&AppointmentFilter::default()).await.unwrap();
    assert!(stored.is_empty());
}
