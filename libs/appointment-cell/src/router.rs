// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;
use crate::services::directory::ClinicDirectoryService;
use crate::services::notification::Notifier;
use crate::store::ClinicStore;

pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub booking: AppointmentBookingService,
    pub directory: ClinicDirectoryService,
}

impl AppointmentCellState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn ClinicStore>, notifier: Arc<dyn Notifier>) -> Self {
        let booking = AppointmentBookingService::from_config(&config, store.clone(), notifier);
        let directory = ClinicDirectoryService::new(store, config.storage_timeout());
        Self { config, booking, directory }
    }
}

pub fn clinic_routes(state: Arc<AppointmentCellState>) -> Router {
    // Every clinic operation requires authentication
    let protected_routes = Router::new()
        // Scheduling
        .route("/appointments", get(handlers::list_appointments).post(handlers::create_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/appointments/{appointment_id}/details", get(handlers::get_appointment_details))
        .route("/appointments/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/appointments/{appointment_id}/status", patch(handlers::change_status))
        .route("/appointments/{appointment_id}/notes", patch(handlers::update_notes))
        .route("/availability/{professional_id}/{date}", get(handlers::get_availability))
        .route("/dashboard", get(handlers::get_dashboard))

        // Directory
        .route("/patients", get(handlers::list_patients).post(handlers::create_patient))
        .route(
            "/patients/{patient_id}",
            get(handlers::get_patient)
                .put(handlers::update_patient)
                .delete(handlers::delete_patient),
        )
        .route("/professionals", get(handlers::list_professionals).post(handlers::create_professional))
        .route(
            "/professionals/{professional_id}",
            get(handlers::get_professional)
                .put(handlers::update_professional)
                .delete(handlers::delete_professional),
        )
        .route("/services", get(handlers::list_services).post(handlers::create_service))
        .route(
            "/services/{service_id}",
            get(handlers::get_service)
                .put(handlers::update_service)
                .delete(handlers::delete_service),
        )

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
