use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{clinic_routes, AppointmentCellState};

pub fn create_router(state: Arc<AppointmentCellState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .merge(clinic_routes(state))
}
