// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    ActingUser, AppointmentError, AppointmentFilter, ChangeStatusRequest, CreateAppointmentRequest,
    CreatePatientRequest, CreateProfessionalRequest, CreateServiceRequest, RescheduleAppointmentRequest,
    UpdateNotesRequest, UpdatePatientRequest, UpdateProfessionalRequest, UpdateServiceRequest,
};
use crate::router::AppointmentCellState;
use crate::services::dashboard::appointments_per_month;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.to_string();
        match err {
            AppointmentError::Validation { .. } => AppError::ValidationError(message),
            AppointmentError::Conflict(_) | AppointmentError::Duplicate(_) => AppError::Conflict(message),
            AppointmentError::InvalidTransition { .. } | AppointmentError::AppointmentClosed { .. } => {
                AppError::Unprocessable(message)
            }
            AppointmentError::NotFound { .. } => AppError::NotFound(message),
            AppointmentError::Unauthorized(_) => AppError::Forbidden(message),
            AppointmentError::StorageFailure(_) | AppointmentError::StorageTimeout { .. } => {
                AppError::ServiceUnavailable(message)
            }
        }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// Only list gaps at least this many minutes long.
    pub duration: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DeletePatientQuery {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub today: Option<NaiveDate>,
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let appointment = state.booking.create_appointment(&actor, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(filter): Query<AppointmentFilter>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let appointments = state.booking.list_appointments(&actor, filter).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let appointment = state.booking.get_appointment(&actor, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment_details(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let details = state.booking.get_appointment_with_details(&actor, appointment_id).await?;
    Ok(Json(json!(details)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let appointment = state.booking.reschedule_appointment(&actor, appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn change_status(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let appointment = state.booking.change_status(&actor, appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn update_notes(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let appointment = state.booking.update_notes(&actor, appointment_id, request.notes).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    state.booking.delete_appointment(&actor, appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted"
    })))
}

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppointmentCellState>>,
    Path((professional_id, date)): Path<(Uuid, NaiveDate)>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let availability = state.booking.list_availability(professional_id, date).await?;
    let free: Vec<_> = match query.duration {
        Some(minutes) => availability.gaps_fitting(minutes).collect(),
        None => availability.iter().collect(),
    };

    Ok(Json(json!({
        "professional_id": professional_id,
        "date": date,
        "working_hours": availability.window.map(|(start, end)| json!({"start": start, "end": end})),
        "free_intervals": free
    })))
}

#[axum::debug_handler]
pub async fn get_dashboard(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = ActingUser::from_user(&user);
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());

    let metrics = state.booking.dashboard(&actor, today).await?;
    let filter = AppointmentFilter {
        date_from: NaiveDate::from_ymd_opt(today.year(), 1, 1),
        date_to: NaiveDate::from_ymd_opt(today.year(), 12, 31),
        ..AppointmentFilter::default()
    };
    let this_year = state.booking.list_appointments(&actor, filter).await?;

    Ok(Json(json!({
        "metrics": metrics,
        "appointments_per_month": appointments_per_month(&this_year, today.year())
    })))
}

// ==============================================================================
// DIRECTORY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patients = state.directory.list_patients(&ActingUser::from_user(&user)).await?;
    Ok(Json(json!({ "patients": patients, "total": patients.len() })))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = state.directory.create_patient(&ActingUser::from_user(&user), request).await?;
    Ok(Json(json!({ "success": true, "patient": patient })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let patient = state.directory.get_patient(&ActingUser::from_user(&user), patient_id).await?;
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = state
        .directory
        .update_patient(&ActingUser::from_user(&user), patient_id, request)
        .await?;
    Ok(Json(json!({ "success": true, "patient": patient })))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<DeletePatientQuery>,
) -> Result<Json<Value>, AppError> {
    state
        .directory
        .delete_patient(&ActingUser::from_user(&user), patient_id, query.cascade)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Patient deleted" })))
}

#[axum::debug_handler]
pub async fn list_professionals(State(state): State<Arc<AppointmentCellState>>) -> Result<Json<Value>, AppError> {
    let professionals = state.directory.list_professionals().await?;
    Ok(Json(json!({ "professionals": professionals, "total": professionals.len() })))
}

#[axum::debug_handler]
pub async fn create_professional(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateProfessionalRequest>,
) -> Result<Json<Value>, AppError> {
    let professional = state
        .directory
        .create_professional(&ActingUser::from_user(&user), request)
        .await?;
    Ok(Json(json!({ "success": true, "professional": professional })))
}

#[axum::debug_handler]
pub async fn get_professional(
    State(state): State<Arc<AppointmentCellState>>,
    Path(professional_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let professional = state.directory.get_professional(professional_id).await?;
    Ok(Json(json!(professional)))
}

#[axum::debug_handler]
pub async fn update_professional(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(professional_id): Path<Uuid>,
    Json(request): Json<UpdateProfessionalRequest>,
) -> Result<Json<Value>, AppError> {
    let professional = state
        .directory
        .update_professional(&ActingUser::from_user(&user), professional_id, request)
        .await?;
    Ok(Json(json!({ "success": true, "professional": professional })))
}

#[axum::debug_handler]
pub async fn delete_professional(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(professional_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state
        .directory
        .delete_professional(&ActingUser::from_user(&user), professional_id)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Professional deleted" })))
}

#[axum::debug_handler]
pub async fn list_services(State(state): State<Arc<AppointmentCellState>>) -> Result<Json<Value>, AppError> {
    let services = state.directory.list_services().await?;
    Ok(Json(json!({ "services": services, "total": services.len() })))
}

#[axum::debug_handler]
pub async fn create_service(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<Json<Value>, AppError> {
    let service = state.directory.create_service(&ActingUser::from_user(&user), request).await?;
    Ok(Json(json!({ "success": true, "service": service })))
}

#[axum::debug_handler]
pub async fn get_service(
    State(state): State<Arc<AppointmentCellState>>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = state.directory.get_service(service_id).await?;
    Ok(Json(json!(service)))
}

#[axum::debug_handler]
pub async fn update_service(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(service_id): Path<Uuid>,
    Json(request): Json<UpdateServiceRequest>,
) -> Result<Json<Value>, AppError> {
    let service = state
        .directory
        .update_service(&ActingUser::from_user(&user), service_id, request)
        .await?;
    Ok(Json(json!({ "success": true, "service": service })))
}

#[axum::debug_handler]
pub async fn delete_service(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state
        .directory
        .delete_service(&ActingUser::from_user(&user), service_id)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Service deleted" })))
}
