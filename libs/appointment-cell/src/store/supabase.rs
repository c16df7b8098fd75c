// libs/appointment-cell/src/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AppointmentFilter, AppointmentPatch, AppointmentStatus, Patient, Professional, Service,
    WorkingHours,
};
use crate::services::time_utils::ClockTime;
use crate::store::{ClinicStore, StoreError};

const DEFAULT_SERVICE_DURATION: u32 = 30;
const DEFAULT_PROFESSIONAL_COLOR: &str = "#3b82f6";

// ==============================================================================
// ROW SHAPES
// ==============================================================================
//
// Rows written by different versions of the clinic front-end disagree on
// column names, and one table may carry several spellings side by side. Every
// spelling is its own field; the first one holding a value wins when the row
// is normalized into the strict model.

#[derive(Debug, Deserialize)]
struct AppointmentRow {
    id: Uuid,
    patient_id: Option<Uuid>,
    #[serde(rename = "patientId")]
    patient_id_camel: Option<Uuid>,
    professional_id: Option<Uuid>,
    #[serde(rename = "professionalId")]
    professional_id_camel: Option<Uuid>,
    service_id: Option<Uuid>,
    #[serde(rename = "serviceId")]
    service_id_camel: Option<Uuid>,
    date: String,
    start_time: Option<String>,
    #[serde(rename = "startTime")]
    start_time_camel: Option<String>,
    start: Option<String>,
    end_time: Option<String>,
    #[serde(rename = "endTime")]
    end_time_camel: Option<String>,
    end: Option<String>,
    status: Option<String>,
    notes: Option<String>,
    total_value: Option<f64>,
    #[serde(rename = "totalValue")]
    total_value_camel: Option<f64>,
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    created_at_camel: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt")]
    updated_at_camel: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PatientRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    mail: Option<String>,
    phone: Option<String>,
    birth_date: Option<String>,
    #[serde(rename = "birthDate")]
    birth_date_camel: Option<String>,
    cpf: Option<String>,
    address: Option<String>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    created_at_camel: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ProfessionalRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    mail: Option<String>,
    phone: Option<String>,
    specialty: Option<String>,
    service: Option<String>,
    color: Option<String>,
    working_hours: Option<Value>,
    #[serde(rename = "workingHours")]
    working_hours_camel: Option<Value>,
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    created_at_camel: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ServiceRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    desc: Option<String>,
    duration: Option<u32>,
    duration_minutes: Option<u32>,
    price: Option<f64>,
    category: Option<String>,
    profissionais_id: Option<Vec<Uuid>>,
    professional_ids: Option<Vec<Uuid>>,
    professionals_id: Option<Vec<Uuid>>,
    #[serde(rename = "professionalIds")]
    professional_ids_camel: Option<Vec<Uuid>>,
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    created_at_camel: Option<DateTime<Utc>>,
}

/// Drops blank text so the next spelling of the column is tried.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required<T>(id: Uuid, column: &str, value: Option<T>) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::Decode(format!("row {} has no {}", id, column)))
}

/// `HH:MM`, `HH:MM:SS`, or a timestamp whose time part is used.
fn parse_clock(column: &str, raw: &str) -> Result<ClockTime, StoreError> {
    let time_part = raw.split_once('T').map_or(raw, |(_, time)| time);
    let time_part = time_part.get(..5).unwrap_or(time_part);
    time_part
        .parse()
        .map_err(|_| StoreError::Decode(format!("{} '{}' is not a time of day", column, raw)))
}

fn parse_date(column: &str, raw: &str) -> Result<NaiveDate, StoreError> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| StoreError::Decode(format!("{} '{}' is not a date", column, raw)))
}

/// Blank status means a fresh booking.
fn parse_status(raw: Option<String>) -> Result<AppointmentStatus, StoreError> {
    match present(raw) {
        None => Ok(AppointmentStatus::Scheduled),
        Some(status) => serde_json::from_value(Value::String(status.trim().to_string()))
            .map_err(|_| StoreError::Decode(format!("status '{}' is not an appointment status", status))),
    }
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let start = present(row.start_time).or(present(row.start_time_camel)).or(present(row.start));
        let end = present(row.end_time).or(present(row.end_time_camel)).or(present(row.end));
        let created_at = row.created_at.or(row.created_at_camel).unwrap_or_else(Utc::now);

        Ok(Appointment {
            id: row.id,
            patient_id: required(row.id, "patient_id", row.patient_id.or(row.patient_id_camel))?,
            professional_id: required(row.id, "professional_id", row.professional_id.or(row.professional_id_camel))?,
            service_id: required(row.id, "service_id", row.service_id.or(row.service_id_camel))?,
            date: parse_date("date", &row.date)?,
            start_time: parse_clock("start_time", &required(row.id, "start_time", start)?)?,
            end_time: parse_clock("end_time", &required(row.id, "end_time", end)?)?,
            status: parse_status(row.status)?,
            notes: present(row.notes),
            total_value: row.total_value.or(row.total_value_camel),
            created_at,
            updated_at: row.updated_at.or(row.updated_at_camel).unwrap_or(created_at),
        })
    }
}

impl TryFrom<PatientRow> for Patient {
    type Error = StoreError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let birth_date = present(row.birth_date)
            .or(present(row.birth_date_camel))
            .map(|raw| parse_date("birth_date", &raw))
            .transpose()?;

        Ok(Patient {
            id: row.id,
            name: row.name,
            email: present(row.email).or(present(row.mail)),
            phone: present(row.phone),
            birth_date,
            cpf: present(row.cpf),
            address: present(row.address),
            notes: present(row.notes),
            created_at: row.created_at.or(row.created_at_camel).unwrap_or_else(Utc::now),
        })
    }
}

fn parse_working_hours(id: Uuid, value: Value) -> Result<Vec<WorkingHours>, StoreError> {
    match value {
        Value::Null => Ok(Vec::new()),
        // Some rows hold the array serialized into a text column.
        Value::String(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| StoreError::Decode(format!("working_hours of {}: {}", id, e))),
        value => serde_json::from_value(value)
            .map_err(|e| StoreError::Decode(format!("working_hours of {}: {}", id, e))),
    }
}

impl TryFrom<ProfessionalRow> for Professional {
    type Error = StoreError;

    fn try_from(row: ProfessionalRow) -> Result<Self, Self::Error> {
        let working_hours = match row.working_hours.filter(|v| !v.is_null()).or(row.working_hours_camel) {
            Some(value) => parse_working_hours(row.id, value)?,
            None => Vec::new(),
        };

        Ok(Professional {
            id: row.id,
            name: row.name,
            email: present(row.email).or(present(row.mail)),
            phone: present(row.phone),
            specialty: present(row.specialty).or(present(row.service)).unwrap_or_default(),
            color: present(row.color).unwrap_or_else(|| DEFAULT_PROFESSIONAL_COLOR.to_string()),
            working_hours,
            created_at: row.created_at.or(row.created_at_camel).unwrap_or_else(Utc::now),
        })
    }
}

impl TryFrom<ServiceRow> for Service {
    type Error = StoreError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        let positive = |minutes: Option<u32>| minutes.filter(|m| *m > 0);
        let duration = positive(row.duration)
            .or(positive(row.duration_minutes))
            .unwrap_or(DEFAULT_SERVICE_DURATION);

        let non_empty = |ids: Option<Vec<Uuid>>| ids.filter(|ids| !ids.is_empty());
        let professional_ids = non_empty(row.profissionais_id)
            .or(non_empty(row.professional_ids))
            .or(non_empty(row.professionals_id))
            .or(non_empty(row.professional_ids_camel))
            .unwrap_or_default();

        Ok(Service {
            id: row.id,
            name: row.name,
            description: present(row.description).or(present(row.desc)),
            duration,
            price: row.price.unwrap_or(0.0),
            category: present(row.category).unwrap_or_default(),
            professional_ids,
            created_at: row.created_at.or(row.created_at_camel).unwrap_or_else(Utc::now),
        })
    }
}

fn decode<R, T>(value: Value) -> Result<T, StoreError>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = StoreError>,
{
    let row: R = serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))?;
    T::try_from(row)
}

fn decode_all<R, T>(rows: Vec<Value>) -> Result<Vec<T>, StoreError>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(decode::<R, T>).collect()
}

// ==============================================================================
// WRITE SHAPES
// ==============================================================================

fn appointment_columns(appointment: &Appointment) -> Value {
    json!({
        "id": appointment.id,
        "patient_id": appointment.patient_id,
        "professional_id": appointment.professional_id,
        "service_id": appointment.service_id,
        "date": appointment.date,
        "start_time": appointment.start_time,
        "end_time": appointment.end_time,
        "status": appointment.status,
        "notes": appointment.notes,
        "total_value": appointment.total_value,
        "created_at": appointment.created_at.to_rfc3339(),
        "updated_at": appointment.updated_at.to_rfc3339(),
    })
}

fn patch_columns(patch: &AppointmentPatch) -> Value {
    let mut columns = Map::new();
    if let Some(id) = patch.professional_id {
        columns.insert("professional_id".to_string(), json!(id));
    }
    if let Some(id) = patch.service_id {
        columns.insert("service_id".to_string(), json!(id));
    }
    if let Some(date) = patch.date {
        columns.insert("date".to_string(), json!(date));
    }
    if let Some(start) = patch.start_time {
        columns.insert("start_time".to_string(), json!(start));
    }
    if let Some(end) = patch.end_time {
        columns.insert("end_time".to_string(), json!(end));
    }
    if let Some(status) = patch.status {
        columns.insert("status".to_string(), json!(status));
    }
    if let Some(notes) = &patch.notes {
        columns.insert("notes".to_string(), json!(notes));
    }
    if let Some(total) = patch.total_value {
        columns.insert("total_value".to_string(), json!(total));
    }
    if let Some(updated_at) = patch.updated_at {
        columns.insert("updated_at".to_string(), json!(updated_at.to_rfc3339()));
    }
    Value::Object(columns)
}

fn patient_columns(patient: &Patient) -> Value {
    json!({
        "id": patient.id,
        "name": patient.name,
        "email": patient.email,
        "phone": patient.phone,
        "birth_date": patient.birth_date,
        "cpf": patient.cpf,
        "address": patient.address,
        "notes": patient.notes,
        "created_at": patient.created_at.to_rfc3339(),
    })
}

fn professional_columns(professional: &Professional) -> Value {
    json!({
        "id": professional.id,
        "name": professional.name,
        "email": professional.email,
        "phone": professional.phone,
        "specialty": professional.specialty,
        "color": professional.color,
        "working_hours": professional.working_hours,
        "created_at": professional.created_at.to_rfc3339(),
    })
}

fn service_columns(service: &Service) -> Value {
    json!({
        "id": service.id,
        "name": service.name,
        "description": service.description,
        "duration_minutes": service.duration,
        "price": service.price,
        "category": service.category,
        "profissionais_id": service.professional_ids,
        "created_at": service.created_at.to_rfc3339(),
    })
}

/// PostgREST query string for an appointment filter, in calendar order.
fn appointment_query(filter: &AppointmentFilter) -> String {
    let mut query_parts = Vec::new();

    if let Some(id) = filter.professional_id {
        query_parts.push(format!("professional_id=eq.{}", id));
    }
    if let Some(id) = filter.patient_id {
        query_parts.push(format!("patient_id=eq.{}", id));
    }
    if let Some(id) = filter.service_id {
        query_parts.push(format!("service_id=eq.{}", id));
    }
    if let Some(status) = filter.status {
        query_parts.push(format!("status=eq.{}", status));
    }
    if let Some(date) = filter.date {
        query_parts.push(format!("date=eq.{}", date));
    }
    if let Some(from) = filter.date_from {
        query_parts.push(format!("date=gte.{}", from));
    }
    if let Some(to) = filter.date_to {
        query_parts.push(format!("date=lte.{}", to));
    }
    query_parts.push("order=date.asc,start_time.asc".to_string());

    format!("/rest/v1/appointments?{}", query_parts.join("&"))
}

// ==============================================================================
// STORE
// ==============================================================================

/// Clinic tables behind Supabase's PostgREST API.
pub struct SupabaseStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn select(&self, path: &str) -> Result<Vec<Value>, StoreError> {
        debug!("Selecting {}", path);
        Ok(self.supabase.request(Method::GET, path, None, None).await?)
    }

    async fn select_one<R, T>(&self, table: &str, id: Uuid) -> Result<Option<T>, StoreError>
    where
        R: DeserializeOwned,
        T: TryFrom<R, Error = StoreError>,
    {
        let path = format!("/rest/v1/{}?id=eq.{}&limit=1", table, id);
        match self.select(&path).await?.into_iter().next() {
            Some(row) => decode::<R, T>(row).map(Some),
            None => Ok(None),
        }
    }

    async fn insert<R, T>(&self, table: &str, body: Value) -> Result<T, StoreError>
    where
        R: DeserializeOwned,
        T: TryFrom<R, Error = StoreError>,
    {
        let path = format!("/rest/v1/{}", table);
        let rows = self.supabase.request_returning(Method::POST, &path, Some(body)).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {} returned no row", table)))?;
        decode::<R, T>(row)
    }

    async fn update<R, T>(&self, table: &str, entity: &'static str, id: Uuid, body: Value) -> Result<T, StoreError>
    where
        R: DeserializeOwned,
        T: TryFrom<R, Error = StoreError>,
    {
        let path = format!("/rest/v1/{}?id=eq.{}", table, id);
        let rows = self.supabase.request_returning(Method::PATCH, &path, Some(body)).await?;
        match rows.into_iter().next() {
            Some(row) => decode::<R, T>(row),
            None => Err(StoreError::NotFound { entity, id }),
        }
    }

    async fn delete(&self, table: &str, entity: &'static str, id: Uuid) -> Result<(), StoreError> {
        let path = format!("/rest/v1/{}?id=eq.{}", table, id);
        let rows = self.supabase.request_returning(Method::DELETE, &path, None).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound { entity, id });
        }
        info!("Deleted {} {}", entity, id);
        Ok(())
    }
}

#[async_trait]
impl ClinicStore for SupabaseStore {
    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let rows = self.select(&appointment_query(filter)).await?;
        decode_all::<AppointmentRow, Appointment>(rows)
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.select_one::<AppointmentRow, Appointment>("appointments", id).await
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        self.insert::<AppointmentRow, Appointment>("appointments", appointment_columns(&appointment))
            .await
    }

    async fn update_appointment(&self, id: Uuid, patch: &AppointmentPatch) -> Result<Appointment, StoreError> {
        self.update::<AppointmentRow, Appointment>("appointments", "Appointment", id, patch_columns(patch))
            .await
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete("appointments", "Appointment", id).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let rows = self.select("/rest/v1/patients?order=name.asc").await?;
        decode_all::<PatientRow, Patient>(rows)
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        self.select_one::<PatientRow, Patient>("patients", id).await
    }

    async fn insert_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        self.insert::<PatientRow, Patient>("patients", patient_columns(&patient)).await
    }

    async fn update_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        self.update::<PatientRow, Patient>("patients", "Patient", patient.id, patient_columns(&patient))
            .await
    }

    async fn delete_patient(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete("patients", "Patient", id).await
    }

    async fn list_professionals(&self) -> Result<Vec<Professional>, StoreError> {
        let rows = self.select("/rest/v1/professionals?order=name.asc").await?;
        decode_all::<ProfessionalRow, Professional>(rows)
    }

    async fn get_professional(&self, id: Uuid) -> Result<Option<Professional>, StoreError> {
        self.select_one::<ProfessionalRow, Professional>("professionals", id).await
    }

    async fn insert_professional(&self, professional: Professional) -> Result<Professional, StoreError> {
        self.insert::<ProfessionalRow, Professional>("professionals", professional_columns(&professional))
            .await
    }

    async fn update_professional(&self, professional: Professional) -> Result<Professional, StoreError> {
        self.update::<ProfessionalRow, Professional>(
            "professionals",
            "Professional",
            professional.id,
            professional_columns(&professional),
        )
        .await
    }

    async fn delete_professional(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete("professionals", "Professional", id).await
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        let rows = self.select("/rest/v1/services?order=name.asc").await?;
        decode_all::<ServiceRow, Service>(rows)
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        self.select_one::<ServiceRow, Service>("services", id).await
    }

    async fn insert_service(&self, service: Service) -> Result<Service, StoreError> {
        self.insert::<ServiceRow, Service>("services", service_columns(&service)).await
    }

    async fn update_service(&self, service: Service) -> Result<Service, StoreError> {
        self.update::<ServiceRow, Service>("services", "Service", service.id, service_columns(&service))
            .await
    }

    async fn delete_service(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete("services", "Service", id).await
    }
}
