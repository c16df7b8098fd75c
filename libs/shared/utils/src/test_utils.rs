use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Config pointing at a mock PostgREST server.
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            storage_timeout_ms: 2_000,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub metadata: Option<Value>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", UserRole::Patient)
    }
}

impl TestUser {
    pub fn new(email: &str, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role,
            metadata: None,
        }
    }

    pub fn professional(email: &str) -> Self {
        Self::new(email, UserRole::Professional)
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, UserRole::Patient)
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, UserRole::Admin)
    }

    /// Professional whose calendar is locked to `professional_id`.
    pub fn professional_for(email: &str, professional_id: Uuid) -> Self {
        Self::professional(email).with_metadata(json!({ "professional_id": professional_id }))
    }

    /// Patient acting on behalf of the clinic patient record `patient_id`.
    pub fn patient_for(email: &str, patient_id: Uuid) -> Self {
        Self::patient(email).with_metadata(json!({ "patient_id": patient_id }))
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: self.role,
            metadata: self.metadata.clone(),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "user_metadata": user.metadata.clone().unwrap_or_else(|| json!({})),
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// PostgREST rows in the inconsistent column naming found in the clinic tables.
pub struct MockClinicRows;

impl MockClinicRows {
    pub fn patient_row(id: Uuid, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "email": format!("{}@patients.test", name.to_lowercase().replace(' ', ".")),
            "phone": "+55 11 90000-0000",
            "birth_date": "1990-04-12",
            "cpf": "000.000.000-00",
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    /// Professional working Monday to Friday in the given window.
    pub fn professional_row(id: Uuid, start: &str, end: &str) -> Value {
        let working_hours: Vec<Value> = (1..=5)
            .map(|day| json!({ "dayOfWeek": day, "start": start, "end": end }))
            .collect();

        json!({
            "id": id,
            "name": "Dra. Helena Costa",
            "mail": "helena@clinic.test",
            "service": "Fisioterapia",
            "color": "#10b981",
            "working_hours": working_hours,
            "createdAt": "2025-01-01T00:00:00Z"
        })
    }

    pub fn service_row(id: Uuid, duration: u32, price: f64, professional_ids: &[Uuid]) -> Value {
        json!({
            "id": id,
            "name": "Sessão de fisioterapia",
            "duration_minutes": duration,
            "price": price,
            "category": "Reabilitação",
            "profissionais_id": professional_ids,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        id: Uuid,
        patient_id: Uuid,
        professional_id: Uuid,
        service_id: Uuid,
        date: &str,
        start: &str,
        end: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "professional_id": professional_id,
            "service_id": service_id,
            "date": date,
            "start_time": start,
            "end_time": end,
            "status": status,
            "notes": null,
            "total_value": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
