use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::models::{Patient, Professional, Service, WorkingHours};
use appointment_cell::services::notification::TracingNotifier;
use appointment_cell::{clinic_routes, AppointmentCellState, ClinicStore, InMemoryStore};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    router: Router,
    config: TestConfig,
    patient_id: Uuid,
    professional_id: Uuid,
    service_id: Uuid,
}

impl TestApp {
    async fn new() -> Self {
        let config = TestConfig::default();
        let store = Arc::new(InMemoryStore::new());

        let patient = store
            .insert_patient(Patient {
                id: Uuid::new_v4(),
                name: "Ana Souza".to_string(),
                email: Some("ana@patients.test".to_string()),
                phone: None,
                birth_date: None,
                cpf: None,
                address: None,
                notes: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let professional = store
            .insert_professional(Professional {
                id: Uuid::new_v4(),
                name: "Dra. Helena".to_string(),
                email: None,
                phone: None,
                specialty: "Fisioterapia".to_string(),
                color: "#10b981".to_string(),
                working_hours: (1..=5)
                    .map(|day| WorkingHours {
                        day_of_week: day,
                        start: "08:00".parse().unwrap(),
                        end: "18:00".parse().unwrap(),
                    })
                    .collect(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let service = store
            .insert_service(Service {
                id: Uuid::new_v4(),
                name: "Sessão de fisioterapia".to_string(),
                description: None,
                duration: 30,
                price: 120.0,
                category: "Reabilitação".to_string(),
                professional_ids: vec![professional.id],
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let state = Arc::new(AppointmentCellState::new(config.to_arc(), store, Arc::new(TracingNotifier)));

        Self {
            router: clinic_routes(state),
            config,
            patient_id: patient.id,
            professional_id: professional.id,
            service_id: service.id,
        }
    }

    fn admin_token(&self) -> String {
        JwtTestUtils::create_test_token(&TestUser::admin("admin@clinic.test"), &self.config.jwt_secret, None)
    }

    fn patient_token(&self) -> String {
        let user = TestUser::patient_for("ana@patients.test", self.patient_id);
        JwtTestUtils::create_test_token(&user, &self.config.jwt_secret, None)
    }

    fn booking(&self, start: &str) -> Value {
        json!({
            "patient_id": self.patient_id,
            "professional_id": self.professional_id,
            "service_id": self.service_id,
            "date": "2025-06-16",
            "start_time": start
        })
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app.send("GET", "/appointments", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("GET", "/appointments", Some(&JwtTestUtils::create_malformed_token()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let app = TestApp::new().await;
    let token = JwtTestUtils::create_expired_token(&TestUser::admin("admin@clinic.test"), &app.config.jwt_secret);

    let (status, _) = app.send("GET", "/appointments", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_twice_returns_conflict() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    let (status, body) = app
        .send("POST", "/appointments", Some(&token), Some(app.booking("09:00")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["end_time"], "09:30");
    assert_eq!(body["appointment"]["status"], "agendado");

    let (status, _) = app
        .send("POST", "/appointments", Some(&token), Some(app.booking("09:15")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn outside_working_hours_returns_conflict() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send("POST", "/appointments", Some(&app.admin_token()), Some(app.booking("17:45")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn illegal_transition_returns_unprocessable() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    let (_, body) = app
        .send("POST", "/appointments", Some(&token), Some(app.booking("10:00")))
        .await;
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/appointments/{}/status", id),
            Some(&token),
            Some(json!({ "status": "realizado" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/appointments/{}/status", id),
            Some(&token),
            Some(json!({ "status": "confirmado" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "confirmado");
}

#[tokio::test]
async fn patients_cannot_delete_appointments() {
    let app = TestApp::new().await;
    let patient_token = app.patient_token();

    let (status, body) = app
        .send("POST", "/appointments", Some(&patient_token), Some(app.booking("11:00")))
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send("DELETE", &format!("/appointments/{}", id), Some(&patient_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("DELETE", &format!("/appointments/{}", id), Some(&app.admin_token()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_appointment_returns_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send("GET", &format!("/appointments/{}", Uuid::new_v4()), Some(&app.admin_token()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn availability_lists_free_intervals() {
    let app = TestApp::new().await;
    let token = app.admin_token();
    app.send("POST", "/appointments", Some(&token), Some(app.booking("12:00"))).await;

    let (status, body) = app
        .send(
            "GET",
            &format!("/availability/{}/2025-06-16?duration=60", app.professional_id),
            Some(&token),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["working_hours"], json!({ "start": "08:00", "end": "18:00" }));
    assert_eq!(
        body["free_intervals"],
        json!([
            { "start": "08:00", "end": "12:00" },
            { "start": "12:30", "end": "18:00" }
        ])
    );
}

#[tokio::test]
async fn invalid_service_returns_bad_request() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(
            "POST",
            "/services",
            Some(&app.admin_token()),
            Some(json!({
                "name": "Avaliação",
                "duration": 0,
                "price": 80.0,
                "category": "Geral",
                "professional_ids": [app.professional_id]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patient_delete_requires_cascade_when_booked() {
    let app = TestApp::new().await;
    let token = app.admin_token();
    app.send("POST", "/appointments", Some(&token), Some(app.booking("14:00"))).await;

    let uri = format!("/patients/{}", app.patient_id);
    let (status, _) = app.send("DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("DELETE", &format!("{}?cascade=true", uri), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send("GET", "/appointments", Some(&token), None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn dashboard_reports_metrics_for_staff() {
    let app = TestApp::new().await;
    let token = app.admin_token();
    app.send("POST", "/appointments", Some(&token), Some(app.booking("09:00"))).await;

    let (status, body) = app
        .send("GET", "/dashboard?today=2025-06-16", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"]["appointments_today"], 1);
    assert_eq!(body["appointments_per_month"][5], 1);

    let (status, _) = app
        .send("GET", "/dashboard", Some(&app.patient_token()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
