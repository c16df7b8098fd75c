// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::Appointment;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentBooked,
    AppointmentRescheduled,
    AppointmentStatusChanged,
    AppointmentDeleted,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::AppointmentBooked => "Appointment booked",
            NotificationKind::AppointmentRescheduled => "Appointment rescheduled",
            NotificationKind::AppointmentStatusChanged => "Appointment status changed",
            NotificationKind::AppointmentDeleted => "Appointment removed",
        }
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification endpoint rejected the message with status {0}")]
    Rejected(u16),
}

/// Fire-and-forget sender for appointment events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotificationKind, payload: Value) -> Result<(), NotificationError>;
}

/// Payload describing an appointment event.
pub fn appointment_payload(appointment: &Appointment) -> Value {
    json!({
        "appointment_id": appointment.id,
        "patient_id": appointment.patient_id,
        "professional_id": appointment.professional_id,
        "service_id": appointment.service_id,
        "date": appointment.date,
        "start_time": appointment.start_time,
        "end_time": appointment.end_time,
        "status": appointment.status,
    })
}

/// Runs `notify` on its own task. Failures are logged and never reach the caller.
pub fn dispatch(notifier: &Arc<dyn Notifier>, kind: NotificationKind, payload: Value) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(kind, payload).await {
            warn!("Failed to send {:?} notification: {}", kind, e);
        }
    });
}

/// Logs messages instead of delivering them. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, kind: NotificationKind, payload: Value) -> Result<(), NotificationError> {
        info!("Notification to be sent: {} {}", kind.subject(), payload);
        Ok(())
    }
}

/// Posts `{kind, subject, payload}` as JSON to a webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, kind: NotificationKind, payload: Value) -> Result<(), NotificationError> {
        debug!("Posting {:?} notification to {}", kind, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "kind": kind,
                "subject": kind.subject(),
                "payload": payload,
            }))
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }

        Ok(())
    }
}
