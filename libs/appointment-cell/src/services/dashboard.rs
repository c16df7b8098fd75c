// libs/appointment-cell/src/services/dashboard.rs
use chrono::{Datelike, NaiveDate};

use crate::models::{Appointment, AppointmentStatus, DashboardMetrics, Patient};

fn same_month(date: NaiveDate, today: NaiveDate) -> bool {
    date.year() == today.year() && date.month() == today.month()
}

impl DashboardMetrics {
    pub fn compute(appointments: &[Appointment], patients: &[Patient], today: NaiveDate) -> Self {
        let completed: Vec<&Appointment> = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .collect();

        let monthly_revenue = completed
            .iter()
            .filter(|a| same_month(a.date, today))
            .map(|a| a.total_value.unwrap_or(0.0))
            .sum();

        let average_appointment_duration = if appointments.is_empty() {
            0.0
        } else {
            let total: u32 = appointments.iter().map(Appointment::duration_minutes).sum();
            f64::from(total) / appointments.len() as f64
        };

        Self {
            appointments_today: appointments.iter().filter(|a| a.date == today).count(),
            monthly_revenue,
            new_patients_this_month: patients
                .iter()
                .filter(|p| same_month(p.created_at.date_naive(), today))
                .count(),
            completed_appointments: completed.len(),
            cancelled_appointments: appointments
                .iter()
                .filter(|a| a.status == AppointmentStatus::Cancelled)
                .count(),
            average_appointment_duration,
        }
    }
}

/// Appointments per calendar month of `year`, January first.
pub fn appointments_per_month(appointments: &[Appointment], year: i32) -> [usize; 12] {
    let mut counts = [0; 12];
    for appointment in appointments.iter().filter(|a| a.date.year() == year) {
        counts[appointment.date.month0() as usize] += 1;
    }
    counts
}
