// libs/appointment-cell/src/services/working_hours.rs
use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

use crate::models::{AppointmentError, WorkingHours};
use crate::services::time_utils::ClockTime;

/// 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Answers "is this professional working at date D, time T?" from one weekly
/// window per day. A day without an entry is a day off.
#[derive(Debug, Clone, Copy)]
pub struct WorkingHoursCalendar<'a> {
    hours: &'a [WorkingHours],
}

impl<'a> WorkingHoursCalendar<'a> {
    pub fn new(hours: &'a [WorkingHours]) -> Self {
        Self { hours }
    }

    pub fn window_for(&self, date: NaiveDate) -> Option<&'a WorkingHours> {
        let day = day_of_week(date);
        self.hours.iter().find(|entry| entry.day_of_week == day)
    }

    /// `start <= time < end` for the weekday's window.
    pub fn is_working_at(&self, date: NaiveDate, time: ClockTime) -> bool {
        self.window_for(date)
            .map_or(false, |entry| entry.start <= time && time < entry.end)
    }

    /// Whether `[start, end)` lies entirely inside the weekday's window.
    pub fn covers(&self, date: NaiveDate, start: ClockTime, end: ClockTime) -> bool {
        start < end
            && self.window_for(date)
                .map_or(false, |entry| entry.start <= start && end <= entry.end)
    }
}

/// Day in range, `start < end`, at most one window per weekday.
pub fn validate_working_hours(hours: &[WorkingHours]) -> Result<(), AppointmentError> {
    let mut seen = HashSet::new();

    for entry in hours {
        if entry.day_of_week > 6 {
            return Err(AppointmentError::validation(
                "working_hours",
                format!("day_of_week {} must be between 0 (Sunday) and 6 (Saturday)", entry.day_of_week),
            ));
        }
        if entry.start >= entry.end {
            return Err(AppointmentError::validation(
                "working_hours",
                format!(
                    "window {}-{} on day {} must start before it ends",
                    entry.start, entry.end, entry.day_of_week
                ),
            ));
        }
        if !seen.insert(entry.day_of_week) {
            return Err(AppointmentError::validation(
                "working_hours",
                format!("day {} has more than one window", entry.day_of_week),
            ));
        }
    }

    Ok(())
}
