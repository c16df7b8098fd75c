// libs/appointment-cell/src/services/availability.rs
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Appointment, FreeInterval, WorkingHours};
use crate::services::time_utils::ClockTime;
use crate::services::working_hours::WorkingHoursCalendar;

/// A professional's day: the working window minus occupying appointments.
///
/// Gaps are produced lazily by [`Availability::iter`]; each call starts over
/// from the opening time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Availability {
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub window: Option<(ClockTime, ClockTime)>,
    /// Occupied intervals clipped to the window, sorted by start.
    busy: Vec<(ClockTime, ClockTime)>,
}

impl Availability {
    pub fn new(
        professional_id: Uuid,
        date: NaiveDate,
        working_hours: &[WorkingHours],
        appointments: &[Appointment],
    ) -> Self {
        let window = WorkingHoursCalendar::new(working_hours)
            .window_for(date)
            .map(|entry| (entry.start, entry.end));

        let mut busy: Vec<(ClockTime, ClockTime)> = match window {
            Some((open, close)) => appointments
                .iter()
                .filter(|a| a.professional_id == professional_id && a.date == date && a.is_occupying())
                .filter(|a| a.start_time < a.end_time)
                .map(|a| (a.start_time.max(open), a.end_time.min(close)))
                .filter(|(start, end)| start < end)
                .collect(),
            None => Vec::new(),
        };
        busy.sort();

        Self { professional_id, date, window, busy }
    }

    pub fn iter(&self) -> FreeIntervals<'_> {
        FreeIntervals {
            cursor: self.window.map(|(open, _)| open),
            close: self.window.map(|(_, close)| close),
            busy: self.busy.iter(),
        }
    }

    /// Free gaps long enough for a service of `duration` minutes.
    pub fn gaps_fitting(&self, duration: u32) -> impl Iterator<Item = FreeInterval> + '_ {
        self.iter().filter(move |gap| gap.duration_minutes() >= duration)
    }
}

impl<'a> IntoIterator for &'a Availability {
    type Item = FreeInterval;
    type IntoIter = FreeIntervals<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct FreeIntervals<'a> {
    cursor: Option<ClockTime>,
    close: Option<ClockTime>,
    busy: std::slice::Iter<'a, (ClockTime, ClockTime)>,
}

impl Iterator for FreeIntervals<'_> {
    type Item = FreeInterval;

    fn next(&mut self) -> Option<FreeInterval> {
        let close = self.close?;
        loop {
            let cursor = self.cursor?;
            match self.busy.next() {
                Some(&(start, end)) => {
                    self.cursor = Some(cursor.max(end));
                    if cursor < start {
                        return Some(FreeInterval { start: cursor, end: start });
                    }
                }
                None => {
                    self.cursor = None;
                    return (cursor < close).then_some(FreeInterval { start: cursor, end: close });
                }
            }
        }
    }
}
