// libs/appointment-cell/src/services/conflict.rs
use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, ConflictReason, WorkingHours};
use crate::services::time_utils::{overlaps, ClockTime};
use crate::services::working_hours::WorkingHoursCalendar;

/// A slot someone wants to book or move an appointment into.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotCandidate {
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// The appointment being edited, ignored when looking for overlaps.
    pub exclude_appointment_id: Option<Uuid>,
}

pub struct ConflictDetectionService {
    enforce_working_hours: bool,
}

impl ConflictDetectionService {
    pub fn new(enforce_working_hours: bool) -> Self {
        Self { enforce_working_hours }
    }

    /// Decides whether `candidate` can be booked against `existing`.
    ///
    /// Overlaps are checked first; working hours only when enforcement is on.
    pub fn can_book(
        &self,
        candidate: &SlotCandidate,
        existing: &[Appointment],
        working_hours: &[WorkingHours],
    ) -> Result<(), ConflictReason> {
        debug!(
            "Checking conflicts for professional {} on {} from {} to {}",
            candidate.professional_id, candidate.date, candidate.start_time, candidate.end_time
        );

        if let Some(conflicting) = self.conflicting_appointments(candidate, existing).next() {
            warn!(
                "Conflict detected for professional {} on {}: {}-{} overlaps appointment {}",
                candidate.professional_id,
                candidate.date,
                candidate.start_time,
                candidate.end_time,
                conflicting.id
            );
            return Err(ConflictReason::Overlap {
                appointment_id: conflicting.id,
                date: conflicting.date,
                start_time: conflicting.start_time,
                end_time: conflicting.end_time,
            });
        }

        if self.enforce_working_hours {
            let calendar = WorkingHoursCalendar::new(working_hours);
            if !calendar.covers(candidate.date, candidate.start_time, candidate.end_time) {
                warn!(
                    "Slot {}-{} on {} is outside working hours of professional {}",
                    candidate.start_time, candidate.end_time, candidate.date, candidate.professional_id
                );
                return Err(ConflictReason::OutsideWorkingHours {
                    date: candidate.date,
                    start_time: candidate.start_time,
                    end_time: candidate.end_time,
                    window: calendar
                        .window_for(candidate.date)
                        .map(|entry| (entry.start, entry.end)),
                });
            }
        }

        Ok(())
    }

    /// Occupying appointments of the candidate's professional and date that
    /// overlap it, excluding the appointment being edited.
    pub fn conflicting_appointments<'a>(
        &self,
        candidate: &'a SlotCandidate,
        existing: &'a [Appointment],
    ) -> impl Iterator<Item = &'a Appointment> + 'a {
        existing
            .iter()
            .filter(move |appointment| {
                appointment.professional_id == candidate.professional_id
                    && appointment.date == candidate.date
                    && appointment.is_occupying()
                    && Some(appointment.id) != candidate.exclude_appointment_id
            })
            .filter(move |appointment| {
                overlaps(
                    candidate.start_time,
                    candidate.end_time,
                    appointment.start_time,
                    appointment.end_time,
                )
            })
    }
}
