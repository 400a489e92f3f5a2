use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;

use crate::models::{BreakInterval, ScheduleSettings, SlotCandidate};

/// Turns a doctor's recurring template into the candidate slots for one date.
///
/// Pure function of (date, settings): no persistence, no knowledge of
/// bookings. Assumes `settings` already passed save-time validation, in
/// particular that active work periods do not overlap.
pub fn materialize(date: NaiveDate, settings: &ScheduleSettings) -> Vec<SlotCandidate> {
    if !settings.is_work_day(date) {
        return Vec::new();
    }

    let duration = Duration::minutes(settings.appointment_duration_minutes as i64);
    let stride = Duration::minutes(
        (settings.appointment_duration_minutes + settings.buffer_minutes) as i64,
    );

    let mut candidates = Vec::new();

    for period in settings.active_work_periods() {
        let mut current = period.start_time;

        loop {
            let (slot_end, end_wrap) = current.overflowing_add_signed(duration);
            // Wrap past midnight ends generation for this period.
            if end_wrap != 0 || slot_end > period.end_time {
                break;
            }

            if !overlaps_break(current, slot_end, &settings.break_times) {
                candidates.push(SlotCandidate {
                    start_time: current,
                    end_time: slot_end,
                    duration_minutes: settings.appointment_duration_minutes,
                    period_type: period.period_type,
                });
            }

            let (next_start, start_wrap) = current.overflowing_add_signed(stride);
            if start_wrap != 0 {
                break;
            }
            current = next_start;
        }
    }

    debug!("Materialized {} slot candidates for {}", candidates.len(), date);
    candidates
}

/// A slot overlapping any break is excluded entirely, never truncated. The
/// grid is not re-anchored after a break: subsequent slots stay on the same
/// stride.
fn overlaps_break(start: NaiveTime, end: NaiveTime, breaks: &[BreakInterval]) -> bool {
    breaks
        .iter()
        .any(|b| start < b.end_time && b.start_time < end)
}
