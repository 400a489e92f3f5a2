// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

/// Rolling window length applied when a doctor has no PeriodicScheduleSettings row.
pub const DEFAULT_SCHEDULE_PERIOD_DAYS: i32 = 30;
pub const DEFAULT_RENEWAL_ADVANCE_DAYS: i32 = 7;
pub const MIN_SCHEDULE_PERIOD_DAYS: i32 = 7;
pub const MAX_SCHEDULE_PERIOD_DAYS: i32 = 365;

// ==============================================================================
// SCHEDULE TEMPLATE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Main,
    Evening,
    PartTime,
    Custom,
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodType::Main => write!(f, "main"),
            PeriodType::Evening => write!(f, "evening"),
            PeriodType::PartTime => write!(f, "part_time"),
            PeriodType::Custom => write!(f, "custom"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPeriod {
    pub period_type: PeriodType,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakInterval {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: Option<String>,
}

/// Per-doctor recurring work pattern. Authored by the doctor-management
/// surface, read by the materializer on every window extension. The engine
/// never mutates it on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_duration_minutes: i32,
    pub buffer_minutes: i32,
    pub max_daily_appointments: Option<i32>,
    /// Weekday indices, 0 = Sunday through 6 = Saturday.
    pub work_days: Vec<i32>,
    pub work_periods: Vec<WorkPeriod>,
    pub break_times: Vec<BreakInterval>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleSettings {
    /// Active work periods ordered by start time.
    pub fn active_work_periods(&self) -> Vec<&WorkPeriod> {
        let mut periods: Vec<&WorkPeriod> = self
            .work_periods
            .iter()
            .filter(|p| p.is_active)
            .collect();
        periods.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        periods
    }

    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.work_days.contains(&weekday_index(date))
    }
}

/// Maps a date onto the 0 = Sunday .. 6 = Saturday convention used by
/// `ScheduleSettings.work_days`.
pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Rolling-window policy, one row per doctor alongside ScheduleSettings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicScheduleSettings {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_period_days: i32,
    pub auto_renew_enabled: bool,
    pub renewal_advance_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
    Blocked,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "available"),
            SlotStatus::Booked => write!(f, "booked"),
            SlotStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl SlotStatus {
    /// Slot state machine: available <-> booked (booking/cancellation) and
    /// available <-> blocked (doctor-side block/unblock). Nothing else,
    /// including same-status writes.
    pub fn can_transition_to(&self, next: SlotStatus) -> bool {
        matches!(
            (self, next),
            (SlotStatus::Available, SlotStatus::Booked)
                | (SlotStatus::Booked, SlotStatus::Available)
                | (SlotStatus::Available, SlotStatus::Blocked)
                | (SlotStatus::Blocked, SlotStatus::Available)
        )
    }
}

/// A persisted bookable interval for one doctor on one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub period_type: PeriodType,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Materializer output before persistence: no identity, no status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotCandidate {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub period_type: PeriodType,
}

/// Availability result shaped for direct display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub period_type: PeriodType,
}

impl AvailableSlot {
    pub fn from_slot(slot: &Slot) -> Self {
        Self {
            start_time: slot.start_time,
            end_time: slot.end_time,
            duration_minutes: slot.duration_minutes,
            period_type: slot.period_type,
        }
    }
}

/// One materialized day plus aggregates. Counts are always recomputed from
/// the slot rows so they cannot drift from the persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub slot_date: NaiveDate,
    pub slots: Vec<Slot>,
    pub total_count: i32,
    pub available_count: i32,
    pub booked_count: i32,
    pub blocked_count: i32,
}

impl DaySchedule {
    pub fn from_slots(slot_date: NaiveDate, mut slots: Vec<Slot>) -> Self {
        slots.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        let total_count = slots.len() as i32;
        let available_count = slots.iter().filter(|s| s.status == SlotStatus::Available).count() as i32;
        let booked_count = slots.iter().filter(|s| s.status == SlotStatus::Booked).count() as i32;
        let blocked_count = slots.iter().filter(|s| s.status == SlotStatus::Blocked).count() as i32;

        Self {
            slot_date,
            slots,
            total_count,
            available_count,
            booked_count,
            blocked_count,
        }
    }

    pub fn empty(slot_date: NaiveDate) -> Self {
        Self::from_slots(slot_date, Vec::new())
    }
}

/// Result of one `ensure_window` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationReport {
    pub doctor_id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub dates_materialized: i32,
    pub slots_created: i32,
}

// ==============================================================================
// APPOINTMENT READ MODELS (external booking ledger, referenced not owned)
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    Expired,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Expired => write!(f, "expired"),
        }
    }
}

impl AppointmentStatus {
    /// Active appointments occupy their time for conflict purposes.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResult {
    pub has_conflict: bool,
    pub conflicting_appointment: Option<Appointment>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveScheduleSettingsRequest {
    pub appointment_duration_minutes: i32,
    pub buffer_minutes: Option<i32>,
    pub max_daily_appointments: Option<i32>,
    pub work_days: Vec<i32>,
    pub work_periods: Vec<WorkPeriod>,
    pub break_times: Option<Vec<BreakInterval>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePeriodicSettingsRequest {
    pub schedule_period_days: Option<i32>,
    pub auto_renew_enabled: Option<bool>,
    pub renewal_advance_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkSlotRequest {
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub status: SlotStatus,
}

// ==============================================================================
// RENEWAL MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalFailure {
    pub doctor_id: Uuid,
    pub error: String,
}

/// Outcome of one renewal sweep across all auto-renew doctors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalReport {
    pub doctors_checked: i32,
    pub doctors_renewed: i32,
    pub doctors_skipped: i32,
    pub failures: Vec<RenewalFailure>,
    pub ran_at: DateTime<Utc>,
}

impl RenewalReport {
    pub fn new(ran_at: DateTime<Utc>) -> Self {
        Self {
            doctors_checked: 0,
            doctors_renewed: 0,
            doctors_skipped: 0,
            failures: Vec::new(),
            ran_at,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schedule settings not found for doctor {0}")]
    SettingsNotFound(String),

    #[error("Periodic schedule settings not found for doctor {0}")]
    PeriodicSettingsNotFound(String),

    #[error("No slot found on {date} at {time}")]
    SlotNotFound { date: NaiveDate, time: NaiveTime },

    #[error("Invalid slot transition from '{from}' to '{to}'")]
    InvalidTransition { from: SlotStatus, to: SlotStatus },

    #[error("Slot on {date} at {time} was updated concurrently")]
    SlotContended { date: NaiveDate, time: NaiveTime },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        let message = err.to_string();
        match err {
            ScheduleError::Configuration(_) => AppError::ValidationError(message),
            ScheduleError::SettingsNotFound(_)
            | ScheduleError::PeriodicSettingsNotFound(_)
            | ScheduleError::SlotNotFound { .. } => AppError::NotFound(message),
            ScheduleError::InvalidTransition { .. }
            | ScheduleError::SlotContended { .. } => AppError::Conflict(message),
            ScheduleError::Database(_) => AppError::Database(message),
        }
    }
}
