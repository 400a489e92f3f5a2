use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tracing::debug;

use crate::models::{AvailableSlot, ScheduleError, SlotStatus, DEFAULT_SCHEDULE_PERIOD_DAYS};
use crate::services::conflict::ConflictChecker;
use crate::services::settings::ScheduleSettingsService;
use crate::services::store::PeriodicScheduleStore;

/// Read side for patients looking for bookable slots. Combines the persisted
/// slot window with a live appointment cross-check so a slot whose booking
/// was recorded out of band never shows as available.
pub struct AvailabilityQueryService {
    settings: Arc<ScheduleSettingsService>,
    store: Arc<PeriodicScheduleStore>,
    conflicts: Arc<ConflictChecker>,
}

impl AvailabilityQueryService {
    pub fn new(
        settings: Arc<ScheduleSettingsService>,
        store: Arc<PeriodicScheduleStore>,
        conflicts: Arc<ConflictChecker>,
    ) -> Self {
        Self {
            settings,
            store,
            conflicts,
        }
    }

    pub async fn get_available_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, ScheduleError> {
        debug!("Querying available slots for doctor {} on {}", doctor_id, date);

        let today = Utc::now().date_naive();
        let mut day = self.store.get_day(doctor_id, date, auth_token).await?;

        // A queried date inside the current scheduling period with no rows
        // yet means the window was never created. Build it on demand rather
        // than reporting the doctor as unavailable.
        if day.slots.is_empty() && date >= today {
            let period_days = self.schedule_period_days(doctor_id, auth_token).await?;
            let window_to = today + Duration::days(i64::from(period_days));

            if date <= window_to {
                self.store
                    .ensure_window(doctor_id, today, window_to, auth_token)
                    .await?;
                day = self.store.get_day(doctor_id, date, auth_token).await?;
            }
        }

        let occupied = self.occupied_times(doctor_id, date, auth_token).await?;
        let now_time = Utc::now().time();

        let available = day
            .slots
            .into_iter()
            .filter(|slot| slot.status == SlotStatus::Available)
            .filter(|slot| !occupied.contains(&slot.start_time))
            .filter(|slot| date != today || slot.start_time > now_time)
            .map(|slot| AvailableSlot::from_slot(&slot))
            .collect();

        Ok(available)
    }

    async fn schedule_period_days(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<i32, ScheduleError> {
        match self.settings.get_periodic_settings(doctor_id, auth_token).await {
            Ok(periodic) => Ok(periodic.schedule_period_days),
            Err(ScheduleError::PeriodicSettingsNotFound(_)) => Ok(DEFAULT_SCHEDULE_PERIOD_DAYS),
            Err(e) => Err(e),
        }
    }

    async fn occupied_times(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<HashSet<NaiveTime>, ScheduleError> {
        let appointments = self
            .conflicts
            .active_appointments_for_day(doctor_id, date, auth_token)
            .await?;

        Ok(appointments
            .into_iter()
            .map(|a| a.appointment_time)
            .collect())
    }
}
