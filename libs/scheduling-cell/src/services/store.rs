use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    DaySchedule, MaterializationReport, Slot, SlotStatus, ScheduleError,
};
use crate::services::materializer;
use crate::services::settings::ScheduleSettingsService;

/// One async mutex per doctor so that window creation and slot transitions
/// for the same doctor are serialized without blocking other doctors.
struct DoctorLockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DoctorLockRegistry {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, doctor_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(doctor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Owns the persisted rolling window of slots per doctor.
pub struct PeriodicScheduleStore {
    supabase: SupabaseClient,
    settings: Arc<ScheduleSettingsService>,
    locks: DoctorLockRegistry,
}

impl PeriodicScheduleStore {
    pub fn new(config: &AppConfig, settings: Arc<ScheduleSettingsService>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            settings,
            locks: DoctorLockRegistry::new(),
        }
    }

    /// Materializes every date in [from_date, to_date] that has no slot rows
    /// yet. Dates that already have rows are left untouched, so repeated
    /// calls converge on the same slot set. All new rows go in a single
    /// insert, so a date is never half-persisted.
    pub async fn ensure_window(
        &self,
        doctor_id: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<MaterializationReport, ScheduleError> {
        let lock = self.locks.lock_for(doctor_id).await;
        let _guard = lock.lock().await;

        debug!(
            "Ensuring slot window for doctor {} from {} to {}",
            doctor_id, from_date, to_date
        );

        let settings = self.settings.get_settings(doctor_id, auth_token).await?;

        let mut report = MaterializationReport {
            doctor_id: settings.doctor_id,
            from_date,
            to_date,
            dates_materialized: 0,
            slots_created: 0,
        };

        if to_date < from_date {
            return Ok(report);
        }

        let materialized_dates = self
            .materialized_dates(doctor_id, from_date, to_date, auth_token)
            .await?;

        let now = Utc::now().to_rfc3339();
        let mut new_rows: Vec<Value> = Vec::new();
        let mut date = from_date;

        while date <= to_date {
            if !materialized_dates.contains(&date) {
                let candidates = materializer::materialize(date, &settings);
                if !candidates.is_empty() {
                    report.dates_materialized += 1;
                    report.slots_created += candidates.len() as i32;

                    for candidate in candidates {
                        new_rows.push(json!({
                            "doctor_id": doctor_id,
                            "slot_date": date,
                            "start_time": candidate.start_time.format("%H:%M:%S").to_string(),
                            "end_time": candidate.end_time.format("%H:%M:%S").to_string(),
                            "duration_minutes": candidate.duration_minutes,
                            "period_type": candidate.period_type,
                            "status": SlotStatus::Available,
                            "created_at": now,
                            "updated_at": now,
                        }));
                    }
                }
            }
            date += Duration::days(1);
        }

        if !new_rows.is_empty() {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

            let inserted: Vec<Value> = self
                .supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/schedule_slots",
                    auth_token,
                    Some(Value::Array(new_rows)),
                    Some(headers),
                )
                .await?;

            if inserted.len() as i32 != report.slots_created {
                return Err(ScheduleError::Database(anyhow!(
                    "Slot insert persisted {} of {} rows",
                    inserted.len(),
                    report.slots_created
                )));
            }

            info!(
                "Materialized {} slots across {} dates for doctor {}",
                report.slots_created, report.dates_materialized, doctor_id
            );
        }

        Ok(report)
    }

    /// Persisted slots plus aggregates for one day. A date that was never
    /// materialized comes back empty with zero counts, not as an error.
    pub async fn get_day(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<DaySchedule, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_slots?doctor_id=eq.{}&slot_date=eq.{}&order=start_time.asc",
            doctor_id, date
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        let slots = parse_slots(result)?;
        Ok(DaySchedule::from_slots(date, slots))
    }

    /// Day aggregates for every date in [from_date, to_date], including
    /// never-materialized dates as empty entries, for calendar views.
    pub async fn get_range(
        &self,
        doctor_id: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<DaySchedule>, ScheduleError> {
        if to_date < from_date {
            return Ok(Vec::new());
        }

        let path = format!(
            "/rest/v1/schedule_slots?doctor_id=eq.{}&slot_date=gte.{}&slot_date=lte.{}&order=slot_date.asc,start_time.asc",
            doctor_id, from_date, to_date
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        let mut by_date: HashMap<NaiveDate, Vec<Slot>> = HashMap::new();
        for slot in parse_slots(result)? {
            by_date.entry(slot.slot_date).or_default().push(slot);
        }

        let mut days = Vec::new();
        let mut date = from_date;
        while date <= to_date {
            let slots = by_date.remove(&date).unwrap_or_default();
            days.push(DaySchedule::from_slots(date, slots));
            date += Duration::days(1);
        }

        Ok(days)
    }

    /// Transitions one slot's status. The update is conditional on the status
    /// the caller observed, so two racing bookings resolve to one winner and
    /// one `SlotContended`.
    pub async fn mark_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time: NaiveTime,
        new_status: SlotStatus,
        auth_token: Option<&str>,
    ) -> Result<Slot, ScheduleError> {
        let lock = self.locks.lock_for(doctor_id).await;
        let _guard = lock.lock().await;

        debug!(
            "Marking slot for doctor {} on {} at {} as {}",
            doctor_id, date, time, new_status
        );

        let time_str = time.format("%H:%M:%S").to_string();
        let path = format!(
            "/rest/v1/schedule_slots?doctor_id=eq.{}&slot_date=eq.{}&start_time=eq.{}",
            doctor_id, date, time_str
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        if result.is_empty() {
            return Err(ScheduleError::SlotNotFound { date, time });
        }

        let current: Slot = serde_json::from_value(result[0].clone())
            .map_err(|e| ScheduleError::Database(anyhow!("Malformed slot row: {}", e)))?;

        if !current.status.can_transition_to(new_status) {
            return Err(ScheduleError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let update_path = format!(
            "/rest/v1/schedule_slots?doctor_id=eq.{}&slot_date=eq.{}&start_time=eq.{}&status=eq.{}",
            doctor_id, date, time_str, current.status
        );
        let update_data = json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let updated: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &update_path,
                auth_token,
                Some(update_data),
                Some(headers),
            )
            .await?;

        // Empty result means the status filter no longer matched: another
        // writer got there first.
        if updated.is_empty() {
            return Err(ScheduleError::SlotContended { date, time });
        }

        let slot: Slot = serde_json::from_value(updated[0].clone())
            .map_err(|e| ScheduleError::Database(anyhow!("Malformed slot row: {}", e)))?;

        info!(
            "Slot for doctor {} on {} at {} is now {}",
            doctor_id, date, time, slot.status
        );
        Ok(slot)
    }

    /// Latest materialized date for a doctor, or None when no window exists.
    pub async fn window_end(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<NaiveDate>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_slots?doctor_id=eq.{}&select=slot_date&order=slot_date.desc&limit=1",
            doctor_id
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        match result.first() {
            None => Ok(None),
            Some(row) => {
                let date_str = row["slot_date"].as_str().ok_or_else(|| {
                    ScheduleError::Database(anyhow!("Slot row missing slot_date"))
                })?;
                let date = date_str.parse::<NaiveDate>().map_err(|e| {
                    ScheduleError::Database(anyhow!("Unparseable slot_date {}: {}", date_str, e))
                })?;
                Ok(Some(date))
            }
        }
    }

    /// Drops slot rows for dates before `cutoff`. Only dates that scrolled
    /// out of the window should ever be passed here.
    pub async fn prune_before(
        &self,
        doctor_id: &str,
        cutoff: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<(), ScheduleError> {
        debug!("Pruning slots for doctor {} before {}", doctor_id, cutoff);

        let path = format!(
            "/rest/v1/schedule_slots?doctor_id=eq.{}&slot_date=lt.{}",
            doctor_id, cutoff
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=minimal"));

        let _: () = self
            .supabase
            .request_with_headers(Method::DELETE, &path, auth_token, None, Some(headers))
            .await?;

        Ok(())
    }

    async fn materialized_dates(
        &self,
        doctor_id: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<HashSet<NaiveDate>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_slots?doctor_id=eq.{}&slot_date=gte.{}&slot_date=lte.{}&select=slot_date",
            doctor_id, from_date, to_date
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        let mut dates = HashSet::new();
        for row in result {
            let date_str = row["slot_date"]
                .as_str()
                .ok_or_else(|| ScheduleError::Database(anyhow!("Slot row missing slot_date")))?;
            let date = date_str.parse::<NaiveDate>().map_err(|e| {
                ScheduleError::Database(anyhow!("Unparseable slot_date {}: {}", date_str, e))
            })?;
            dates.insert(date);
        }

        Ok(dates)
    }
}

fn parse_slots(rows: Vec<Value>) -> Result<Vec<Slot>, ScheduleError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Slot>, _>>()
        .map_err(|e| ScheduleError::Database(anyhow!("Malformed slot row: {}", e)))
}
