use anyhow::anyhow;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    PeriodicScheduleSettings, SavePeriodicSettingsRequest, SaveScheduleSettingsRequest,
    ScheduleError, ScheduleSettings, DEFAULT_RENEWAL_ADVANCE_DAYS, DEFAULT_SCHEDULE_PERIOD_DAYS,
    MAX_SCHEDULE_PERIOD_DAYS, MIN_SCHEDULE_PERIOD_DAYS,
};

pub struct ScheduleSettingsService {
    supabase: SupabaseClient,
}

impl ScheduleSettingsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Get the recurring work pattern for a doctor.
    pub async fn get_settings(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<ScheduleSettings, ScheduleError> {
        debug!("Fetching schedule settings for doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctor_schedule_settings?doctor_id=eq.{}", doctor_id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        if result.is_empty() {
            return Err(ScheduleError::SettingsNotFound(doctor_id.to_string()));
        }

        let settings: ScheduleSettings = serde_json::from_value(result[0].clone())
            .map_err(|e| ScheduleError::Database(anyhow!("Malformed schedule settings row: {}", e)))?;
        Ok(settings)
    }

    /// Create or replace the recurring work pattern. Validation failures block
    /// persistence entirely.
    pub async fn save_settings(
        &self,
        doctor_id: &str,
        request: SaveScheduleSettingsRequest,
        auth_token: Option<&str>,
    ) -> Result<ScheduleSettings, ScheduleError> {
        debug!("Saving schedule settings for doctor: {}", doctor_id);

        validate_schedule_settings(&request)?;

        let mut work_days = request.work_days.clone();
        work_days.sort_unstable();
        work_days.dedup();

        if let Some(cap) = request.max_daily_appointments {
            let capacity = daily_slot_capacity(&request);
            if capacity > cap {
                warn!(
                    "Doctor {} can fit {} slots per day but max_daily_appointments is {}",
                    doctor_id, capacity, cap
                );
            }
        }

        let now = Utc::now().to_rfc3339();
        let mut settings_data = json!({
            "doctor_id": doctor_id,
            "appointment_duration_minutes": request.appointment_duration_minutes,
            "buffer_minutes": request.buffer_minutes.unwrap_or(0),
            "max_daily_appointments": request.max_daily_appointments,
            "work_days": work_days,
            "work_periods": request.work_periods,
            "break_times": request.break_times.unwrap_or_default(),
            "updated_at": now,
        });

        let existing: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/doctor_schedule_settings?doctor_id=eq.{}", doctor_id),
                auth_token,
                None,
            )
            .await?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = if existing.is_empty() {
            settings_data["created_at"] = json!(now);
            self.supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/doctor_schedule_settings",
                    auth_token,
                    Some(settings_data),
                    Some(headers),
                )
                .await?
        } else {
            self.supabase
                .request_with_headers(
                    Method::PATCH,
                    &format!("/rest/v1/doctor_schedule_settings?doctor_id=eq.{}", doctor_id),
                    auth_token,
                    Some(settings_data),
                    Some(headers),
                )
                .await?
        };

        if result.is_empty() {
            return Err(ScheduleError::Database(anyhow!("Failed to save schedule settings")));
        }

        let settings: ScheduleSettings = serde_json::from_value(result[0].clone())
            .map_err(|e| ScheduleError::Database(anyhow!("Malformed schedule settings row: {}", e)))?;

        debug!("Schedule settings saved for doctor: {}", doctor_id);
        Ok(settings)
    }

    /// Get the rolling-window policy for a doctor.
    pub async fn get_periodic_settings(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<PeriodicScheduleSettings, ScheduleError> {
        debug!("Fetching periodic schedule settings for doctor: {}", doctor_id);

        let path = format!("/rest/v1/periodic_schedule_settings?doctor_id=eq.{}", doctor_id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        if result.is_empty() {
            return Err(ScheduleError::PeriodicSettingsNotFound(doctor_id.to_string()));
        }

        let settings: PeriodicScheduleSettings = serde_json::from_value(result[0].clone())
            .map_err(|e| ScheduleError::Database(anyhow!("Malformed periodic settings row: {}", e)))?;
        Ok(settings)
    }

    /// Create or replace the rolling-window policy.
    pub async fn save_periodic_settings(
        &self,
        doctor_id: &str,
        request: SavePeriodicSettingsRequest,
        auth_token: Option<&str>,
    ) -> Result<PeriodicScheduleSettings, ScheduleError> {
        debug!("Saving periodic schedule settings for doctor: {}", doctor_id);

        let schedule_period_days = request.schedule_period_days.unwrap_or(DEFAULT_SCHEDULE_PERIOD_DAYS);
        let renewal_advance_days = request.renewal_advance_days.unwrap_or(DEFAULT_RENEWAL_ADVANCE_DAYS);
        validate_periodic_settings(schedule_period_days, renewal_advance_days)?;

        let now = Utc::now().to_rfc3339();
        let mut settings_data = json!({
            "doctor_id": doctor_id,
            "schedule_period_days": schedule_period_days,
            "auto_renew_enabled": request.auto_renew_enabled.unwrap_or(true),
            "renewal_advance_days": renewal_advance_days,
            "updated_at": now,
        });

        let existing: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/periodic_schedule_settings?doctor_id=eq.{}", doctor_id),
                auth_token,
                None,
            )
            .await?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = if existing.is_empty() {
            settings_data["created_at"] = json!(now);
            self.supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/periodic_schedule_settings",
                    auth_token,
                    Some(settings_data),
                    Some(headers),
                )
                .await?
        } else {
            self.supabase
                .request_with_headers(
                    Method::PATCH,
                    &format!("/rest/v1/periodic_schedule_settings?doctor_id=eq.{}", doctor_id),
                    auth_token,
                    Some(settings_data),
                    Some(headers),
                )
                .await?
        };

        if result.is_empty() {
            return Err(ScheduleError::Database(anyhow!("Failed to save periodic schedule settings")));
        }

        let settings: PeriodicScheduleSettings = serde_json::from_value(result[0].clone())
            .map_err(|e| ScheduleError::Database(anyhow!("Malformed periodic settings row: {}", e)))?;

        debug!("Periodic schedule settings saved for doctor: {}", doctor_id);
        Ok(settings)
    }

    /// All doctors with auto-renewal switched on, for the renewal sweep.
    pub async fn list_auto_renew_enabled(
        &self,
        auth_token: Option<&str>,
    ) -> Result<Vec<PeriodicScheduleSettings>, ScheduleError> {
        let path = "/rest/v1/periodic_schedule_settings?auto_renew_enabled=eq.true&order=doctor_id.asc";
        let result: Vec<Value> = self.supabase.request(Method::GET, path, auth_token, None).await?;

        let settings: Vec<PeriodicScheduleSettings> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<PeriodicScheduleSettings>, _>>()
            .map_err(|e| ScheduleError::Database(anyhow!("Malformed periodic settings row: {}", e)))?;

        Ok(settings)
    }
}

/// Save-time validation for the recurring work pattern. Fails closed: any
/// violation blocks persistence, so the materializer can assume clean input.
pub fn validate_schedule_settings(request: &SaveScheduleSettingsRequest) -> Result<(), ScheduleError> {
    if request.appointment_duration_minutes <= 0 {
        return Err(ScheduleError::Configuration(
            "appointment_duration_minutes must be greater than zero".to_string(),
        ));
    }

    if let Some(buffer) = request.buffer_minutes {
        if buffer < 0 {
            return Err(ScheduleError::Configuration(
                "buffer_minutes must not be negative".to_string(),
            ));
        }
    }

    if let Some(cap) = request.max_daily_appointments {
        if cap <= 0 {
            return Err(ScheduleError::Configuration(
                "max_daily_appointments must be greater than zero".to_string(),
            ));
        }
    }

    if request.work_days.is_empty() {
        return Err(ScheduleError::Configuration(
            "At least one work day is required".to_string(),
        ));
    }

    for day in &request.work_days {
        if *day < 0 || *day > 6 {
            return Err(ScheduleError::Configuration(format!(
                "Work day {} is out of range 0 (Sunday) to 6 (Saturday)",
                day
            )));
        }
    }

    let mut active_periods: Vec<_> = request.work_periods.iter().filter(|p| p.is_active).collect();
    if active_periods.is_empty() {
        return Err(ScheduleError::Configuration(
            "At least one active work period is required".to_string(),
        ));
    }

    for period in &request.work_periods {
        if period.start_time >= period.end_time {
            return Err(ScheduleError::Configuration(format!(
                "Work period {}-{} must start before it ends",
                period.start_time, period.end_time
            )));
        }
    }

    active_periods.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    for pair in active_periods.windows(2) {
        if pair[1].start_time < pair[0].end_time {
            return Err(ScheduleError::Configuration(format!(
                "Active work periods {}-{} and {}-{} overlap",
                pair[0].start_time, pair[0].end_time, pair[1].start_time, pair[1].end_time
            )));
        }
    }

    let breaks = request.break_times.as_deref().unwrap_or(&[]);
    for brk in breaks {
        if brk.start_time >= brk.end_time {
            return Err(ScheduleError::Configuration(format!(
                "Break {}-{} must start before it ends",
                brk.start_time, brk.end_time
            )));
        }

        let inside_active_period = active_periods.iter().any(|p| {
            p.start_time <= brk.start_time && brk.end_time <= p.end_time
        });
        if !inside_active_period {
            return Err(ScheduleError::Configuration(format!(
                "Break {}-{} falls outside every active work period",
                brk.start_time, brk.end_time
            )));
        }
    }

    let mut sorted_breaks: Vec<_> = breaks.iter().collect();
    sorted_breaks.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    for pair in sorted_breaks.windows(2) {
        if pair[1].start_time < pair[0].end_time {
            return Err(ScheduleError::Configuration(format!(
                "Breaks {}-{} and {}-{} overlap",
                pair[0].start_time, pair[0].end_time, pair[1].start_time, pair[1].end_time
            )));
        }
    }

    Ok(())
}

pub fn validate_periodic_settings(
    schedule_period_days: i32,
    renewal_advance_days: i32,
) -> Result<(), ScheduleError> {
    if schedule_period_days < MIN_SCHEDULE_PERIOD_DAYS || schedule_period_days > MAX_SCHEDULE_PERIOD_DAYS {
        return Err(ScheduleError::Configuration(format!(
            "schedule_period_days must be between {} and {}",
            MIN_SCHEDULE_PERIOD_DAYS, MAX_SCHEDULE_PERIOD_DAYS
        )));
    }

    if renewal_advance_days < 1 {
        return Err(ScheduleError::Configuration(
            "renewal_advance_days must be at least 1".to_string(),
        ));
    }

    if renewal_advance_days >= schedule_period_days {
        return Err(ScheduleError::Configuration(
            "renewal_advance_days must be smaller than schedule_period_days".to_string(),
        ));
    }

    Ok(())
}

/// Slots one full day can hold, ignoring breaks. Only used for the soft-cap
/// warning against max_daily_appointments.
fn daily_slot_capacity(request: &SaveScheduleSettingsRequest) -> i32 {
    let duration = request.appointment_duration_minutes as i64;
    let stride = duration + request.buffer_minutes.unwrap_or(0) as i64;

    request
        .work_periods
        .iter()
        .filter(|p| p.is_active)
        .map(|p| {
            let span = (p.end_time - p.start_time).num_minutes();
            if span < duration {
                0
            } else {
                ((span - duration) / stride + 1) as i32
            }
        })
        .sum()
}
