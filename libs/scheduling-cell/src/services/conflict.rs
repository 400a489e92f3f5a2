use anyhow::anyhow;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, ConflictCheckResult, ScheduleError};

/// Answers whether a doctor already has an active appointment at an exact
/// date and start time. Overlap of differing start times is not a conflict
/// here; slot boundaries already guarantee non-overlapping intervals.
pub struct ConflictChecker {
    supabase: SupabaseClient,
}

impl ConflictChecker {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn has_conflict(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time: NaiveTime,
        exclude_appointment_id: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<ConflictCheckResult, ScheduleError> {
        debug!(
            "Checking appointment conflict for doctor {} on {} at {}",
            doctor_id, date, time
        );

        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=in.(scheduled,completed)",
            doctor_id, date
        );
        if let Some(exclude_id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }

        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;
        let appointments = parse_appointments(result)?;

        let conflicting = appointments
            .into_iter()
            .find(|a| a.appointment_time == time && a.status.is_active());

        Ok(ConflictCheckResult {
            has_conflict: conflicting.is_some(),
            conflicting_appointment: conflicting,
        })
    }

    /// All active appointments a doctor has on one date, for callers that
    /// cross-check a whole day of slots in one pass.
    pub async fn active_appointments_for_day(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=in.(scheduled,completed)",
            doctor_id, date
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, auth_token, None).await?;
        let appointments = parse_appointments(result)?;

        Ok(appointments
            .into_iter()
            .filter(|a| a.status.is_active())
            .collect())
    }
}

fn parse_appointments(rows: Vec<Value>) -> Result<Vec<Appointment>, ScheduleError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Appointment>, _>>()
        .map_err(|e| ScheduleError::Database(anyhow!("Malformed appointment row: {}", e)))
}
