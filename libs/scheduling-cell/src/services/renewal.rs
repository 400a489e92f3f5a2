use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{
    PeriodicScheduleSettings, RenewalFailure, RenewalReport, ScheduleError,
};
use crate::services::settings::ScheduleSettingsService;
use crate::services::store::PeriodicScheduleStore;

/// Background monitor that keeps every auto-renewing doctor's slot window
/// from running out. One doctor's broken configuration never stops the
/// sweep for the rest.
pub struct AutoRenewalMonitor {
    config: Arc<AppConfig>,
    settings: Arc<ScheduleSettingsService>,
    store: Arc<PeriodicScheduleStore>,
    is_shutdown: RwLock<bool>,
}

impl AutoRenewalMonitor {
    pub fn new(
        config: Arc<AppConfig>,
        settings: Arc<ScheduleSettingsService>,
        store: Arc<PeriodicScheduleStore>,
    ) -> Self {
        Self {
            config,
            settings,
            store,
            is_shutdown: RwLock::new(false),
        }
    }

    /// Periodic sweep loop. The first sweep runs immediately so windows are
    /// current right after startup.
    pub async fn run_loop(&self) {
        let interval_secs = self.config.renewal_check_interval_secs.max(1);
        info!(
            "Starting schedule renewal monitor (every {}s)",
            interval_secs
        );

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        loop {
            interval.tick().await;

            if *self.is_shutdown.read().await {
                info!("Schedule renewal monitor shutting down");
                break;
            }

            match self.check_and_renew_all().await {
                Ok(report) => {
                    info!(
                        "Renewal sweep: {} checked, {} renewed, {} skipped, {} failed",
                        report.doctors_checked,
                        report.doctors_renewed,
                        report.doctors_skipped,
                        report.failures.len()
                    );
                }
                Err(e) => {
                    error!("Renewal sweep failed: {}", e);
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }

    /// One full sweep over every doctor with auto-renew enabled. Per-doctor
    /// failures land in the report; only a failure to list doctors at all
    /// aborts the sweep.
    pub async fn check_and_renew_all(&self) -> Result<RenewalReport, ScheduleError> {
        let today = Utc::now().date_naive();
        let mut report = RenewalReport::new(Utc::now());

        let doctors = self.settings.list_auto_renew_enabled(None).await?;
        report.doctors_checked = doctors.len() as i32;

        for periodic in &doctors {
            match self.renew_doctor(periodic, today).await {
                Ok(true) => report.doctors_renewed += 1,
                Ok(false) => report.doctors_skipped += 1,
                Err(e) => {
                    warn!(
                        "Renewal failed for doctor {}: {}",
                        periodic.doctor_id, e
                    );
                    report.failures.push(RenewalFailure {
                        doctor_id: periodic.doctor_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Extends one doctor's window when it is inside the renewal horizon.
    /// Existing slots and their statuses are never touched; the window only
    /// ever grows forward.
    async fn renew_doctor(
        &self,
        periodic: &PeriodicScheduleSettings,
        today: NaiveDate,
    ) -> Result<bool, ScheduleError> {
        let doctor_id = periodic.doctor_id.to_string();
        let target_end = today + Duration::days(i64::from(periodic.schedule_period_days));

        let from = match self.store.window_end(&doctor_id, None).await? {
            None => today,
            Some(window_end) => {
                let days_left = (window_end - today).num_days();
                if days_left > i64::from(periodic.renewal_advance_days) {
                    debug!(
                        "Doctor {} window ends {} ({} days out), no renewal needed",
                        doctor_id, window_end, days_left
                    );
                    return Ok(false);
                }
                (window_end + Duration::days(1)).max(today)
            }
        };

        if target_end < from {
            return Ok(false);
        }

        let renewal = self
            .store
            .ensure_window(&doctor_id, from, target_end, None)
            .await?;
        info!(
            "Renewed doctor {} window through {} ({} slots added)",
            doctor_id, target_end, renewal.slots_created
        );

        if self.config.slot_retention_days > 0 {
            let cutoff = today - Duration::days(self.config.slot_retention_days);
            if let Err(e) = self.store.prune_before(&doctor_id, cutoff, None).await {
                warn!("Failed to prune old slots for doctor {}: {}", doctor_id, e);
            }
        }

        Ok(true)
    }
}
