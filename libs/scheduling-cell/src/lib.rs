use std::sync::Arc;

use shared_config::AppConfig;

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::{renewal_routes, scheduling_routes};
pub use services::*;

/// Shared service graph for the scheduling cell. Built once at startup and
/// handed to the routers and the background renewal task, so the per-doctor
/// lock registry and the renewal monitor are process-wide.
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub settings: Arc<ScheduleSettingsService>,
    pub store: Arc<PeriodicScheduleStore>,
    pub conflicts: Arc<ConflictChecker>,
    pub availability: Arc<AvailabilityQueryService>,
    pub renewal: Arc<AutoRenewalMonitor>,
}

impl SchedulingState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let settings = Arc::new(ScheduleSettingsService::new(&config));
        let store = Arc::new(PeriodicScheduleStore::new(&config, settings.clone()));
        let conflicts = Arc::new(ConflictChecker::new(&config));
        let availability = Arc::new(AvailabilityQueryService::new(
            settings.clone(),
            store.clone(),
            conflicts.clone(),
        ));
        let renewal = Arc::new(AutoRenewalMonitor::new(
            config.clone(),
            settings.clone(),
            store.clone(),
        ));

        Self {
            config,
            settings,
            store,
            conflicts,
            availability,
            renewal,
        }
    }
}
