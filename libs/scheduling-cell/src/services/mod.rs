pub mod availability;
pub mod conflict;
pub mod materializer;
pub mod renewal;
pub mod settings;
pub mod store;

pub use availability::AvailabilityQueryService;
pub use conflict::ConflictChecker;
pub use renewal::AutoRenewalMonitor;
pub use settings::ScheduleSettingsService;
pub use store::PeriodicScheduleStore;
