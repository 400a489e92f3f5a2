// libs/scheduling-cell/tests/renewal_test.rs

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::ScheduleSettings;
use scheduling_cell::services::materializer::materialize;
use scheduling_cell::services::renewal::AutoRenewalMonitor;
use scheduling_cell::services::settings::ScheduleSettingsService;
use scheduling_cell::services::store::PeriodicScheduleStore;
use shared_config::AppConfig;
use shared_utils::test_utils::MockSupabaseResponses;

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

struct TestSetup {
    monitor: AutoRenewalMonitor,
    mock_server: MockServer,
}

impl TestSetup {
    async fn new() -> Self {
        Self::with_retention(90).await
    }

    async fn with_retention(slot_retention_days: i64) -> Self {
        let mock_server = MockServer::start().await;

        let config = Arc::new(AppConfig {
            supabase_url: mock_server.uri(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            renewal_check_interval_secs: 3600,
            slot_retention_days,
        });

        let settings = Arc::new(ScheduleSettingsService::new(&config));
        let store = Arc::new(PeriodicScheduleStore::new(&config, settings.clone()));
        let monitor = AutoRenewalMonitor::new(config, settings, store);

        Self {
            monitor,
            mock_server,
        }
    }

    async fn mount_auto_renew_list(&self, rows: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/periodic_schedule_settings"))
            .and(query_param("auto_renew_enabled", "eq.true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }

    async fn mount_window_end(&self, doctor_id: &str, last_date: Option<NaiveDate>) {
        let rows = match last_date {
            Some(date) => json!([{"slot_date": date.to_string()}]),
            None => json!([]),
        };
        Mock::given(method("GET"))
            .and(path("/rest/v1/schedule_slots"))
            .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
            .and(query_param("order", "slot_date.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }

    async fn mount_schedule_settings(&self, doctor_id: &str) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctor_schedule_settings"))
            .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::schedule_settings_response(doctor_id)
            ])))
            .mount(&self.mock_server)
            .await;
    }

    async fn mount_no_materialized_dates(&self, from: NaiveDate) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/schedule_slots"))
            .and(query_param("slot_date", format!("gte.{}", from)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&self.mock_server)
            .await;
    }

    /// The rows the bulk insert is expected to return for a full window
    /// materialization of [from, to].
    fn window_rows(doctor_id: &str, from: NaiveDate, to: NaiveDate) -> Vec<Value> {
        let settings: ScheduleSettings = serde_json::from_value(
            MockSupabaseResponses::schedule_settings_response(doctor_id),
        )
        .unwrap();

        let mut rows = Vec::new();
        let mut date = from;
        while date <= to {
            for c in materialize(date, &settings) {
                rows.push(MockSupabaseResponses::slot_response(
                    doctor_id,
                    &date.to_string(),
                    &c.start_time.format("%H:%M:%S").to_string(),
                    &c.end_time.format("%H:%M:%S").to_string(),
                    "available",
                ));
            }
            date += Duration::days(1);
        }
        rows
    }
}

// ==============================================================================
// RENEWAL SWEEP
// ==============================================================================

#[tokio::test]
async fn test_renews_doctor_inside_renewal_horizon() {
    let setup = TestSetup::new().await;
    let doctor_id = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive();

    setup
        .mount_auto_renew_list(vec![
            MockSupabaseResponses::periodic_settings_response(&doctor_id),
        ])
        .await;

    // Window ends in 3 days, inside the 7 day renewal horizon. Renewal
    // extends from the day after the current end.
    setup
        .mount_window_end(&doctor_id, Some(today + Duration::days(3)))
        .await;
    setup.mount_schedule_settings(&doctor_id).await;
    setup
        .mount_no_materialized_dates(today + Duration::days(4))
        .await;

    let rows = TestSetup::window_rows(
        &doctor_id,
        today + Duration::days(4),
        today + Duration::days(30),
    );
    assert!(!rows.is_empty());

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(rows))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/schedule_slots"))
        .and(query_param("slot_date", format!("lt.{}", today - Duration::days(90))))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    let report = setup.monitor.check_and_renew_all().await.unwrap();

    assert_eq!(report.doctors_checked, 1);
    assert_eq!(report.doctors_renewed, 1);
    assert_eq!(report.doctors_skipped, 0);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_skips_doctor_with_healthy_window() {
    let setup = TestSetup::new().await;
    let doctor_id = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive();

    setup
        .mount_auto_renew_list(vec![
            MockSupabaseResponses::periodic_settings_response(&doctor_id),
        ])
        .await;

    // 20 days of window left, horizon is 7. Nothing to do.
    setup
        .mount_window_end(&doctor_id, Some(today + Duration::days(20)))
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let report = setup.monitor.check_and_renew_all().await.unwrap();

    assert_eq!(report.doctors_checked, 1);
    assert_eq!(report.doctors_renewed, 0);
    assert_eq!(report.doctors_skipped, 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_first_sweep_materializes_from_today() {
    let setup = TestSetup::new().await;
    let doctor_id = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive();

    setup
        .mount_auto_renew_list(vec![
            MockSupabaseResponses::periodic_settings_response(&doctor_id),
        ])
        .await;

    // No slots exist at all. The sweep creates the initial window.
    setup.mount_window_end(&doctor_id, None).await;
    setup.mount_schedule_settings(&doctor_id).await;
    setup.mount_no_materialized_dates(today).await;

    let rows = TestSetup::window_rows(&doctor_id, today, today + Duration::days(30));

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(rows))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&setup.mock_server)
        .await;

    let report = setup.monitor.check_and_renew_all().await.unwrap();

    assert_eq!(report.doctors_renewed, 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_failure_for_one_doctor_does_not_stop_sweep() {
    let setup = TestSetup::new().await;
    let broken = Uuid::new_v4();
    let healthy = Uuid::new_v4();
    let today = Utc::now().date_naive();

    setup
        .mount_auto_renew_list(vec![
            MockSupabaseResponses::periodic_settings_response(&broken.to_string()),
            MockSupabaseResponses::periodic_settings_response(&healthy.to_string()),
        ])
        .await;

    // First doctor needs renewal but has no schedule settings on file.
    setup
        .mount_window_end(&broken.to_string(), Some(today + Duration::days(2)))
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedule_settings"))
        .and(query_param("doctor_id", format!("eq.{}", broken)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    // Second doctor is fine and gets processed despite the first failing.
    setup
        .mount_window_end(&healthy.to_string(), Some(today + Duration::days(20)))
        .await;

    let report = setup.monitor.check_and_renew_all().await.unwrap();

    assert_eq!(report.doctors_checked, 2);
    assert_eq!(report.doctors_renewed, 0);
    assert_eq!(report.doctors_skipped, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].doctor_id, broken);
    assert!(report.failures[0].error.contains("not found"));
}

#[tokio::test]
async fn test_retention_disabled_never_prunes() {
    let setup = TestSetup::with_retention(0).await;
    let doctor_id = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive();

    setup
        .mount_auto_renew_list(vec![
            MockSupabaseResponses::periodic_settings_response(&doctor_id),
        ])
        .await;
    setup
        .mount_window_end(&doctor_id, Some(today + Duration::days(3)))
        .await;
    setup.mount_schedule_settings(&doctor_id).await;
    setup
        .mount_no_materialized_dates(today + Duration::days(4))
        .await;

    let rows = TestSetup::window_rows(
        &doctor_id,
        today + Duration::days(4),
        today + Duration::days(30),
    );

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(rows))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let report = setup.monitor.check_and_renew_all().await.unwrap();

    assert_eq!(report.doctors_renewed, 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_prune_failure_does_not_fail_renewal() {
    let setup = TestSetup::new().await;
    let doctor_id = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive();

    setup
        .mount_auto_renew_list(vec![
            MockSupabaseResponses::periodic_settings_response(&doctor_id),
        ])
        .await;
    setup
        .mount_window_end(&doctor_id, Some(today + Duration::days(3)))
        .await;
    setup.mount_schedule_settings(&doctor_id).await;
    setup
        .mount_no_materialized_dates(today + Duration::days(4))
        .await;

    let rows = TestSetup::window_rows(
        &doctor_id,
        today + Duration::days(4),
        today + Duration::days(30),
    );

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(rows))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("maintenance", "503"),
        ))
        .mount(&setup.mock_server)
        .await;

    let report = setup.monitor.check_and_renew_all().await.unwrap();

    assert_eq!(report.doctors_renewed, 1);
    assert!(report.failures.is_empty());
}
