// libs/scheduling-cell/tests/availability_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::{ScheduleError, ScheduleSettings};
use scheduling_cell::services::availability::AvailabilityQueryService;
use scheduling_cell::services::conflict::ConflictChecker;
use scheduling_cell::services::materializer::materialize;
use scheduling_cell::services::settings::ScheduleSettingsService;
use scheduling_cell::services::store::PeriodicScheduleStore;
use shared_config::AppConfig;
use shared_utils::test_utils::MockSupabaseResponses;

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

struct TestSetup {
    availability: AvailabilityQueryService,
    mock_server: MockServer,
    doctor_id: String,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;

        let config = AppConfig {
            supabase_url: mock_server.uri(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            renewal_check_interval_secs: 3600,
            slot_retention_days: 90,
        };

        let settings = Arc::new(ScheduleSettingsService::new(&config));
        let store = Arc::new(PeriodicScheduleStore::new(&config, settings.clone()));
        let conflicts = Arc::new(ConflictChecker::new(&config));
        let availability = AvailabilityQueryService::new(settings, store, conflicts);

        Self {
            availability,
            mock_server,
            doctor_id: Uuid::new_v4().to_string(),
        }
    }

    async fn mount_day_slots(&self, date: NaiveDate, rows: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/schedule_slots"))
            .and(query_param("slot_date", format!("eq.{}", date)))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }

    async fn mount_appointments(&self, rows: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }
}

// ==============================================================================
// FILTERING
// ==============================================================================

#[tokio::test]
async fn test_only_available_slots_are_returned() {
    let setup = TestSetup::new().await;
    let date = Utc::now().date_naive() + Duration::days(7);

    setup
        .mount_day_slots(
            date,
            vec![
                MockSupabaseResponses::slot_response(&setup.doctor_id, &date.to_string(), "09:00:00", "09:30:00", "available"),
                MockSupabaseResponses::slot_response(&setup.doctor_id, &date.to_string(), "09:35:00", "10:05:00", "booked"),
                MockSupabaseResponses::slot_response(&setup.doctor_id, &date.to_string(), "10:10:00", "10:40:00", "blocked"),
            ],
        )
        .await;
    setup.mount_appointments(vec![]).await;

    let slots = setup
        .availability
        .get_available_slots(&setup.doctor_id, date, None)
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, "09:00:00".parse().unwrap());
}

#[tokio::test]
async fn test_slot_with_active_appointment_is_excluded() {
    let setup = TestSetup::new().await;
    let date = Utc::now().date_naive() + Duration::days(7);

    setup
        .mount_day_slots(
            date,
            vec![
                MockSupabaseResponses::slot_response(&setup.doctor_id, &date.to_string(), "09:00:00", "09:30:00", "available"),
                MockSupabaseResponses::slot_response(&setup.doctor_id, &date.to_string(), "09:35:00", "10:05:00", "available"),
            ],
        )
        .await;

    // The slot grid has not caught up with this booking yet; the appointment
    // cross-check keeps the slot from showing as free.
    setup
        .mount_appointments(vec![MockSupabaseResponses::appointment_response(
            &setup.doctor_id,
            &date.to_string(),
            "09:00:00",
        )])
        .await;

    let slots = setup
        .availability
        .get_available_slots(&setup.doctor_id, date, None)
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, "09:35:00".parse().unwrap());
}

#[tokio::test]
async fn test_today_excludes_elapsed_times() {
    let setup = TestSetup::new().await;
    let today = Utc::now().date_naive();

    setup
        .mount_day_slots(
            today,
            vec![
                MockSupabaseResponses::slot_response(&setup.doctor_id, &today.to_string(), "00:00:00", "00:30:00", "available"),
                MockSupabaseResponses::slot_response(&setup.doctor_id, &today.to_string(), "23:59:59", "23:59:59", "available"),
            ],
        )
        .await;
    setup.mount_appointments(vec![]).await;

    let slots = setup
        .availability
        .get_available_slots(&setup.doctor_id, today, None)
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, "23:59:59".parse().unwrap());
}

// ==============================================================================
// ON-DEMAND WINDOW CREATION
// ==============================================================================

#[tokio::test]
async fn test_unmaterialized_window_is_created_on_demand() {
    let setup = TestSetup::new().await;
    let today = Utc::now().date_naive();

    let settings: ScheduleSettings = serde_json::from_value(
        MockSupabaseResponses::schedule_settings_response(&setup.doctor_id),
    )
    .unwrap();

    // First work day after today, so the queried day is non-empty once the
    // window exists.
    let mut query_date = today + Duration::days(1);
    while !settings.is_work_day(query_date) {
        query_date += Duration::days(1);
    }

    // First read finds nothing.
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_slots"))
        .and(query_param("slot_date", format!("eq.{}", query_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&setup.mock_server)
        .await;

    // After materialization the day has its slots.
    let day_rows: Vec<Value> = materialize(query_date, &settings)
        .iter()
        .map(|c| {
            MockSupabaseResponses::slot_response(
                &setup.doctor_id,
                &query_date.to_string(),
                &c.start_time.format("%H:%M:%S").to_string(),
                &c.end_time.format("%H:%M:%S").to_string(),
                "available",
            )
        })
        .collect();
    let expected_count = day_rows.len();
    assert!(expected_count > 0);

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_slots"))
        .and(query_param("slot_date", format!("eq.{}", query_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(day_rows))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/periodic_schedule_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::periodic_settings_response(&setup.doctor_id)
        ])))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedule_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::schedule_settings_response(&setup.doctor_id)
        ])))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_slots"))
        .and(query_param("select", "slot_date"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    // The insert covers every date of the window in one call.
    let mut window_rows = Vec::new();
    let mut date = today;
    while date <= today + Duration::days(30) {
        for c in materialize(date, &settings) {
            window_rows.push(MockSupabaseResponses::slot_response(
                &setup.doctor_id,
                &date.to_string(),
                &c.start_time.format("%H:%M:%S").to_string(),
                &c.end_time.format("%H:%M:%S").to_string(),
                "available",
            ));
        }
        date += Duration::days(1);
    }

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(window_rows))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    setup.mount_appointments(vec![]).await;

    let slots = setup
        .availability
        .get_available_slots(&setup.doctor_id, query_date, None)
        .await
        .unwrap();

    assert_eq!(slots.len(), expected_count);
    for pair in slots.windows(2) {
        assert!(pair[0].start_time < pair[1].start_time);
    }
}

#[tokio::test]
async fn test_missing_periodic_settings_falls_back_to_default_window() {
    let setup = TestSetup::new().await;
    let date = Utc::now().date_naive() + Duration::days(1);

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_slots"))
        .and(query_param("slot_date", format!("eq.{}", date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/periodic_schedule_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    // The default window still needs schedule settings; with none on file
    // the query surfaces the missing configuration.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedule_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .availability
        .get_available_slots(&setup.doctor_id, date, None)
        .await;

    assert_matches!(result, Err(ScheduleError::SettingsNotFound(_)));
}

#[tokio::test]
async fn test_date_beyond_window_returns_empty_without_materializing() {
    let setup = TestSetup::new().await;
    let date = Utc::now().date_naive() + Duration::days(40);

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_slots"))
        .and(query_param("slot_date", format!("eq.{}", date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/periodic_schedule_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::periodic_settings_response(&setup.doctor_id)
        ])))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_slots"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    setup.mount_appointments(vec![]).await;

    let slots = setup
        .availability
        .get_available_slots(&setup.doctor_id, date, None)
        .await
        .unwrap();

    assert!(slots.is_empty());
}
