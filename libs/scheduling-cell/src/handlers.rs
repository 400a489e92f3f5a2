use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    MarkSlotRequest, SavePeriodicSettingsRequest, SaveScheduleSettingsRequest, ScheduleError,
    DEFAULT_SCHEDULE_PERIOD_DAYS,
};
use crate::SchedulingState;

// Query parameters for different endpoints
#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub exclude_appointment_id: Option<String>,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .availability
        .get_available_slots(&doctor_id, query.date, None)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "available_slots": slots,
        "total_slots": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn get_day_schedule(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let day = state.store.get_day(&doctor_id, query.date, None).await?;

    Ok(Json(json!(day)))
}

#[axum::debug_handler]
pub async fn get_range_schedule(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Value>, AppError> {
    if query.to_date < query.from_date {
        return Err(AppError::BadRequest(
            "from_date must not be after to_date".to_string(),
        ));
    }
    if (query.to_date - query.from_date).num_days() > 366 {
        return Err(AppError::BadRequest(
            "Date range cannot exceed 366 days".to_string(),
        ));
    }

    let days = state
        .store
        .get_range(&doctor_id, query.from_date, query.to_date, None)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from_date": query.from_date,
        "to_date": query.to_date,
        "days": days,
        "total_days": days.len()
    })))
}

// ==============================================================================
// PROTECTED SCHEDULE SETTINGS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_schedule_settings(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.can_manage_doctor(&doctor_id) {
        return Err(AppError::Auth(
            "Not authorized to view schedule settings for this doctor".to_string(),
        ));
    }

    let settings = state.settings.get_settings(&doctor_id, Some(token)).await?;

    Ok(Json(json!(settings)))
}

#[axum::debug_handler]
pub async fn save_schedule_settings(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SaveScheduleSettingsRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.can_manage_doctor(&doctor_id) {
        return Err(AppError::Auth(
            "Not authorized to update schedule settings for this doctor".to_string(),
        ));
    }

    let settings = state
        .settings
        .save_settings(&doctor_id, request, Some(token))
        .await?;

    Ok(Json(json!(settings)))
}

#[axum::debug_handler]
pub async fn get_periodic_settings(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.can_manage_doctor(&doctor_id) {
        return Err(AppError::Auth(
            "Not authorized to view periodic settings for this doctor".to_string(),
        ));
    }

    let periodic = state
        .settings
        .get_periodic_settings(&doctor_id, Some(token))
        .await?;

    Ok(Json(json!(periodic)))
}

#[axum::debug_handler]
pub async fn save_periodic_settings(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SavePeriodicSettingsRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.can_manage_doctor(&doctor_id) {
        return Err(AppError::Auth(
            "Not authorized to update periodic settings for this doctor".to_string(),
        ));
    }

    let periodic = state
        .settings
        .save_periodic_settings(&doctor_id, request, Some(token))
        .await?;

    Ok(Json(json!(periodic)))
}

// ==============================================================================
// PROTECTED SLOT WINDOW HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn materialize_schedule(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.can_manage_doctor(&doctor_id) {
        return Err(AppError::Auth(
            "Not authorized to materialize the schedule for this doctor".to_string(),
        ));
    }

    let period_days = match state
        .settings
        .get_periodic_settings(&doctor_id, Some(token))
        .await
    {
        Ok(periodic) => periodic.schedule_period_days,
        Err(ScheduleError::PeriodicSettingsNotFound(_)) => DEFAULT_SCHEDULE_PERIOD_DAYS,
        Err(e) => return Err(e.into()),
    };

    let today = Utc::now().date_naive();
    let to_date = today + Duration::days(i64::from(period_days));

    let report = state
        .store
        .ensure_window(&doctor_id, today, to_date, Some(token))
        .await?;

    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn mark_slot(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<MarkSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.can_manage_doctor(&doctor_id) {
        return Err(AppError::Auth(
            "Not authorized to update slots for this doctor".to_string(),
        ));
    }

    let slot = state
        .store
        .mark_slot(
            &doctor_id,
            request.slot_date,
            request.start_time,
            request.status,
            Some(token),
        )
        .await?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn check_conflicts(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<ConflictQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let result = state
        .conflicts
        .has_conflict(
            &doctor_id,
            query.date,
            query.time,
            query.exclude_appointment_id.as_deref(),
            Some(token),
        )
        .await?;

    Ok(Json(json!(result)))
}

#[axum::debug_handler]
pub async fn run_renewal(
    State(state): State<Arc<SchedulingState>>,
    TypedHeader(_auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only administrators can trigger schedule renewal".to_string(),
        ));
    }

    let report = state.renewal.check_and_renew_all().await?;

    Ok(Json(json!(report)))
}
