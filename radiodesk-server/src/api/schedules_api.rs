use crate::models::User;
use crate::scheduling::{ScheduleEntry, ScheduleError};
use crate::services::schedule_service::{
    EditMode, EntryChanges, NewEntry, ScheduleWindow, ScheduledOccurrence,
};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub mount_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub from: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    #[serde(flatten)]
    pub changes: EntryChanges,
    #[serde(default)]
    pub edit_mode: EditMode,
}

fn require_manager(user: &User) -> Result<(), Response> {
    if user.is_manager() {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN.into_response())
    }
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Vec<ScheduledOccurrence>>, ScheduleError> {
    let mut conn = state.db.get()?;

    let (default_start, default_end) = state.schedule.default_window(Utc::now());
    let window = ScheduleWindow {
        start: query.start.unwrap_or(default_start),
        end: query.end.unwrap_or(default_end),
        mount_id: query.mount_id,
        limit: query.limit,
    };

    let rows = state.schedule.query(&mut conn, &station_id, &window)?;
    Ok(Json(rows))
}

pub async fn get_upcoming(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Vec<ScheduledOccurrence>>, ScheduleError> {
    let mut conn = state.db.get()?;
    let from = query.from.unwrap_or_else(Utc::now);
    Ok(Json(state.schedule.upcoming(&mut conn, &station_id, from)?))
}

pub async fn create_entry(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(station_id): Path<String>,
    Json(req): Json<NewEntry>,
) -> Result<(StatusCode, Json<ScheduleEntry>), Response> {
    require_manager(&user)?;

    let mut conn = state.db.get().map_err(|e| ScheduleError::from(e).into_response())?;
    let entry = state
        .schedule
        .create(&mut conn, &station_id, req)
        .map_err(IntoResponse::into_response)?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((station_id, entry_id)): Path<(String, String)>,
    Json(req): Json<UpdateEntryRequest>,
) -> Result<Json<ScheduleEntry>, Response> {
    require_manager(&user)?;

    let mut conn = state.db.get().map_err(|e| ScheduleError::from(e).into_response())?;
    let entry = state
        .schedule
        .update(&mut conn, &station_id, &entry_id, &req.changes, req.edit_mode)
        .map_err(IntoResponse::into_response)?;

    Ok(Json(entry))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((station_id, entry_id)): Path<(String, String)>,
) -> Result<StatusCode, Response> {
    require_manager(&user)?;

    let mut conn = state.db.get().map_err(|e| ScheduleError::from(e).into_response())?;
    state
        .schedule
        .delete_one(&mut conn, &station_id, &entry_id)
        .map_err(IntoResponse::into_response)?;

    Ok(StatusCode::NO_CONTENT)
}
