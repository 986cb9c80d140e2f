use crate::models::{Mount, NewMount, NewStation, Station, User};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateStationRequest {
    pub name: String,
    pub description: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateMountRequest {
    pub name: String,
    pub format: Option<String>,
    pub bitrate: Option<i32>,
}

pub async fn list_stations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Station>>, StatusCode> {
    use crate::schema::stations::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results = stations
        .order(name.asc())
        .select(Station::as_select())
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}

pub async fn create_station(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateStationRequest>,
) -> Result<(StatusCode, Json<Station>), StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    use crate::schema::stations;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let new_station = NewStation {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        description: req.description,
        timezone: req.timezone.unwrap_or_else(|| "UTC".to_string()),
        active: true,
    };

    let station = diesel::insert_into(stations::table)
        .values(&new_station)
        .returning(Station::as_select())
        .get_result(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    tracing::info!("Created station {} ({})", station.name, station.id);
    Ok((StatusCode::CREATED, Json(station)))
}

pub async fn list_mounts(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<Vec<Mount>>, StatusCode> {
    use crate::schema::mounts::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results = mounts
        .filter(station_id.eq(&station))
        .order((created_at.asc(), id.asc()))
        .select(Mount::as_select())
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}

pub async fn create_mount(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(station): Path<String>,
    Json(req): Json<CreateMountRequest>,
) -> Result<(StatusCode, Json<Mount>), StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    use crate::schema::{mounts, stations};

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let exists: i64 = stations::table
        .filter(stations::id.eq(&station))
        .count()
        .get_result(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if exists == 0 {
        return Err(StatusCode::NOT_FOUND);
    }

    let new_mount = NewMount {
        id: uuid::Uuid::new_v4().to_string(),
        station_id: station,
        name: req.name.trim().to_string(),
        format: req.format.unwrap_or_else(|| "mp3".to_string()),
        bitrate: req.bitrate.unwrap_or(128),
    };

    let mount = diesel::insert_into(mounts::table)
        .values(&new_mount)
        .returning(Mount::as_select())
        .get_result(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(mount)))
}
