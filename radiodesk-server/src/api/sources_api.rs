//! Source pickers for the schedule editor.

use crate::models::{ClockTemplate, MediaItem, Playlist, SmartBlock, Webstream};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;

const MEDIA_SEARCH_LIMIT: i64 = 20;

#[derive(Deserialize)]
pub struct MediaSearch {
    pub q: Option<String>,
}

pub async fn list_playlists(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<Vec<Playlist>>, StatusCode> {
    use crate::schema::playlists::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results = playlists
        .filter(station_id.eq(&station))
        .order(name.asc())
        .select(Playlist::as_select())
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}

pub async fn list_smart_blocks(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<Vec<SmartBlock>>, StatusCode> {
    use crate::schema::smart_blocks::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results = smart_blocks
        .filter(station_id.eq(&station))
        .order(name.asc())
        .select(SmartBlock::as_select())
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}

pub async fn list_clocks(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<Vec<ClockTemplate>>, StatusCode> {
    use crate::schema::clock_templates::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results = clock_templates
        .filter(station_id.eq(&station))
        .order(name.asc())
        .select(ClockTemplate::as_select())
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}

pub async fn list_webstreams(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<Vec<Webstream>>, StatusCode> {
    use crate::schema::webstreams::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results = webstreams
        .filter(station_id.eq(&station))
        .order(name.asc())
        .select(Webstream::as_select())
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}

/// Substring search over title, artist and album.
pub async fn search_media(
    State(state): State<AppState>,
    Path(station): Path<String>,
    Query(search): Query<MediaSearch>,
) -> Result<Json<Vec<MediaItem>>, StatusCode> {
    use crate::schema::media_items::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut query = media_items
        .filter(station_id.eq(&station))
        .select(MediaItem::as_select())
        .into_boxed();
    if let Some(term) = search.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = format!("%{}%", term);
        query = query.filter(
            title
                .like(pattern.clone())
                .or(artist.like(pattern.clone()))
                .or(album.like(pattern)),
        );
    }

    let results = query
        .order(title.asc())
        .limit(MEDIA_SEARCH_LIMIT)
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}
