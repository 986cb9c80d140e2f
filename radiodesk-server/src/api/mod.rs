pub mod auth_api;
pub mod schedules_api;
pub mod sources_api;
pub mod stations_api;
pub mod users_api;

use crate::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

pub fn routes(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        // Stations
        .route(
            "/stations",
            get(stations_api::list_stations).post(stations_api::create_station),
        )
        .route(
            "/stations/:station_id/mounts",
            get(stations_api::list_mounts).post(stations_api::create_mount),
        )
        // Schedule
        .route(
            "/stations/:station_id/schedule",
            get(schedules_api::get_schedule),
        )
        .route(
            "/stations/:station_id/schedule/upcoming",
            get(schedules_api::get_upcoming),
        )
        .route(
            "/stations/:station_id/schedule/entries",
            post(schedules_api::create_entry),
        )
        .route(
            "/stations/:station_id/schedule/entries/:entry_id",
            put(schedules_api::update_entry).delete(schedules_api::delete_entry),
        )
        // Source pickers
        .route(
            "/stations/:station_id/sources/playlists",
            get(sources_api::list_playlists),
        )
        .route(
            "/stations/:station_id/sources/smart-blocks",
            get(sources_api::list_smart_blocks),
        )
        .route(
            "/stations/:station_id/sources/clocks",
            get(sources_api::list_clocks),
        )
        .route(
            "/stations/:station_id/sources/webstreams",
            get(sources_api::list_webstreams),
        )
        .route(
            "/stations/:station_id/sources/media",
            get(sources_api::search_media),
        )
        // Users
        .route(
            "/users",
            get(users_api::list_users).post(users_api::create_user),
        )
        .route(
            "/users/:id",
            put(users_api::update_user).delete(users_api::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::auth::middleware::auth_middleware,
        ));

    Router::new()
        // Public auth endpoints
        .route("/auth/login", post(auth_api::login))
        .route("/auth/logout", post(auth_api::logout))
        .merge(protected_routes)
}
