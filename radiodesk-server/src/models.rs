use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_DJ: &str = "dj";
pub const ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER, ROLE_DJ];

// User models
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Managers and admins may change a station's schedule.
    pub fn is_manager(&self) -> bool {
        self.role == ROLE_MANAGER || self.is_admin()
    }
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

// Station models
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::stations)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub timezone: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::stations)]
pub struct NewStation {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub timezone: String,
    pub active: bool,
}

// Mount models
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::mounts)]
pub struct Mount {
    pub id: String,
    pub station_id: String,
    pub name: String,
    pub format: String,
    pub bitrate: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::mounts)]
pub struct NewMount {
    pub id: String,
    pub station_id: String,
    pub name: String,
    pub format: String,
    pub bitrate: i32,
}

// Schedule entry rows. JSON columns (metadata, recurrence_days) are decoded
// into `scheduling::ScheduleEntry` by the instance store.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::schedule_entries)]
pub struct ScheduleEntryRow {
    pub id: String,
    pub station_id: String,
    pub mount_id: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub source_type: String,
    pub source_id: String,
    pub metadata: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub recurrence_type: String,
    pub recurrence_days: String,
    pub recurrence_end_date: Option<NaiveDate>,
    pub is_instance: bool,
    pub recurrence_parent_id: Option<String>,
    pub instance_date: Option<NaiveDate>,
}

// Full rewrite of an entry; keeps id, station and created_at.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::schema::schedule_entries)]
#[diesel(treat_none_as_null = true)]
pub struct ScheduleEntryChanges {
    pub mount_id: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub source_type: String,
    pub source_id: String,
    pub metadata: String,
    pub recurrence_type: String,
    pub recurrence_days: String,
    pub recurrence_end_date: Option<NaiveDate>,
    pub is_instance: bool,
    pub recurrence_parent_id: Option<String>,
    pub instance_date: Option<NaiveDate>,
    pub updated_at: NaiveDateTime,
}

// Source models (name lookups and schedule pickers)
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::playlists)]
pub struct Playlist {
    pub id: String,
    pub station_id: String,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::smart_blocks)]
pub struct SmartBlock {
    pub id: String,
    pub station_id: String,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::clock_templates)]
pub struct ClockTemplate {
    pub id: String,
    pub station_id: String,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::webstreams)]
pub struct Webstream {
    pub id: String,
    pub station_id: String,
    pub name: String,
    pub url: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::media_items)]
pub struct MediaItem {
    pub id: String,
    pub station_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: i32,
    pub created_at: NaiveDateTime,
}

impl MediaItem {
    /// "Artist - Title", or just the title when the artist is unknown.
    pub fn display_name(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.artist, self.title)
        }
    }
}
