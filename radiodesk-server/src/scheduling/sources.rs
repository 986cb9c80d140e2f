use super::{ScheduleEntry, ScheduleError, SourceType};
use crate::models::MediaItem;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::{BTreeSet, HashMap};

/// Display names of the sources referenced by a batch of entries.
#[derive(Debug, Default)]
pub struct SourceNames {
    playlists: HashMap<String, String>,
    smart_blocks: HashMap<String, String>,
    clock_templates: HashMap<String, String>,
    webstreams: HashMap<String, String>,
    media: HashMap<String, String>,
}

fn ids_of(entries: &[ScheduleEntry], kind: &SourceType) -> Vec<String> {
    entries
        .iter()
        .filter(|e| &e.source_type == kind && !e.source_id.is_empty())
        .map(|e| e.source_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl SourceNames {
    /// Loads names with one query per referenced source table.
    pub fn load(
        conn: &mut SqliteConnection,
        entries: &[ScheduleEntry],
    ) -> Result<Self, ScheduleError> {
        let mut names = SourceNames::default();

        let ids = ids_of(entries, &SourceType::Playlist);
        if !ids.is_empty() {
            use crate::schema::playlists::dsl;
            names.playlists = dsl::playlists
                .filter(dsl::id.eq_any(&ids))
                .select((dsl::id, dsl::name))
                .load::<(String, String)>(conn)?
                .into_iter()
                .collect();
        }

        let ids = ids_of(entries, &SourceType::SmartBlock);
        if !ids.is_empty() {
            use crate::schema::smart_blocks::dsl;
            names.smart_blocks = dsl::smart_blocks
                .filter(dsl::id.eq_any(&ids))
                .select((dsl::id, dsl::name))
                .load::<(String, String)>(conn)?
                .into_iter()
                .collect();
        }

        let ids = ids_of(entries, &SourceType::ClockTemplate);
        if !ids.is_empty() {
            use crate::schema::clock_templates::dsl;
            names.clock_templates = dsl::clock_templates
                .filter(dsl::id.eq_any(&ids))
                .select((dsl::id, dsl::name))
                .load::<(String, String)>(conn)?
                .into_iter()
                .collect();
        }

        let ids = ids_of(entries, &SourceType::Webstream);
        if !ids.is_empty() {
            use crate::schema::webstreams::dsl;
            names.webstreams = dsl::webstreams
                .filter(dsl::id.eq_any(&ids))
                .select((dsl::id, dsl::name))
                .load::<(String, String)>(conn)?
                .into_iter()
                .collect();
        }

        let ids = ids_of(entries, &SourceType::Media);
        if !ids.is_empty() {
            use crate::schema::media_items::dsl;
            names.media = dsl::media_items
                .filter(dsl::id.eq_any(&ids))
                .select(MediaItem::as_select())
                .load(conn)?
                .into_iter()
                .map(|item| (item.id.clone(), item.display_name()))
                .collect();
        }

        Ok(names)
    }

    fn lookup(&self, kind: &SourceType, id: &str) -> Option<&str> {
        let table = match kind {
            SourceType::Playlist => &self.playlists,
            SourceType::SmartBlock => &self.smart_blocks,
            SourceType::ClockTemplate => &self.clock_templates,
            SourceType::Webstream => &self.webstreams,
            SourceType::Media => &self.media,
            _ => return None,
        };
        table.get(id).map(String::as_str)
    }

    /// Title shown for an entry in schedule views.
    ///
    /// Named sources use the referenced row's name. Live entries use their
    /// `session_name`, stopsets are always "Stopset", and anything else
    /// falls back to the `title` metadata and then the source label.
    pub fn title_for(&self, entry: &ScheduleEntry) -> String {
        if let Some(name) = self.lookup(&entry.source_type, &entry.source_id) {
            return name.to_string();
        }
        match entry.source_type {
            SourceType::Live => entry
                .metadata_str("session_name")
                .filter(|s| !s.is_empty())
                .unwrap_or("Live Session")
                .to_string(),
            SourceType::Stopset => "Stopset".to_string(),
            _ => entry
                .metadata_str("title")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| entry.source_type.label())
                .to_string(),
        }
    }
}
