//! The programmable broadcast schedule.
//!
//! Templates repeat through a [`RecurrenceRule`] and are expanded on demand
//! into virtual occurrences; single occurrences are overridden by persisted
//! instance rows that never touch the template.

pub mod conflict;
pub mod error;
pub mod instance_id;
pub mod merge;
pub mod recurrence;
pub mod sources;
pub mod store;

pub use error::ScheduleError;
pub use recurrence::{RecurrenceRule, RecurrenceType};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// What an entry plays. Unknown kinds are carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum SourceType {
    Playlist,
    SmartBlock,
    ClockTemplate,
    Webstream,
    Media,
    Live,
    Stopset,
    Other(String),
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::Playlist => "playlist",
            SourceType::SmartBlock => "smart_block",
            SourceType::ClockTemplate => "clock_template",
            SourceType::Webstream => "webstream",
            SourceType::Media => "media",
            SourceType::Live => "live",
            SourceType::Stopset => "stopset",
            SourceType::Other(other) => other,
        }
    }

    /// Human label shown next to the resolved title.
    pub fn label(&self) -> &str {
        match self {
            SourceType::Playlist => "Playlist",
            SourceType::SmartBlock => "Smart Block",
            SourceType::ClockTemplate => "Clock",
            SourceType::Webstream => "Webstream",
            SourceType::Media => "Track",
            SourceType::Live => "Live",
            SourceType::Stopset => "Stopset",
            SourceType::Other(other) => other,
        }
    }

    /// Sources whose `source_id` references a row in a lookup table.
    pub fn requires_source_id(&self) -> bool {
        matches!(
            self,
            SourceType::Playlist
                | SourceType::SmartBlock
                | SourceType::ClockTemplate
                | SourceType::Webstream
                | SourceType::Media
        )
    }
}

impl From<&str> for SourceType {
    fn from(s: &str) -> Self {
        match s {
            "playlist" => SourceType::Playlist,
            "smart_block" => SourceType::SmartBlock,
            "clock_template" => SourceType::ClockTemplate,
            "webstream" => SourceType::Webstream,
            "media" => SourceType::Media,
            "live" => SourceType::Live,
            "stopset" => SourceType::Stopset,
            other => SourceType::Other(other.to_string()),
        }
    }
}

impl From<SourceType> for String {
    fn from(source: SourceType) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A template, one-off entry, override row, or virtual occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub station_id: String,
    pub mount_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub source_type: SourceType,
    pub source_id: String,
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub recurrence: RecurrenceRule,
    pub is_instance: bool,
    pub recurrence_parent_id: Option<String>,
    /// Original date of the occurrence an override or virtual row stands for.
    pub instance_date: Option<NaiveDate>,
}

impl ScheduleEntry {
    pub fn duration(&self) -> Duration {
        self.ends_at - self.starts_at
    }

    /// Recurring rows that only generate occurrences.
    pub fn is_template(&self) -> bool {
        self.recurrence.is_recurring() && !self.is_instance
    }

    /// Overrides and virtual occurrences of some template.
    pub fn is_occurrence(&self) -> bool {
        self.is_instance && self.recurrence_parent_id.is_some()
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}
