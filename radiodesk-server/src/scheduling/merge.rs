use super::recurrence;
use super::ScheduleEntry;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

/// Identity of a broadcast slot, independent of how the row is keyed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    mount_id: String,
    source_type: String,
    source_id: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl From<&ScheduleEntry> for SlotKey {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            mount_id: entry.mount_id.clone(),
            source_type: entry.source_type.as_str().to_string(),
            source_id: entry.source_id.clone(),
            starts_at: entry.starts_at,
            ends_at: entry.ends_at,
        }
    }
}

/// Template occurrences that already have a materialized override.
pub type OverriddenSlots = HashSet<(String, NaiveDate)>;

/// Merges stored rows with the virtual occurrences of `templates`.
///
/// Virtual rows whose (template, date) is overridden are dropped, then rows
/// sharing a slot are collapsed with stored rows taking precedence. The result
/// is stably sorted by start time.
pub fn merge(
    stored: Vec<ScheduleEntry>,
    templates: &[ScheduleEntry],
    overridden: &OverriddenSlots,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<ScheduleEntry> {
    let virtuals = templates.iter().flat_map(|template| {
        recurrence::expand(template, window_start, window_end).filter(move |occurrence| {
            occurrence
                .instance_date
                .map(|date| !overridden.contains(&(template.id.clone(), date)))
                .unwrap_or(true)
        })
    });

    let mut seen = HashSet::new();
    let mut merged: Vec<ScheduleEntry> = stored
        .into_iter()
        .chain(virtuals)
        .filter(|entry| seen.insert(SlotKey::from(entry)))
        .collect();

    merged.sort_by_key(|entry| entry.starts_at);
    merged
}
