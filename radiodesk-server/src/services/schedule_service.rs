use crate::config::ScheduleConfig;
use crate::scheduling::conflict::{self, RecurringConflictPolicy};
use crate::scheduling::merge;
use crate::scheduling::recurrence;
use crate::scheduling::sources::SourceNames;
use crate::scheduling::store::{self, ResolvedEntry};
use crate::scheduling::{
    RecurrenceRule, RecurrenceType, ScheduleEntry, ScheduleError, SourceType,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Accepts a date, `null` or `""` (no date).
fn blank_or_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Distinguishes an absent key (keep) from `null`/`""` (clear).
fn present_blank_or_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    blank_or_date(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEntry {
    #[serde(default)]
    pub mount_id: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub source_type: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub recurrence_type: RecurrenceType,
    #[serde(default)]
    pub recurrence_days: Vec<u8>,
    #[serde(default, deserialize_with = "blank_or_date")]
    pub recurrence_end_date: Option<NaiveDate>,
}

/// Partial update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryChanges {
    pub mount_id: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_days: Option<Vec<u8>>,
    #[serde(default, deserialize_with = "present_blank_or_date")]
    pub recurrence_end_date: Option<Option<NaiveDate>>,
}

impl EntryChanges {
    fn apply_to(&self, base: &ScheduleEntry) -> ScheduleEntry {
        let mut entry = base.clone();
        if let Some(mount_id) = self.mount_id.as_ref().filter(|m| !m.is_empty()) {
            entry.mount_id = mount_id.clone();
        }
        if let Some(starts_at) = self.starts_at {
            entry.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            entry.ends_at = ends_at;
        }
        if let Some(source_type) = &self.source_type {
            entry.source_type = SourceType::from(source_type.as_str());
        }
        if let Some(source_id) = &self.source_id {
            entry.source_id = source_id.clone();
        }
        if let Some(metadata) = &self.metadata {
            entry.metadata = metadata.clone();
        }
        if let Some(kind) = self.recurrence_type {
            entry.recurrence.kind = kind;
        }
        if let Some(days) = &self.recurrence_days {
            entry.recurrence.days = days.clone();
        }
        if let Some(end_date) = self.recurrence_end_date {
            entry.recurrence.end_date = end_date;
        }
        entry
    }

    fn changes_recurrence(&self) -> bool {
        self.recurrence_type
            .map(|kind| kind != RecurrenceType::None)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Only the addressed occurrence.
    Single,
    /// The stored row, or the whole series when addressed through an occurrence.
    #[default]
    All,
}

#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub mount_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceSummary {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    pub days: Vec<u8>,
    pub end_date: Option<NaiveDate>,
    pub parent_id: Option<String>,
}

/// One row of a schedule view.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledOccurrence {
    #[serde(flatten)]
    pub entry: ScheduleEntry,
    pub title: String,
    pub source_label: String,
    pub recurrence: Option<RecurrenceSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    SeriesDeleted { overrides: usize },
    OverrideDeleted,
    /// A virtual occurrence with nothing stored behind it.
    NothingToDelete,
}

pub struct ScheduleService {
    config: ScheduleConfig,
}

impl ScheduleService {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Query window used when a caller gives no bounds.
    pub fn default_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now - Duration::hours(self.config.default_window_hours_before),
            now + Duration::hours(self.config.default_window_hours_after),
        )
    }

    /// Stored and virtual entries starting inside the window, merged,
    /// deduplicated and sorted.
    pub fn entries_in_window(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        mount_id: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        let stored = store::load_window(conn, station_id, mount_id, start, end)?;
        let templates = store::load_templates(conn, station_id, mount_id, end)?;
        let template_ids: Vec<String> = templates.iter().map(|t| t.id.clone()).collect();
        let overridden =
            store::overridden_slots(conn, &template_ids, start.date_naive(), end.date_naive())?;

        Ok(merge::merge(stored, &templates, &overridden, start, end))
    }

    pub fn query(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        window: &ScheduleWindow,
    ) -> Result<Vec<ScheduledOccurrence>, ScheduleError> {
        if window.end < window.start {
            return Err(ScheduleError::validation("end must not be before start"));
        }
        store::find_station(conn, station_id)?;

        let mount_id = window.mount_id.as_deref().filter(|m| !m.is_empty());
        let mut entries =
            self.entries_in_window(conn, station_id, mount_id, window.start, window.end)?;
        if let Some(limit) = window.limit {
            entries.truncate(limit);
        }

        let names = SourceNames::load(conn, &entries)?;
        let parents = self.parent_rules(conn, &entries)?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let recurrence = summarize(&entry, &parents);
                ScheduledOccurrence {
                    title: names.title_for(&entry),
                    source_label: entry.source_type.label().to_string(),
                    recurrence,
                    entry,
                }
            })
            .collect())
    }

    /// The dashboard's "coming up" list.
    pub fn upcoming(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<ScheduledOccurrence>, ScheduleError> {
        let window = ScheduleWindow {
            start: from,
            end: from + Duration::hours(self.config.upcoming_horizon_hours),
            mount_id: None,
            limit: Some(self.config.upcoming_limit),
        };
        self.query(conn, station_id, &window)
    }

    // Recurrence rules of the templates behind stored overrides.
    fn parent_rules(
        &self,
        conn: &mut SqliteConnection,
        entries: &[ScheduleEntry],
    ) -> Result<HashMap<String, RecurrenceRule>, ScheduleError> {
        let mut rules = HashMap::new();
        for entry in entries {
            let Some(parent_id) = entry.recurrence_parent_id.as_ref() else {
                continue;
            };
            if entry.recurrence.is_recurring() || rules.contains_key(parent_id) {
                continue;
            }
            if let Some(parent) = store::find(conn, parent_id)? {
                rules.insert(parent_id.clone(), parent.recurrence);
            }
        }
        Ok(rules)
    }

    pub fn create(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        input: NewEntry,
    ) -> Result<ScheduleEntry, ScheduleError> {
        store::find_station(conn, station_id)?;

        let mount_id = match input.mount_id.as_deref().filter(|m| !m.is_empty()) {
            Some(mount_id) => checked_mount(conn, station_id, mount_id)?,
            None => store::first_mount(conn, station_id)?
                .map(|mount| mount.id)
                .ok_or_else(|| ScheduleError::validation("station has no mounts"))?,
        };

        let recurrence = RecurrenceRule {
            kind: input.recurrence_type,
            days: input.recurrence_days,
            end_date: input.recurrence_end_date,
        };
        let entry = ScheduleEntry {
            id: uuid::Uuid::new_v4().to_string(),
            station_id: station_id.to_string(),
            mount_id,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            source_type: SourceType::from(input.source_type.as_str()),
            source_id: input.source_id,
            metadata: input.metadata,
            is_instance: !recurrence.is_recurring(),
            recurrence,
            recurrence_parent_id: None,
            instance_date: None,
        };
        validate(&entry)?;

        conn.immediate_transaction(|conn| {
            self.ensure_free(conn, &entry, &[])?;
            store::insert(conn, &entry)
        })?;

        tracing::info!(
            "Created schedule entry {} ({} {}) on mount {}",
            entry.id,
            entry.source_type,
            entry.recurrence.kind.as_str(),
            entry.mount_id
        );
        Ok(entry)
    }

    pub fn update(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        id: &str,
        changes: &EntryChanges,
        mode: EditMode,
    ) -> Result<ScheduleEntry, ScheduleError> {
        match mode {
            EditMode::Single => self.update_one(conn, station_id, id, changes),
            EditMode::All => self.update_all(conn, station_id, id, changes),
        }
    }

    /// Rewrites the stored row behind `id`. Through a virtual id the whole
    /// series moves by the same offset as the addressed occurrence.
    pub fn update_all(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        id: &str,
        changes: &EntryChanges,
    ) -> Result<ScheduleEntry, ScheduleError> {
        match store::resolve(conn, station_id, id)? {
            ResolvedEntry::Stored(entry) => self.rewrite(conn, station_id, entry, changes),
            ResolvedEntry::Occurrence {
                template: Some(template),
                date,
                ..
            } => {
                let occurrence = occurrence_on(&template, date)
                    .ok_or_else(|| ScheduleError::NotFound(format!("occurrence {}", id)))?;
                let shift = |base: DateTime<Utc>, to: DateTime<Utc>, from: DateTime<Utc>| {
                    base.checked_add_signed(to - from)
                        .ok_or_else(|| ScheduleError::validation("shifted series is out of range"))
                };
                let shifted = EntryChanges {
                    starts_at: changes
                        .starts_at
                        .map(|s| shift(template.starts_at, s, occurrence.starts_at))
                        .transpose()?,
                    ends_at: changes
                        .ends_at
                        .map(|e| shift(template.ends_at, e, occurrence.ends_at))
                        .transpose()?,
                    ..changes.clone()
                };
                self.rewrite(conn, station_id, template, &shifted)
            }
            ResolvedEntry::Occurrence {
                template: None,
                materialized: Some(existing),
                ..
            } => self.rewrite(conn, station_id, existing, changes),
            ResolvedEntry::Occurrence { .. } => {
                Err(ScheduleError::NotFound(format!("schedule entry {}", id)))
            }
        }
    }

    fn rewrite(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        current: ScheduleEntry,
        changes: &EntryChanges,
    ) -> Result<ScheduleEntry, ScheduleError> {
        if current.is_occurrence() && changes.changes_recurrence() {
            return Err(ScheduleError::validation(
                "an occurrence override cannot become recurring",
            ));
        }
        if let Some(mount_id) = changes.mount_id.as_deref().filter(|m| !m.is_empty()) {
            checked_mount(conn, station_id, mount_id)?;
        }

        let mut updated = changes.apply_to(&current);
        if !updated.is_occurrence() {
            updated.is_instance = !updated.recurrence.is_recurring();
        }
        validate(&updated)?;

        if updated.is_template() {
            store::save(conn, &updated)?;
        } else {
            let demoted = current.is_template();
            conn.immediate_transaction(|conn| {
                if demoted {
                    let overrides = store::delete_overrides(conn, &updated.id)?;
                    tracing::info!(
                        "Schedule entry {} is no longer recurring; dropped {} overrides",
                        updated.id,
                        overrides
                    );
                }
                self.ensure_free(conn, &updated, &[])?;
                store::save(conn, &updated)
            })?;
        }

        tracing::info!("Updated schedule entry {}", updated.id);
        Ok(updated)
    }

    /// Edits a single occurrence through an override row; the template is
    /// never touched.
    pub fn update_one(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        id: &str,
        changes: &EntryChanges,
    ) -> Result<ScheduleEntry, ScheduleError> {
        if changes.changes_recurrence() {
            return Err(ScheduleError::validation(
                "an occurrence override cannot become recurring",
            ));
        }

        match store::resolve(conn, station_id, id)? {
            ResolvedEntry::Stored(entry) if entry.is_template() => Err(ScheduleError::validation(
                "single edits need an occurrence id, not a template id",
            )),
            ResolvedEntry::Stored(entry) => self.rewrite(conn, station_id, entry, changes),
            ResolvedEntry::Occurrence {
                materialized: Some(existing),
                ..
            } => self.rewrite(conn, station_id, existing, changes),
            ResolvedEntry::Occurrence {
                template: Some(template),
                materialized: None,
                date,
                ..
            } => {
                let occurrence = occurrence_on(&template, date)
                    .ok_or_else(|| ScheduleError::NotFound(format!("occurrence {}", id)))?;
                if let Some(mount_id) = changes.mount_id.as_deref().filter(|m| !m.is_empty()) {
                    checked_mount(conn, station_id, mount_id)?;
                }

                let mut materialized = changes.apply_to(&occurrence);
                materialized.id = uuid::Uuid::new_v4().to_string();
                materialized.recurrence = RecurrenceRule::none();
                materialized.is_instance = true;
                materialized.recurrence_parent_id = Some(template.id.clone());
                materialized.instance_date = Some(date);
                validate(&materialized)?;

                conn.immediate_transaction(|conn| {
                    self.ensure_free(conn, &materialized, &[occurrence.id.as_str()])?;
                    store::insert(conn, &materialized)
                })?;

                tracing::info!(
                    "Materialized occurrence {} of {} as {}",
                    date,
                    template.id,
                    materialized.id
                );
                Ok(materialized)
            }
            ResolvedEntry::Occurrence { .. } => {
                Err(ScheduleError::NotFound(format!("schedule entry {}", id)))
            }
        }
    }

    pub fn delete_one(
        &self,
        conn: &mut SqliteConnection,
        station_id: &str,
        id: &str,
    ) -> Result<DeleteOutcome, ScheduleError> {
        let outcome = match store::resolve(conn, station_id, id)? {
            ResolvedEntry::Stored(entry) if entry.is_template() => DeleteOutcome::SeriesDeleted {
                overrides: store::delete_template(conn, &entry.id)?,
            },
            ResolvedEntry::Stored(entry) => {
                store::delete(conn, &entry.id)?;
                DeleteOutcome::Deleted
            }
            ResolvedEntry::Occurrence {
                materialized: Some(existing),
                ..
            } => {
                store::delete(conn, &existing.id)?;
                DeleteOutcome::OverrideDeleted
            }
            ResolvedEntry::Occurrence {
                materialized: None, ..
            } => DeleteOutcome::NothingToDelete,
        };

        match outcome {
            DeleteOutcome::NothingToDelete => {
                tracing::debug!("Delete of virtual occurrence {} had nothing stored", id)
            }
            _ => tracing::info!("Deleted schedule entry {} ({:?})", id, outcome),
        }
        Ok(outcome)
    }

    /// Fails with a conflict if any range `candidate` would occupy overlaps
    /// an existing entry on its mount. Ids in `exclude` are ignored.
    fn ensure_free(
        &self,
        conn: &mut SqliteConnection,
        candidate: &ScheduleEntry,
        exclude: &[&str],
    ) -> Result<(), ScheduleError> {
        let outcome = if candidate.is_template() {
            self.check_template(conn, candidate, exclude)?
        } else {
            let occupants = self.occupants(conn, candidate, exclude)?;
            conflict::check(candidate, &occupants)
        };

        outcome.map_err(|found| {
            tracing::warn!(
                "Rejected schedule entry on mount {}: overlaps {}",
                candidate.mount_id,
                found
            );
            ScheduleError::Conflict(found)
        })
    }

    // Every stored row the template could ever reach, plus the mount's other
    // templates when recurring conflicts are enforced.
    fn check_template(
        &self,
        conn: &mut SqliteConnection,
        candidate: &ScheduleEntry,
        exclude: &[&str],
    ) -> Result<Result<(), conflict::Conflict>, ScheduleError> {
        // Nothing the series occupies runs past the last occurrence's end.
        let last_start = match candidate.recurrence.end_date {
            Some(end) => end
                .succ_opt()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .and_then(|midnight| midnight.and_utc().checked_add_signed(candidate.duration()))
                .map(Some)
                .ok_or_else(|| ScheduleError::validation("recurrence end date is out of range"))?,
            None => None,
        };

        let mut rows =
            store::load_reachable(conn, &candidate.mount_id, candidate.starts_at, last_start)?;
        rows.retain(|row| !exclude.contains(&row.id.as_str()));

        let templates = match self.config.recurring_conflicts {
            RecurringConflictPolicy::Enforce => {
                store::load_mount_templates(conn, &candidate.mount_id, last_start)?
            }
            RecurringConflictPolicy::Ignore => Vec::new(),
        };

        Ok(conflict::check_template(candidate, &rows, &templates))
    }

    // Entries on the candidate's mount that could overlap it.
    fn occupants(
        &self,
        conn: &mut SqliteConnection,
        candidate: &ScheduleEntry,
        exclude: &[&str],
    ) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        let mut occupants = store::load_overlapping(
            conn,
            &candidate.mount_id,
            candidate.starts_at,
            candidate.ends_at,
        )?;

        if self.config.recurring_conflicts == RecurringConflictPolicy::Enforce {
            let mut templates =
                store::load_mount_templates(conn, &candidate.mount_id, Some(candidate.ends_at))?;
            // A template being demoted to a one-off must not meet its own series.
            templates.retain(|template| template.id != candidate.id);

            let longest = templates
                .iter()
                .map(ScheduleEntry::duration)
                .max()
                .unwrap_or_else(Duration::zero);
            let template_ids: Vec<String> = templates.iter().map(|t| t.id.clone()).collect();
            let overridden = store::overridden_slots(
                conn,
                &template_ids,
                (candidate.starts_at - longest).date_naive(),
                candidate.ends_at.date_naive(),
            )?;

            for template in &templates {
                let virtuals = recurrence::expand(
                    template,
                    candidate.starts_at - template.duration(),
                    candidate.ends_at,
                )
                .filter(|occurrence| {
                    occurrence
                        .instance_date
                        .map(|date| !overridden.contains(&(template.id.clone(), date)))
                        .unwrap_or(true)
                });
                occupants.extend(virtuals);
            }
        }

        occupants.retain(|entry| !exclude.contains(&entry.id.as_str()));
        Ok(occupants)
    }
}

/// Entries must start and end within these years.
const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

fn validate(entry: &ScheduleEntry) -> Result<(), ScheduleError> {
    let in_range = |instant: DateTime<Utc>| SUPPORTED_YEARS.contains(&instant.year());
    if !in_range(entry.starts_at) || !in_range(entry.ends_at) {
        return Err(ScheduleError::validation(format!(
            "entries must fall between the years {} and {}",
            SUPPORTED_YEARS.start(),
            SUPPORTED_YEARS.end()
        )));
    }
    if let Some(end) = entry.recurrence.end_date {
        if !SUPPORTED_YEARS.contains(&end.year()) {
            return Err(ScheduleError::validation("recurrence end date is out of range"));
        }
    }
    if entry.ends_at <= entry.starts_at {
        return Err(ScheduleError::validation("ends_at must be after starts_at"));
    }
    if entry.source_type.as_str().trim().is_empty() {
        return Err(ScheduleError::validation("source_type is required"));
    }
    if entry.source_type.requires_source_id() && entry.source_id.trim().is_empty() {
        return Err(ScheduleError::validation(format!(
            "source_id is required for {} entries",
            entry.source_type
        )));
    }
    entry
        .recurrence
        .validate(entry.starts_at)
        .map_err(ScheduleError::Validation)
}

fn checked_mount(
    conn: &mut SqliteConnection,
    station_id: &str,
    mount_id: &str,
) -> Result<String, ScheduleError> {
    store::find_mount(conn, station_id, mount_id)?
        .map(|mount| mount.id)
        .ok_or_else(|| {
            ScheduleError::validation(format!("mount {} does not belong to this station", mount_id))
        })
}

/// The virtual occurrence of `template` dated `date`, if the rule produces one.
fn occurrence_on(template: &ScheduleEntry, date: NaiveDate) -> Option<ScheduleEntry> {
    let day_start = date.and_hms_opt(0, 0, 0)?.and_utc();
    let day_end = day_start
        .checked_add_signed(Duration::days(1) - Duration::seconds(1))?;
    recurrence::expand(template, day_start, day_end)
        .find(|occurrence| occurrence.instance_date == Some(date))
}

fn summarize(
    entry: &ScheduleEntry,
    parents: &HashMap<String, RecurrenceRule>,
) -> Option<RecurrenceSummary> {
    let rule = if entry.recurrence.is_recurring() {
        Some(&entry.recurrence)
    } else {
        entry
            .recurrence_parent_id
            .as_ref()
            .and_then(|parent| parents.get(parent))
    };

    if rule.is_none() && entry.recurrence_parent_id.is_none() {
        return None;
    }
    let rule = rule.cloned().unwrap_or_default();
    Some(RecurrenceSummary {
        kind: rule.kind,
        days: rule.days,
        end_date: rule.end_date,
        parent_id: entry.recurrence_parent_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_station, test_pool};
    use crate::scheduling::instance_id;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, day, hour, minute, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    fn one_off(start: DateTime<Utc>, end: DateTime<Utc>) -> NewEntry {
        NewEntry {
            mount_id: None,
            starts_at: start,
            ends_at: end,
            source_type: "playlist".to_string(),
            source_id: "p1".to_string(),
            metadata: Map::new(),
            recurrence_type: RecurrenceType::None,
            recurrence_days: vec![],
            recurrence_end_date: None,
        }
    }

    fn daily(start: DateTime<Utc>, end: DateTime<Utc>) -> NewEntry {
        NewEntry {
            recurrence_type: RecurrenceType::Daily,
            ..one_off(start, end)
        }
    }

    fn whole_days(from: u32, to: u32) -> ScheduleWindow {
        ScheduleWindow {
            start: at(from, 0, 0),
            end: at(to, 23, 59),
            mount_id: None,
            limit: None,
        }
    }

    fn ids(rows: &[ScheduledOccurrence]) -> Vec<String> {
        rows.iter().map(|row| row.entry.id.clone()).collect()
    }

    #[test]
    fn overlapping_one_off_is_rejected_and_boundary_is_allowed() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Conflict FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let first = service
            .create(&mut conn, &station, one_off(at(19, 10, 0), at(19, 11, 0)))
            .unwrap();

        let err = service
            .create(&mut conn, &station, one_off(at(19, 10, 30), at(19, 11, 30)))
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        match err {
            ScheduleError::Conflict(conflict) => assert_eq!(conflict.entry_id, first.id),
            other => panic!("expected conflict, got {:?}", other),
        }

        service
            .create(&mut conn, &station, one_off(at(19, 11, 0), at(19, 12, 0)))
            .unwrap();
    }

    #[test]
    fn recurring_occurrences_block_one_offs_unless_ignored() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Policy FM");

        let enforcing = ScheduleService::new(ScheduleConfig::default());
        enforcing
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();

        let clash = one_off(at(20, 9, 15), at(20, 9, 45));
        assert!(matches!(
            enforcing.create(&mut conn, &station, clash.clone()),
            Err(ScheduleError::Conflict(_))
        ));

        let ignoring = ScheduleService::new(ScheduleConfig {
            recurring_conflicts: RecurringConflictPolicy::Ignore,
            ..ScheduleConfig::default()
        });
        ignoring.create(&mut conn, &station, clash).unwrap();
    }

    #[test]
    fn new_template_is_checked_against_its_early_occurrences() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Week FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        // 2026-02-21 is the fourth day of a series starting 2026-02-18.
        service
            .create(&mut conn, &station, one_off(at(21, 9, 0), at(21, 10, 0)))
            .unwrap();
        assert!(matches!(
            service.create(&mut conn, &station, daily(at(18, 9, 30), at(18, 10, 30))),
            Err(ScheduleError::Conflict(_))
        ));
    }

    #[test]
    fn new_template_is_checked_against_rows_weeks_ahead() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Far Ahead FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let later = service
            .create(&mut conn, &station, one_off(at(15, 9, 0), at(15, 10, 0)))
            .unwrap();
        match service.create(&mut conn, &station, daily(at(1, 9, 30), at(1, 10, 30))) {
            Err(ScheduleError::Conflict(conflict)) => assert_eq!(conflict.entry_id, later.id),
            other => panic!("expected conflict, got {:?}", other),
        }

        let ended = NewEntry {
            recurrence_end_date: Some(date(14)),
            ..daily(at(1, 9, 30), at(1, 10, 30))
        };
        service.create(&mut conn, &station, ended).unwrap();
    }

    #[test]
    fn new_template_is_checked_against_templates_starting_later() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Double Booked FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let existing = service
            .create(&mut conn, &station, daily(at(20, 9, 0), at(20, 10, 0)))
            .unwrap();
        let rival = NewEntry {
            source_id: "p2".to_string(),
            ..daily(at(1, 9, 0), at(1, 10, 0))
        };
        match service.create(&mut conn, &station, rival.clone()) {
            Err(ScheduleError::Conflict(conflict)) => {
                assert_eq!(conflict.entry_id, instance_id::virtual_id(&existing.id, date(20)))
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        let ignoring = ScheduleService::new(ScheduleConfig {
            recurring_conflicts: RecurringConflictPolicy::Ignore,
            ..ScheduleConfig::default()
        });
        ignoring.create(&mut conn, &station, rival).unwrap();
    }

    #[test]
    fn demoting_a_template_keeps_its_slot_and_drops_overrides() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Demotion FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let moved = service
            .update_one(
                &mut conn,
                &station,
                &instance_id::virtual_id(&template.id, date(20)),
                &EntryChanges {
                    starts_at: Some(at(20, 15, 0)),
                    ends_at: Some(at(20, 15, 30)),
                    ..EntryChanges::default()
                },
            )
            .unwrap();

        let demote = EntryChanges {
            recurrence_type: Some(RecurrenceType::None),
            ..EntryChanges::default()
        };
        let demoted = service
            .update_all(&mut conn, &station, &template.id, &demote)
            .unwrap();
        assert!(demoted.is_instance);
        assert!(!demoted.recurrence.is_recurring());
        assert_eq!(demoted.starts_at, at(1, 9, 0));
        assert!(store::find(&mut conn, &moved.id).unwrap().is_none());

        assert!(service
            .query(&mut conn, &station, &whole_days(19, 21))
            .unwrap()
            .is_empty());
        assert_eq!(
            service.delete_one(&mut conn, &station, &template.id).unwrap(),
            DeleteOutcome::Deleted
        );
    }

    #[test]
    fn instants_near_the_calendar_limit_are_rejected() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Far Future FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let starts_at = NaiveDate::from_ymd_opt(262142, 12, 30)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();
        let err = service
            .create(
                &mut conn,
                &station,
                daily(starts_at, starts_at + Duration::hours(1)),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn single_edit_only_touches_one_occurrence() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Isolation FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let target = instance_id::virtual_id(&template.id, date(20));

        let changes = EntryChanges {
            starts_at: Some(at(20, 15, 0)),
            ends_at: Some(at(20, 15, 30)),
            ..EntryChanges::default()
        };
        let created = service
            .update(&mut conn, &station, &target, &changes, EditMode::Single)
            .unwrap();
        assert_eq!(created.recurrence_parent_id.as_deref(), Some(template.id.as_str()));
        assert_eq!(created.instance_date, Some(date(20)));
        assert!(created.is_instance);
        assert!(matches!(
            instance_id::parse(&created.id),
            instance_id::EntryRef::Stored(_)
        ));

        let rows = service.query(&mut conn, &station, &whole_days(19, 21)).unwrap();
        assert_eq!(
            ids(&rows),
            vec![
                instance_id::virtual_id(&template.id, date(19)),
                created.id.clone(),
                instance_id::virtual_id(&template.id, date(21)),
            ]
        );
        assert_eq!(rows[0].entry.starts_at, at(19, 9, 0));
        assert_eq!(rows[2].entry.starts_at, at(21, 9, 0));
        assert_eq!(
            rows[1].recurrence.as_ref().map(|r| r.kind),
            Some(RecurrenceType::Daily)
        );

        let stored_template = store::find(&mut conn, &template.id).unwrap().unwrap();
        assert_eq!(stored_template, template);

        // A second single edit updates the same override.
        let again = service
            .update(
                &mut conn,
                &station,
                &target,
                &EntryChanges {
                    starts_at: Some(at(20, 16, 0)),
                    ends_at: Some(at(20, 16, 30)),
                    ..EntryChanges::default()
                },
                EditMode::Single,
            )
            .unwrap();
        assert_eq!(again.id, created.id);
    }

    #[test]
    fn override_with_same_slot_replaces_virtual_occurrence() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Dedup FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let mut metadata = Map::new();
        metadata.insert("title".to_string(), json!("Special Edition"));
        let created = service
            .update_one(
                &mut conn,
                &station,
                &instance_id::virtual_id(&template.id, date(20)),
                &EntryChanges {
                    metadata: Some(metadata),
                    ..EntryChanges::default()
                },
            )
            .unwrap();

        let rows = service.query(&mut conn, &station, &whole_days(20, 20)).unwrap();
        assert_eq!(ids(&rows), vec![created.id]);
        assert_eq!(rows[0].title, "Special Edition");
    }

    #[test]
    fn deleting_unmaterialized_occurrence_is_a_no_op() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Noop FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let virtual_id = instance_id::virtual_id(&template.id, date(20));

        let outcome = service.delete_one(&mut conn, &station, &virtual_id).unwrap();
        assert_eq!(outcome, DeleteOutcome::NothingToDelete);
        assert!(store::find(&mut conn, &template.id).unwrap().is_some());

        let rows = service.query(&mut conn, &station, &whole_days(20, 20)).unwrap();
        assert_eq!(ids(&rows), vec![virtual_id]);
    }

    #[test]
    fn deleting_override_restores_virtual_occurrence() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Restore FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let virtual_id = instance_id::virtual_id(&template.id, date(20));
        let created = service
            .update_one(
                &mut conn,
                &station,
                &virtual_id,
                &EntryChanges {
                    starts_at: Some(at(20, 12, 0)),
                    ends_at: Some(at(20, 12, 30)),
                    ..EntryChanges::default()
                },
            )
            .unwrap();

        let before = service.query(&mut conn, &station, &whole_days(20, 20)).unwrap();
        assert_eq!(ids(&before), vec![created.id.clone()]);

        let outcome = service.delete_one(&mut conn, &station, &virtual_id).unwrap();
        assert_eq!(outcome, DeleteOutcome::OverrideDeleted);
        assert!(store::find(&mut conn, &created.id).unwrap().is_none());

        let after = service.query(&mut conn, &station, &whole_days(20, 20)).unwrap();
        assert_eq!(ids(&after), vec![virtual_id]);
        assert_eq!(after[0].entry.starts_at, at(20, 9, 0));
    }

    #[test]
    fn override_survives_deleted_template_until_deleted_by_virtual_id() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, mount) = seed_station(&mut conn, "Orphan FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let orphan = ScheduleEntry {
            id: uuid::Uuid::new_v4().to_string(),
            station_id: station.clone(),
            mount_id: mount,
            starts_at: at(20, 9, 0),
            ends_at: at(20, 9, 30),
            source_type: SourceType::Live,
            source_id: String::new(),
            metadata: Map::new(),
            recurrence: RecurrenceRule::none(),
            is_instance: true,
            recurrence_parent_id: Some("gone-template".to_string()),
            instance_date: Some(date(20)),
        };
        store::insert(&mut conn, &orphan).unwrap();

        let outcome = service
            .delete_one(&mut conn, &station, "gone-template_20260220")
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::OverrideDeleted);
        assert!(store::find(&mut conn, &orphan.id).unwrap().is_none());
    }

    #[test]
    fn deleting_template_removes_series_and_overrides() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Series FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        service
            .update_one(
                &mut conn,
                &station,
                &instance_id::virtual_id(&template.id, date(20)),
                &EntryChanges {
                    source_id: Some("p2".to_string()),
                    ..EntryChanges::default()
                },
            )
            .unwrap();

        let outcome = service.delete_one(&mut conn, &station, &template.id).unwrap();
        assert_eq!(outcome, DeleteOutcome::SeriesDeleted { overrides: 1 });
        assert!(service
            .query(&mut conn, &station, &whole_days(19, 21))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn edit_all_through_occurrence_shifts_the_series() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Shift FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let updated = service
            .update(
                &mut conn,
                &station,
                &instance_id::virtual_id(&template.id, date(20)),
                &EntryChanges {
                    starts_at: Some(at(20, 10, 0)),
                    ends_at: Some(at(20, 11, 0)),
                    ..EntryChanges::default()
                },
                EditMode::All,
            )
            .unwrap();

        assert_eq!(updated.id, template.id);
        assert_eq!(updated.starts_at, at(1, 10, 0));
        assert_eq!(updated.ends_at, at(1, 11, 0));

        let rows = service.query(&mut conn, &station, &whole_days(21, 21)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entry.starts_at, at(21, 10, 0));
    }

    #[test]
    fn moving_one_off_onto_another_is_rejected() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Move FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        service
            .create(&mut conn, &station, one_off(at(19, 10, 0), at(19, 11, 0)))
            .unwrap();
        let second = service
            .create(&mut conn, &station, one_off(at(19, 12, 0), at(19, 13, 0)))
            .unwrap();

        let result = service.update_all(
            &mut conn,
            &station,
            &second.id,
            &EntryChanges {
                starts_at: Some(at(19, 10, 30)),
                ends_at: Some(at(19, 11, 30)),
                ..EntryChanges::default()
            },
        );
        assert!(matches!(result, Err(ScheduleError::Conflict(_))));

        // Moving within its own range does not collide with itself.
        service
            .update_all(
                &mut conn,
                &station,
                &second.id,
                &EntryChanges {
                    starts_at: Some(at(19, 12, 15)),
                    ends_at: Some(at(19, 13, 15)),
                    ..EntryChanges::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn invalid_input_never_reaches_storage() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Validation FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let backwards = one_off(at(19, 11, 0), at(19, 10, 0));
        assert!(matches!(
            service.create(&mut conn, &station, backwards),
            Err(ScheduleError::Validation(_))
        ));

        let bad_day = NewEntry {
            recurrence_type: RecurrenceType::Custom,
            recurrence_days: vec![1, 7],
            ..one_off(at(19, 10, 0), at(19, 11, 0))
        };
        assert!(matches!(
            service.create(&mut conn, &station, bad_day),
            Err(ScheduleError::Validation(_))
        ));

        let foreign_mount = NewEntry {
            mount_id: Some("not-a-mount".to_string()),
            ..one_off(at(19, 10, 0), at(19, 11, 0))
        };
        assert!(matches!(
            service.create(&mut conn, &station, foreign_mount),
            Err(ScheduleError::Validation(_))
        ));

        let missing_source = NewEntry {
            source_id: String::new(),
            ..one_off(at(19, 10, 0), at(19, 11, 0))
        };
        assert!(matches!(
            service.create(&mut conn, &station, missing_source),
            Err(ScheduleError::Validation(_))
        ));

        assert!(matches!(
            service.create(&mut conn, "no-such-station", one_off(at(19, 10, 0), at(19, 11, 0))),
            Err(ScheduleError::NotFound(_))
        ));

        assert!(service
            .query(&mut conn, &station, &whole_days(19, 19))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn single_edit_cannot_make_an_occurrence_recurring() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Recurring FM");
        let service = ScheduleService::new(ScheduleConfig::default());

        let template = service
            .create(&mut conn, &station, daily(at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let result = service.update_one(
            &mut conn,
            &station,
            &instance_id::virtual_id(&template.id, date(20)),
            &EntryChanges {
                recurrence_type: Some(RecurrenceType::Weekly),
                ..EntryChanges::default()
            },
        );
        assert!(matches!(result, Err(ScheduleError::Validation(_))));

        let template_id_edit = service.update_one(
            &mut conn,
            &station,
            &template.id,
            &EntryChanges::default(),
        );
        assert!(matches!(template_id_edit, Err(ScheduleError::Validation(_))));
    }

    #[test]
    fn upcoming_respects_horizon_and_limit() {
        let (pool, _dir) = test_pool();
        let mut conn = pool.get().unwrap();
        let (station, _) = seed_station(&mut conn, "Upcoming FM");
        let service = ScheduleService::new(ScheduleConfig {
            upcoming_limit: 2,
            ..ScheduleConfig::default()
        });

        for hour in [8, 10, 12, 14] {
            service
                .create(&mut conn, &station, one_off(at(19, hour, 0), at(19, hour, 30)))
                .unwrap();
        }
        service
            .create(&mut conn, &station, one_off(at(21, 8, 0), at(21, 8, 30)))
            .unwrap();

        let rows = service.upcoming(&mut conn, &station, at(19, 9, 0)).unwrap();
        let starts: Vec<_> = rows.iter().map(|r| r.entry.starts_at).collect();
        assert_eq!(starts, vec![at(19, 10, 0), at(19, 12, 0)]);
        assert_eq!(rows[0].source_label, "Playlist");
    }

    #[test]
    fn clearing_the_end_date_with_an_empty_string() {
        let changes: EntryChanges =
            serde_json::from_value(json!({ "recurrence_end_date": "" })).unwrap();
        assert_eq!(changes.recurrence_end_date, Some(None));

        let untouched: EntryChanges = serde_json::from_value(json!({})).unwrap();
        assert_eq!(untouched.recurrence_end_date, None);

        let set: EntryChanges =
            serde_json::from_value(json!({ "recurrence_end_date": "2026-03-01" })).unwrap();
        assert_eq!(
            set.recurrence_end_date,
            Some(NaiveDate::from_ymd_opt(2026, 3, 1))
        );
    }
}
