//! Persistence for templates, one-off entries and override rows.

use super::error::ScheduleError;
use super::instance_id::{self, EntryRef};
use super::merge::OverriddenSlots;
use super::{RecurrenceRule, RecurrenceType, ScheduleEntry, SourceType};
use crate::models::{Mount, ScheduleEntryChanges, ScheduleEntryRow, Station};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde_json::{Map, Value};

impl TryFrom<ScheduleEntryRow> for ScheduleEntry {
    type Error = ScheduleError;

    fn try_from(row: ScheduleEntryRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| ScheduleError::CorruptRow {
            id: row.id.clone(),
            reason,
        };
        let metadata: Map<String, Value> = serde_json::from_str(&row.metadata)
            .map_err(|e| corrupt(format!("metadata: {}", e)))?;
        let days: Vec<u8> = serde_json::from_str(&row.recurrence_days)
            .map_err(|e| corrupt(format!("recurrence_days: {}", e)))?;
        let kind: RecurrenceType = row.recurrence_type.parse().map_err(corrupt)?;

        Ok(ScheduleEntry {
            starts_at: row.starts_at.and_utc(),
            ends_at: row.ends_at.and_utc(),
            source_type: SourceType::from(row.source_type.as_str()),
            metadata,
            recurrence: RecurrenceRule {
                kind,
                days,
                end_date: row.recurrence_end_date,
            },
            id: row.id,
            station_id: row.station_id,
            mount_id: row.mount_id,
            source_id: row.source_id,
            is_instance: row.is_instance,
            recurrence_parent_id: row.recurrence_parent_id,
            instance_date: row.instance_date,
        })
    }
}

fn metadata_json(entry: &ScheduleEntry) -> String {
    Value::Object(entry.metadata.clone()).to_string()
}

fn days_json(entry: &ScheduleEntry) -> String {
    Value::from(entry.recurrence.days.clone()).to_string()
}

fn new_row(entry: &ScheduleEntry, now: NaiveDateTime) -> ScheduleEntryRow {
    ScheduleEntryRow {
        id: entry.id.clone(),
        station_id: entry.station_id.clone(),
        mount_id: entry.mount_id.clone(),
        starts_at: entry.starts_at.naive_utc(),
        ends_at: entry.ends_at.naive_utc(),
        source_type: entry.source_type.as_str().to_string(),
        source_id: entry.source_id.clone(),
        metadata: metadata_json(entry),
        created_at: now,
        updated_at: now,
        recurrence_type: entry.recurrence.kind.as_str().to_string(),
        recurrence_days: days_json(entry),
        recurrence_end_date: entry.recurrence.end_date,
        is_instance: entry.is_instance,
        recurrence_parent_id: entry.recurrence_parent_id.clone(),
        instance_date: entry.instance_date,
    }
}

fn changes(entry: &ScheduleEntry, now: NaiveDateTime) -> ScheduleEntryChanges {
    ScheduleEntryChanges {
        mount_id: entry.mount_id.clone(),
        starts_at: entry.starts_at.naive_utc(),
        ends_at: entry.ends_at.naive_utc(),
        source_type: entry.source_type.as_str().to_string(),
        source_id: entry.source_id.clone(),
        metadata: metadata_json(entry),
        recurrence_type: entry.recurrence.kind.as_str().to_string(),
        recurrence_days: days_json(entry),
        recurrence_end_date: entry.recurrence.end_date,
        is_instance: entry.is_instance,
        recurrence_parent_id: entry.recurrence_parent_id.clone(),
        instance_date: entry.instance_date,
        updated_at: now,
    }
}

fn decode_all(rows: Vec<ScheduleEntryRow>) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    rows.into_iter().map(ScheduleEntry::try_from).collect()
}

pub fn insert(conn: &mut SqliteConnection, entry: &ScheduleEntry) -> Result<(), ScheduleError> {
    use crate::schema::schedule_entries;

    let row = new_row(entry, Utc::now().naive_utc());
    diesel::insert_into(schedule_entries::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

pub fn save(conn: &mut SqliteConnection, entry: &ScheduleEntry) -> Result<(), ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    let updated = diesel::update(dsl::schedule_entries.filter(dsl::id.eq(&entry.id)))
        .set(&changes(entry, Utc::now().naive_utc()))
        .execute(conn)?;
    if updated == 0 {
        return Err(ScheduleError::NotFound(format!("schedule entry {}", entry.id)));
    }
    Ok(())
}

pub fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<ScheduleEntry>, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    dsl::schedule_entries
        .filter(dsl::id.eq(id))
        .select(ScheduleEntryRow::as_select())
        .first(conn)
        .optional()?
        .map(ScheduleEntry::try_from)
        .transpose()
}

pub fn find_override(
    conn: &mut SqliteConnection,
    template_id: &str,
    date: NaiveDate,
) -> Result<Option<ScheduleEntry>, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    dsl::schedule_entries
        .filter(dsl::recurrence_parent_id.eq(template_id))
        .filter(dsl::instance_date.eq(date))
        .filter(dsl::is_instance.eq(true))
        .select(ScheduleEntryRow::as_select())
        .first(conn)
        .optional()?
        .map(ScheduleEntry::try_from)
        .transpose()
}

/// A decoded entry id.
#[derive(Debug)]
pub enum ResolvedEntry {
    /// A row addressed by its own id.
    Stored(ScheduleEntry),
    /// One occurrence of a template, addressed by its virtual id. The
    /// template may be gone while an override still points at it.
    Occurrence {
        template_id: String,
        date: NaiveDate,
        template: Option<ScheduleEntry>,
        materialized: Option<ScheduleEntry>,
    },
}

/// Resolves a real or virtual id within a station.
pub fn resolve(
    conn: &mut SqliteConnection,
    station_id: &str,
    id: &str,
) -> Result<ResolvedEntry, ScheduleError> {
    let in_station = |entry: Option<ScheduleEntry>| entry.filter(|e| e.station_id == station_id);

    match instance_id::parse(id) {
        EntryRef::Stored(id) => in_station(find(conn, id)?)
            .map(ResolvedEntry::Stored)
            .ok_or_else(|| ScheduleError::NotFound(format!("schedule entry {}", id))),
        EntryRef::Virtual { template_id, date } => {
            let template = in_station(find(conn, template_id)?).filter(ScheduleEntry::is_template);
            let materialized = in_station(find_override(conn, template_id, date)?);
            Ok(ResolvedEntry::Occurrence {
                template_id: template_id.to_string(),
                date,
                template,
                materialized,
            })
        }
    }
}

pub fn delete(conn: &mut SqliteConnection, id: &str) -> Result<usize, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    Ok(diesel::delete(dsl::schedule_entries.filter(dsl::id.eq(id))).execute(conn)?)
}

/// Deletes the override rows of a template. Returns how many were removed.
pub fn delete_overrides(
    conn: &mut SqliteConnection,
    template_id: &str,
) -> Result<usize, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    Ok(
        diesel::delete(dsl::schedule_entries.filter(dsl::recurrence_parent_id.eq(template_id)))
            .execute(conn)?,
    )
}

/// Deletes a template together with its overrides. Returns the number of
/// override rows removed.
pub fn delete_template(
    conn: &mut SqliteConnection,
    template_id: &str,
) -> Result<usize, ScheduleError> {
    conn.transaction(|conn| {
        let overrides = delete_overrides(conn, template_id)?;
        delete(conn, template_id)?;
        Ok(overrides)
    })
}

/// Stored one-offs and overrides of a station starting inside `[from, to]`.
pub fn load_window(
    conn: &mut SqliteConnection,
    station_id: &str,
    mount_id: Option<&str>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    let mut query = dsl::schedule_entries
        .filter(dsl::station_id.eq(station_id))
        .filter(dsl::starts_at.ge(from.naive_utc()))
        .filter(dsl::starts_at.le(to.naive_utc()))
        .filter(
            dsl::recurrence_type
                .eq(RecurrenceType::None.as_str())
                .or(dsl::is_instance.eq(true)),
        )
        .select(ScheduleEntryRow::as_select())
        .into_boxed();
    if let Some(mount) = mount_id {
        query = query.filter(dsl::mount_id.eq(mount));
    }

    let rows = query.order(dsl::starts_at.asc()).load(conn)?;
    decode_all(rows)
}

/// Recurring templates of a station that start no later than `until`.
pub fn load_templates(
    conn: &mut SqliteConnection,
    station_id: &str,
    mount_id: Option<&str>,
    until: DateTime<Utc>,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    let mut query = dsl::schedule_entries
        .filter(dsl::station_id.eq(station_id))
        .filter(dsl::recurrence_type.ne(RecurrenceType::None.as_str()))
        .filter(dsl::is_instance.eq(false))
        .filter(dsl::starts_at.le(until.naive_utc()))
        .select(ScheduleEntryRow::as_select())
        .into_boxed();
    if let Some(mount) = mount_id {
        query = query.filter(dsl::mount_id.eq(mount));
    }

    let rows = query
        .order((dsl::starts_at.asc(), dsl::id.asc()))
        .load(conn)?;
    decode_all(rows)
}

/// Stored non-template rows on a mount whose range overlaps `[from, to)`.
pub fn load_overlapping(
    conn: &mut SqliteConnection,
    mount_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    let rows = dsl::schedule_entries
        .filter(dsl::mount_id.eq(mount_id))
        .filter(dsl::starts_at.lt(to.naive_utc()))
        .filter(dsl::ends_at.gt(from.naive_utc()))
        .filter(
            dsl::recurrence_type
                .eq(RecurrenceType::None.as_str())
                .or(dsl::is_instance.eq(true)),
        )
        .select(ScheduleEntryRow::as_select())
        .load(conn)?;
    decode_all(rows)
}

/// Stored non-template rows on a mount still running after `from`, and
/// starting before `until` when given.
pub fn load_reachable(
    conn: &mut SqliteConnection,
    mount_id: &str,
    from: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    let mut query = dsl::schedule_entries
        .filter(dsl::mount_id.eq(mount_id))
        .filter(dsl::ends_at.gt(from.naive_utc()))
        .filter(
            dsl::recurrence_type
                .eq(RecurrenceType::None.as_str())
                .or(dsl::is_instance.eq(true)),
        )
        .select(ScheduleEntryRow::as_select())
        .into_boxed();
    if let Some(until) = until {
        query = query.filter(dsl::starts_at.lt(until.naive_utc()));
    }

    let rows = query.order(dsl::starts_at.asc()).load(conn)?;
    decode_all(rows)
}

/// Recurring templates on a mount, limited to those starting no later than
/// `until` when given.
pub fn load_mount_templates(
    conn: &mut SqliteConnection,
    mount_id: &str,
    until: Option<DateTime<Utc>>,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    let mut query = dsl::schedule_entries
        .filter(dsl::mount_id.eq(mount_id))
        .filter(dsl::recurrence_type.ne(RecurrenceType::None.as_str()))
        .filter(dsl::is_instance.eq(false))
        .select(ScheduleEntryRow::as_select())
        .into_boxed();
    if let Some(until) = until {
        query = query.filter(dsl::starts_at.le(until.naive_utc()));
    }

    let rows = query.load(conn)?;
    decode_all(rows)
}

/// (template, date) pairs that have an override dated within `[from, to]`.
pub fn overridden_slots(
    conn: &mut SqliteConnection,
    template_ids: &[String],
    from: NaiveDate,
    to: NaiveDate,
) -> Result<OverriddenSlots, ScheduleError> {
    use crate::schema::schedule_entries::dsl;

    if template_ids.is_empty() {
        return Ok(OverriddenSlots::new());
    }

    let pairs: Vec<(Option<String>, Option<NaiveDate>)> = dsl::schedule_entries
        .filter(dsl::recurrence_parent_id.eq_any(template_ids))
        .filter(dsl::instance_date.between(from, to))
        .filter(dsl::is_instance.eq(true))
        .select((dsl::recurrence_parent_id, dsl::instance_date))
        .load(conn)?;

    Ok(pairs
        .into_iter()
        .filter_map(|(parent, date)| Some((parent?, date?)))
        .collect())
}

pub fn find_station(
    conn: &mut SqliteConnection,
    station_id: &str,
) -> Result<Station, ScheduleError> {
    use crate::schema::stations::dsl;

    dsl::stations
        .filter(dsl::id.eq(station_id))
        .select(Station::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ScheduleError::NotFound(format!("station {}", station_id)))
}

pub fn find_mount(
    conn: &mut SqliteConnection,
    station_id: &str,
    mount_id: &str,
) -> Result<Option<Mount>, ScheduleError> {
    use crate::schema::mounts::dsl;

    Ok(dsl::mounts
        .filter(dsl::id.eq(mount_id))
        .filter(dsl::station_id.eq(station_id))
        .select(Mount::as_select())
        .first(conn)
        .optional()?)
}

/// The station's default output: its oldest mount.
pub fn first_mount(
    conn: &mut SqliteConnection,
    station_id: &str,
) -> Result<Option<Mount>, ScheduleError> {
    use crate::schema::mounts::dsl;

    Ok(dsl::mounts
        .filter(dsl::station_id.eq(station_id))
        .order((dsl::created_at.asc(), dsl::id.asc()))
        .select(Mount::as_select())
        .first(conn)
        .optional()?)
}
