use super::recurrence;
use super::ScheduleEntry;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every recurrence pattern repeats with this period once its template has
/// started.
pub const PATTERN_PERIOD_DAYS: i64 = 7;

/// Whether virtual occurrences of recurring templates block new entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringConflictPolicy {
    #[default]
    Enforce,
    Ignore,
}

/// The existing entry a candidate collided with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub entry_id: String,
    pub mount_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Conflict {
    fn with(entry: &ScheduleEntry) -> Self {
        Self {
            entry_id: entry.id.clone(),
            mount_id: entry.mount_id.clone(),
            starts_at: entry.starts_at,
            ends_at: entry.ends_at,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry {} on mount {} ({} - {})",
            self.entry_id,
            self.mount_id,
            self.starts_at.to_rfc3339(),
            self.ends_at.to_rfc3339()
        )
    }
}

/// Half-open overlap: ranges that only touch at a boundary do not overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Rejects `candidate` if it overlaps any entry on the same mount.
///
/// Entries sharing the candidate's id are skipped so a row can be checked
/// against a set that still contains its previous version.
pub fn check<'a, I>(candidate: &ScheduleEntry, existing: I) -> Result<(), Conflict>
where
    I: IntoIterator<Item = &'a ScheduleEntry>,
{
    for other in existing {
        if other.mount_id != candidate.mount_id || other.id == candidate.id {
            continue;
        }
        if overlaps(
            candidate.starts_at,
            candidate.ends_at,
            other.starts_at,
            other.ends_at,
        ) {
            return Err(Conflict::with(other));
        }
    }
    Ok(())
}

/// Rejects a recurring `candidate` if any of its occurrences overlaps a
/// stored row or another template's occurrence on the same mount.
///
/// `rows` must hold every stored one-off and override the candidate could
/// reach; each is checked against the occurrences around its own date.
/// Rows and templates belonging to the candidate are skipped.
pub fn check_template(
    candidate: &ScheduleEntry,
    rows: &[ScheduleEntry],
    templates: &[ScheduleEntry],
) -> Result<(), Conflict> {
    let duration = candidate.duration();
    for row in rows {
        if row.mount_id != candidate.mount_id
            || row.id == candidate.id
            || row.recurrence_parent_id.as_deref() == Some(candidate.id.as_str())
        {
            continue;
        }
        let Some(from) = row.starts_at.checked_sub_signed(duration) else {
            continue;
        };
        let hit = recurrence::expand(candidate, from, row.ends_at).any(|occurrence| {
            overlaps(
                occurrence.starts_at,
                occurrence.ends_at,
                row.starts_at,
                row.ends_at,
            )
        });
        if hit {
            return Err(Conflict::with(row));
        }
    }

    for other in templates {
        if other.mount_id != candidate.mount_id || other.id == candidate.id {
            continue;
        }
        if let Some(found) = first_shared_slot(candidate, other) {
            return Err(found);
        }
    }
    Ok(())
}

// Once both templates have started the pair repeats every period, so a clash
// always has a copy within one period (plus the other's length) of the later
// start.
fn first_shared_slot(candidate: &ScheduleEntry, other: &ScheduleEntry) -> Option<Conflict> {
    let later = candidate.starts_at.max(other.starts_at);
    let from = later.checked_sub_signed(candidate.duration())?;
    let to = later
        .checked_add_signed(Duration::days(PATTERN_PERIOD_DAYS))?
        .checked_add_signed(other.duration())?;

    for occurrence in recurrence::expand(candidate, from, to) {
        let Some(other_from) = occurrence.starts_at.checked_sub_signed(other.duration()) else {
            continue;
        };
        let clash = recurrence::expand(other, other_from, occurrence.ends_at).find(|theirs| {
            overlaps(
                occurrence.starts_at,
                occurrence.ends_at,
                theirs.starts_at,
                theirs.ends_at,
            )
        });
        if let Some(theirs) = clash {
            return Some(Conflict::with(&theirs));
        }
    }
    None
}
