use super::instance_id;
use super::ScheduleEntry;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::str::FromStr;

/// Upper bound on in-window candidates visited by a single expansion.
pub const MAX_CANDIDATES_PER_EXPANSION: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    #[default]
    #[serde(alias = "")]
    None,
    Daily,
    Weekdays,
    Weekly,
    Custom,
}

impl RecurrenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceType::None => "none",
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekdays => "weekdays",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::Custom => "custom",
        }
    }
}

impl FromStr for RecurrenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(RecurrenceType::None),
            "daily" => Ok(RecurrenceType::Daily),
            "weekdays" => Ok(RecurrenceType::Weekdays),
            "weekly" => Ok(RecurrenceType::Weekly),
            "custom" => Ok(RecurrenceType::Custom),
            other => Err(format!("unknown recurrence type '{}'", other)),
        }
    }
}

/// How a template entry repeats.
///
/// `days` holds weekday indices counted from Sunday (0 = Sunday, 6 = Saturday)
/// and only matters for `Custom`. `end_date` is an inclusive cutoff compared
/// against the UTC date of each occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RecurrenceRule {
    #[serde(rename = "recurrence_type")]
    pub kind: RecurrenceType,
    #[serde(rename = "recurrence_days")]
    pub days: Vec<u8>,
    #[serde(rename = "recurrence_end_date")]
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_recurring(&self) -> bool {
        self.kind != RecurrenceType::None
    }

    pub fn validate(&self, first_start: DateTime<Utc>) -> Result<(), String> {
        if let Some(day) = self.days.iter().find(|d| **d > 6) {
            return Err(format!(
                "recurrence day {} is out of range (0 = Sunday .. 6 = Saturday)",
                day
            ));
        }
        if let Some(end) = self.end_date {
            if self.is_recurring() && end < first_start.date_naive() {
                return Err("recurrence end date is before the first occurrence".to_string());
            }
        }
        Ok(())
    }

    /// Whether a candidate instant is a real occurrence of a template anchored at `anchor`.
    pub fn matches(&self, anchor: DateTime<Utc>, candidate: DateTime<Utc>) -> bool {
        match self.kind {
            RecurrenceType::None => false,
            RecurrenceType::Daily => true,
            RecurrenceType::Weekdays => !is_weekend(candidate.weekday()),
            RecurrenceType::Weekly => candidate.weekday() == anchor.weekday(),
            RecurrenceType::Custom => {
                let weekday = candidate.weekday().num_days_from_sunday() as u8;
                self.days.is_empty() || self.days.contains(&weekday)
            }
        }
    }

    fn next_candidate(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.kind {
            RecurrenceType::None => None,
            RecurrenceType::Daily | RecurrenceType::Custom => {
                from.checked_add_signed(Duration::days(1))
            }
            RecurrenceType::Weekdays => {
                let mut next = from.checked_add_signed(Duration::days(1))?;
                while is_weekend(next.weekday()) {
                    next = next.checked_add_signed(Duration::days(1))?;
                }
                Some(next)
            }
            RecurrenceType::Weekly => from.checked_add_signed(Duration::days(7)),
        }
    }

    /// First candidate of the walk from `anchor` that is not before `window_start`.
    ///
    /// Jumps straight to the window instead of stepping through every
    /// candidate in between. `None` once the walk runs off the calendar.
    fn first_candidate(
        &self,
        anchor: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let step = match self.kind {
            RecurrenceType::None => return None,
            RecurrenceType::Weekly => Duration::days(7),
            _ => Duration::days(1),
        };
        if anchor >= window_start {
            return Some(anchor);
        }

        let behind = window_start - anchor;
        let whole_steps = behind.num_seconds() / step.num_seconds();
        let mut candidate =
            anchor.checked_add_signed(Duration::days(whole_steps * step.num_days()))?;
        while candidate < window_start {
            candidate = candidate.checked_add_signed(step)?;
        }
        if self.kind == RecurrenceType::Weekdays {
            while is_weekend(candidate.weekday()) {
                candidate = candidate.checked_add_signed(Duration::days(1))?;
            }
        }
        Some(candidate)
    }

    fn past_end(&self, candidate: DateTime<Utc>) -> bool {
        self.end_date
            .map(|end| candidate.date_naive() > end)
            .unwrap_or(false)
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Expands a template into the virtual occurrences starting inside
/// `[window_start, window_end]`.
///
/// The returned iterator is lazy and pure; calling `expand` again with the same
/// arguments yields the same sequence.
pub fn expand(
    template: &ScheduleEntry,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Occurrences<'_> {
    let next = template
        .recurrence
        .first_candidate(template.starts_at, window_start);
    Occurrences {
        template,
        duration: template.duration(),
        next,
        window_end,
        visited: 0,
    }
}

pub struct Occurrences<'a> {
    template: &'a ScheduleEntry,
    duration: Duration,
    next: Option<DateTime<Utc>>,
    window_end: DateTime<Utc>,
    visited: usize,
}

impl Occurrences<'_> {
    fn occurrence_at(&self, starts_at: DateTime<Utc>) -> Option<ScheduleEntry> {
        let template = self.template;
        let date = starts_at.date_naive();
        Some(ScheduleEntry {
            id: instance_id::virtual_id(&template.id, date),
            starts_at,
            ends_at: starts_at.checked_add_signed(self.duration)?,
            is_instance: true,
            recurrence_parent_id: Some(template.id.clone()),
            instance_date: Some(date),
            ..template.clone()
        })
    }
}

impl Iterator for Occurrences<'_> {
    type Item = ScheduleEntry;

    fn next(&mut self) -> Option<ScheduleEntry> {
        let rule = &self.template.recurrence;
        while let Some(candidate) = self.next.take() {
            if self.visited >= MAX_CANDIDATES_PER_EXPANSION
                || candidate > self.window_end
                || rule.past_end(candidate)
            {
                return None;
            }
            self.visited += 1;
            self.next = rule.next_candidate(candidate);

            if rule.matches(self.template.starts_at, candidate) {
                return self.occurrence_at(candidate);
            }
        }
        None
    }
}

impl FusedIterator for Occurrences<'_> {}
