//! Virtual occurrence identifiers.
//!
//! A virtual occurrence is addressed as `<templateId>_<YYYYMMDD>`. Calendar
//! clients store these ids, so the format must not change.

use chrono::{Datelike, NaiveDate};

const SUFFIX_LEN: usize = 9;

/// What an entry id points at once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRef<'a> {
    Stored(&'a str),
    Virtual { template_id: &'a str, date: NaiveDate },
}

pub fn virtual_id(template_id: &str, date: NaiveDate) -> String {
    format!(
        "{}_{:04}{:02}{:02}",
        template_id,
        date.year(),
        date.month(),
        date.day()
    )
}

/// Splits a virtual id into its template id and occurrence date.
///
/// Anything that does not end in `_` plus eight digits forming a real calendar
/// date names a stored row.
pub fn parse(id: &str) -> EntryRef<'_> {
    let bytes = id.as_bytes();
    if bytes.len() <= SUFFIX_LEN {
        return EntryRef::Stored(id);
    }
    let split = bytes.len() - SUFFIX_LEN;
    if bytes[split] != b'_' || !bytes[split + 1..].iter().all(u8::is_ascii_digit) {
        return EntryRef::Stored(id);
    }

    let digits = &id[split + 1..];
    let date = digits[0..4]
        .parse::<i32>()
        .ok()
        .zip(digits[4..6].parse::<u32>().ok())
        .zip(digits[6..8].parse::<u32>().ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d));

    match date {
        Some(date) => EntryRef::Virtual {
            template_id: &id[..split],
            date,
        },
        None => EntryRef::Stored(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_zero_padding() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        assert_eq!(virtual_id("abc", date), "abc_20260203");
    }

    #[test]
    fn decodes_virtual_ids() {
        let template = "0b6f7a4e-3c1d-4f57-9a39-7f0c2b1d9e11";
        let date = NaiveDate::from_ymd_opt(2026, 2, 20).unwrap();
        let id = virtual_id(template, date);
        assert_eq!(
            parse(&id),
            EntryRef::Virtual {
                template_id: template,
                date
            }
        );
    }

    #[test]
    fn plain_ids_are_stored_refs() {
        assert_eq!(
            parse("0b6f7a4e-3c1d-4f57-9a39-7f0c2b1d9e11"),
            EntryRef::Stored("0b6f7a4e-3c1d-4f57-9a39-7f0c2b1d9e11")
        );
        assert_eq!(parse("_20260220"), EntryRef::Stored("_20260220"));
        assert_eq!(parse("abc-20260220"), EntryRef::Stored("abc-20260220"));
        assert_eq!(parse("abc_2026022x"), EntryRef::Stored("abc_2026022x"));
    }

    #[test]
    fn impossible_dates_are_not_virtual() {
        assert_eq!(parse("abc_20261340"), EntryRef::Stored("abc_20261340"));
    }
}
