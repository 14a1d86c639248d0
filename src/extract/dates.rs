//! Dutch-locale date phrases, resolved against a reference date.
//!
//! Feeds render dates the way the host page shows them to a person:
//! `"vandaag"` for the current day, `"15 maart"` within the current year,
//! `"15 maart 2023"` when the year differs. Parsing is always relative to a
//! caller-supplied reference date so extraction stays a pure function.

use chrono::{Datelike, NaiveDate};

use super::ExtractError;

const MONTH_NAMES: [&str; 12] = [
    "januari",
    "februari",
    "maart",
    "april",
    "mei",
    "juni",
    "juli",
    "augustus",
    "september",
    "oktober",
    "november",
    "december",
];

/// Map a lowercase Dutch month name to its 1-based month number.
fn month_number(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|month| *month == name)
        .map(|index| index as u32 + 1)
}

/// Dutch name for a 1-based month number. Used when rendering synthetic
/// feed items in the shape parsing expects.
pub(crate) fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month as usize - 1).min(11)]
}

/// Parse a rendered date phrase into a calendar date.
///
/// Accepted forms, after trimming and lowercasing:
/// - `vandaag` (optionally followed by more text, e.g. a time) → `reference`
/// - `<day> <month-name>` → that day in `reference`'s year
/// - `<day> <month-name> <year>` → as written
///
/// Anything else is an error; the caller drops the item rather than guessing.
pub fn parse_date(text: &str, reference: NaiveDate) -> Result<NaiveDate, ExtractError> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return Err(ExtractError::EmptyDate);
    }
    if text.starts_with("vandaag") {
        return Ok(reference);
    }

    let parts: Vec<&str> = text.split_whitespace().collect();
    let (day_text, month_text, year) = match parts.as_slice() {
        [day, month] => (*day, *month, reference.year()),
        [day, month, year] => {
            let year: i32 = year
                .parse()
                .map_err(|_| ExtractError::InvalidYear(year.to_string()))?;
            (*day, *month, year)
        }
        _ => return Err(ExtractError::UnrecognizedDate(text.clone())),
    };

    let day: u32 = day_text
        .parse()
        .map_err(|_| ExtractError::InvalidDay(day_text.to_string()))?;
    let month =
        month_number(month_text).ok_or_else(|| ExtractError::UnknownMonth(month_text.to_string()))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(ExtractError::ImpossibleDate { year, month, day })
}
