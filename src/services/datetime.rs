use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};

const DISPLAY_DATE_FORMAT: &str = "%m/%d/%Y";
const DISPLAY_TIME_FORMAT: &str = "%I:%M %p";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M%p",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unrecognized date/time '{0}'")]
pub struct InvalidDate(pub String);

/// Parses a calendar date written as `MM/DD/YYYY`, `YYYY-MM-DD`, or any
/// datetime accepted by [`parse_instant`] (in which case the local date is
/// taken).
pub fn parse_date(input: &str, tz: Tz) -> Result<NaiveDate, InvalidDate> {
    let trimmed = input.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(date);
        }
    }
    parse_instant(trimmed, tz)
        .map(|instant| instant.with_timezone(&tz).date_naive())
        .map_err(|_| InvalidDate(input.to_string()))
}

/// Parses a point in time. Offsets are honoured; naive values are read in
/// `tz`.
pub fn parse_instant(input: &str, tz: Tz) -> Result<DateTime<Utc>, InvalidDate> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| InvalidDate(input.to_string()))?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| InvalidDate(input.to_string()))
}

pub fn wire_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn wire_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn display_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

pub fn display_instant(instant: DateTime<Utc>, tz: Tz) -> String {
    let local = instant.with_timezone(&tz);
    format!(
        "{} {} {}",
        local.format(DISPLAY_DATE_FORMAT),
        local.format(DISPLAY_TIME_FORMAT),
        local.format("%Z")
    )
}

fn iso_regex() -> Option<&'static Regex> {
    static ISO_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    ISO_REGEX
        .get_or_init(|| {
            Regex::new(
                r"\b\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:\d{2})?)?\b",
            )
            .ok()
        })
        .as_ref()
}

/// Rewrites every ISO date (and datetime) in `text` into the display form so
/// the user never sees machine dates.
pub fn humanize_dates(text: &str, tz: Tz) -> String {
    let Some(re) = iso_regex() else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &Captures| {
        let matched = &caps[0];
        if matched.len() > 10 {
            if let Ok(instant) = parse_instant(matched, tz) {
                return display_instant(instant, tz);
            }
        }
        match NaiveDate::parse_from_str(&matched[..10], "%Y-%m-%d") {
            Ok(date) if matched.len() == 10 => display_date(date),
            Ok(date) => format!("{}{}", display_date(date), &matched[10..]),
            Err(_) => matched.to_string(),
        }
    })
    .into_owned()
}
