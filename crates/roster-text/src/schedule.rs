//! Free-text schedule parsing
//!
//! Organisers type dates the way they speak them. Two forms are understood:
//! - numeric: `11.11.2025`, `11-11-2025`, `11 11 2025` (found anywhere in the text)
//! - month name: `11 listopada 2025`, optionally led by a weekday
//!   (`wtorek, 11 listopada 2025`), with or without Polish diacritics
//!
//! Time is the first `HH:MM` in the time text. Parsing is pure and
//! zone-free; [`ScheduleZone`] pins the result to an instant.

use crate::error::ScheduleError;
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s+(\d{1,2})\s+(\d{4})").expect("numeric date pattern is valid")
});

static CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s*:\s*(\d{2})").expect("clock pattern is valid"));

/// Month names in genitive and nominative, with and without diacritics
const MONTHS: &[(&str, u32)] = &[
    ("stycznia", 1),
    ("styczen", 1),
    ("styczeń", 1),
    ("lutego", 2),
    ("luty", 2),
    ("marca", 3),
    ("marzec", 3),
    ("kwietnia", 4),
    ("kwiecien", 4),
    ("kwiecień", 4),
    ("maja", 5),
    ("maj", 5),
    ("czerwca", 6),
    ("czerwiec", 6),
    ("lipca", 7),
    ("lipiec", 7),
    ("sierpnia", 8),
    ("sierpien", 8),
    ("sierpień", 8),
    ("września", 9),
    ("wrzesnia", 9),
    ("wrzesien", 9),
    ("wrzesień", 9),
    ("października", 10),
    ("pazdziernika", 10),
    ("pazdziernik", 10),
    ("październik", 10),
    ("listopada", 11),
    ("listopad", 11),
    ("grudnia", 12),
    ("grudzien", 12),
    ("grudzień", 12),
];

fn month_number(name: &str) -> Option<u32> {
    MONTHS.iter().find(|(label, _)| *label == name).map(|(_, n)| *n)
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace([',', '.', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Leading decimal digits of `token`, like `11` in `11-go`
fn leading_number(token: &str) -> Option<u32> {
    let digits: String = token.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn parse_date(date_text: &str) -> Option<NaiveDate> {
    let text = normalize(date_text);

    let (day, month, year) = if let Some(caps) = NUMERIC_DATE.captures(&text) {
        (
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )
    } else {
        let parts: Vec<&str> = text.split(' ').collect();
        let skip = usize::from(leading_number(parts.first()?).is_none());
        let day = leading_number(parts.get(skip)?)?;
        let month = month_number(parts.get(skip + 1)?)?;
        let year = leading_number(parts.get(skip + 2)?)?;
        (day, month, i32::try_from(year).ok()?)
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time(time_text: &str) -> Option<NaiveTime> {
    let text = normalize_time(time_text);
    let caps = CLOCK.captures(&text)?;
    NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
}

fn normalize_time(text: &str) -> String {
    // keep the colon; it is what separates hours from minutes
    text.to_lowercase().replace([',', '-'], " ")
}

/// Parse date and time text into a wall-clock instant
///
/// Returns `None` when either part is blank or unrecognised, or the date does
/// not exist (e.g. 31 February).
#[must_use]
pub fn parse_start(date_text: &str, time_text: &str) -> Option<NaiveDateTime> {
    if date_text.trim().is_empty() || time_text.trim().is_empty() {
        return None;
    }
    Some(parse_date(date_text)?.and_time(parse_time(time_text)?))
}

/// Time zone used to interpret wall-clock schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleZone {
    /// Host's local zone (DST aware)
    #[default]
    Local,
    /// Fixed offset from UTC
    Fixed(FixedOffset),
}

impl ScheduleZone {
    /// Fixed zone from an offset in minutes east of UTC; `None` or an
    /// out-of-range offset selects the local zone
    #[must_use]
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(|m| FixedOffset::east_opt(m.checked_mul(60)?))
            .map_or(ScheduleZone::Local, ScheduleZone::Fixed)
    }

    /// Pin a wall-clock time to an instant. Ambiguous local times resolve to
    /// the earlier instant.
    #[must_use]
    pub fn to_utc(self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            ScheduleZone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            ScheduleZone::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Parse and pin a schedule in one step
///
/// # Errors
/// - `ScheduleError::Unparsable` when the text is not understood
/// - `ScheduleError::NonexistentLocalTime` for times skipped by DST
pub fn resolve_start(
    date_text: &str,
    time_text: &str,
    zone: ScheduleZone,
) -> Result<DateTime<Utc>, ScheduleError> {
    let naive = parse_start(date_text, time_text).ok_or_else(|| ScheduleError::Unparsable {
        date: date_text.to_string(),
        time: time_text.to_string(),
    })?;
    zone.to_utc(naive)
        .ok_or(ScheduleError::NonexistentLocalTime(naive))
}

/// Human form of a time distance: `za 1d 2h 5m` ahead, `3m temu` behind
#[must_use]
pub fn humanize_delta(delta: Duration) -> String {
    let ahead = delta >= Duration::zero();
    let total_minutes = delta.num_minutes().unsigned_abs();
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }

    let joined = parts.join(" ");
    if ahead {
        format!("za {joined}")
    } else {
        format!("{joined} temu")
    }
}
