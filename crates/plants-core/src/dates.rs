//! Calendar helpers shared by the care schedule and the reminder worker.
//!
//! Users store a fixed UTC offset rather than a zone name; reminders are
//! day-granular so DST drift of an hour is acceptable.

use crate::types::{Hemisphere, Season};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Meteorological season for `date`.
pub fn season_for(date: NaiveDate, hemisphere: Hemisphere) -> Season {
    let northern = match date.month() {
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        9..=11 => Season::Autumn,
        _ => Season::Winter,
    };
    match hemisphere {
        Hemisphere::North => northern,
        Hemisphere::South => match northern {
            Season::Spring => Season::Autumn,
            Season::Summer => Season::Winter,
            Season::Autumn => Season::Spring,
            Season::Winter => Season::Summer,
        },
    }
}

/// The calendar date the user sees at `instant`.
pub fn local_date(instant: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    (instant + Duration::minutes(utc_offset_minutes as i64)).date_naive()
}

/// UTC instant of `hour:00` local time on `date`.
pub fn reminder_instant(date: NaiveDate, hour: u32, utc_offset_minutes: i32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let local = date.and_time(time);
    Utc.from_utc_datetime(&(local - Duration::minutes(utc_offset_minutes as i64)))
}

/// Signed whole days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Short label for a due date relative to today.
pub fn humanize_due(days_until: i64) -> String {
    match days_until {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n if n > 1 => format!("in {n} days"),
        -1 => "1 day overdue".to_string(),
        n => format!("{} days overdue", -n),
    }
}
