//! Watering schedule.
//!
//! The interval is the species default scaled by pot size, light and season,
//! then shifted by the plant's moisture bias:
//!
//! ```text
//! interval = clamp(round(base × pot × light × season) + bias, 1, 60)
//! ```
//!
//! The bias is the only learned input. Owners nudge it one day at a time
//! through "too dry" / "too wet" feedback.

use crate::dates::{days_between, humanize_due, season_for};
use crate::types::{FeedbackKind, Hemisphere, LightLevel, PotSize, Season};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MIN_INTERVAL_DAYS: u32 = 1;
pub const MAX_INTERVAL_DAYS: u32 = 60;
pub const MIN_BIAS: i32 = -5;
pub const MAX_BIAS: i32 = 5;

// ---------------------------------------------------------------------------
// Multipliers
// ---------------------------------------------------------------------------

pub fn pot_multiplier(pot: PotSize) -> f64 {
    match pot {
        PotSize::Small => 0.8,
        PotSize::Medium => 1.0,
        PotSize::Large => 1.25,
    }
}

pub fn light_multiplier(light: LightLevel) -> f64 {
    match light {
        LightLevel::Low => 1.25,
        LightLevel::Medium => 1.0,
        LightLevel::Bright => 0.8,
    }
}

pub fn season_multiplier(season: Season) -> f64 {
    match season {
        Season::Spring => 1.0,
        Season::Summer => 0.85,
        Season::Autumn => 1.1,
        Season::Winter => 1.3,
    }
}

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CareInputs {
    pub base_interval_days: u32,
    pub pot: PotSize,
    pub light: LightLevel,
    pub season: Season,
    pub moisture_bias: i32,
}

pub fn interval_days(inputs: &CareInputs) -> u32 {
    let scaled = inputs.base_interval_days as f64
        * pot_multiplier(inputs.pot)
        * light_multiplier(inputs.light)
        * season_multiplier(inputs.season);
    let biased = scaled.round() as i64 + clamp_bias(inputs.moisture_bias) as i64;
    biased.clamp(MIN_INTERVAL_DAYS as i64, MAX_INTERVAL_DAYS as i64) as u32
}

pub fn clamp_bias(bias: i32) -> i32 {
    bias.clamp(MIN_BIAS, MAX_BIAS)
}

/// New moisture bias after the owner reports how the soil felt.
pub fn apply_feedback(bias: i32, kind: FeedbackKind) -> i32 {
    let next = match kind {
        FeedbackKind::TooDry => bias - 1,
        FeedbackKind::TooWet => bias + 1,
        FeedbackKind::JustRight => bias,
    };
    clamp_bias(next)
}

/// A never-watered plant is due the day it was claimed.
pub fn next_due(last_watered: Option<NaiveDate>, claimed_on: NaiveDate, interval: u32) -> NaiveDate {
    match last_watered {
        Some(date) => date + Duration::days(interval as i64),
        None => claimed_on,
    }
}

// ---------------------------------------------------------------------------
// Due status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "days", rename_all = "snake_case")]
pub enum DueStatus {
    Overdue(u32),
    DueToday,
    Upcoming(u32),
}

impl DueStatus {
    pub fn from_days_until(days_until: i64) -> Self {
        match days_until {
            0 => DueStatus::DueToday,
            n if n < 0 => DueStatus::Overdue((-n) as u32),
            n => DueStatus::Upcoming(n as u32),
        }
    }

    pub fn days_overdue(self) -> u32 {
        match self {
            DueStatus::Overdue(n) => n,
            _ => 0,
        }
    }

    pub fn needs_water(self) -> bool {
        !matches!(self, DueStatus::Upcoming(_))
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Everything the API and CLI show about when a plant next needs water.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub interval_days: u32,
    pub season: Season,
    pub moisture_bias: i32,
    pub next_due: NaiveDate,
    pub days_until: i64,
    pub status: DueStatus,
    pub label: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleInput {
    pub base_interval_days: u32,
    pub pot: PotSize,
    pub light: LightLevel,
    pub moisture_bias: i32,
    pub hemisphere: Hemisphere,
    pub last_watered: Option<NaiveDate>,
    pub claimed_on: NaiveDate,
}

impl Schedule {
    /// Compute the schedule as of `today`. The season is taken from the
    /// date the interval starts counting from, so a plant watered in late
    /// November keeps its autumn interval even if checked in December.
    pub fn compute(input: &ScheduleInput, today: NaiveDate) -> Self {
        let anchor = input.last_watered.unwrap_or(today);
        let season = season_for(anchor, input.hemisphere);
        let interval = interval_days(&CareInputs {
            base_interval_days: input.base_interval_days,
            pot: input.pot,
            light: input.light,
            season,
            moisture_bias: input.moisture_bias,
        });
        let due = next_due(input.last_watered, input.claimed_on, interval);
        let days_until = days_between(today, due);
        Self {
            interval_days: interval,
            season,
            moisture_bias: clamp_bias(input.moisture_bias),
            next_due: due,
            days_until,
            status: DueStatus::from_days_until(days_until),
            label: humanize_due(days_until),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn inputs(base: u32, pot: PotSize, light: LightLevel, season: Season, bias: i32) -> CareInputs {
        CareInputs {
            base_interval_days: base,
            pot,
            light,
            season,
            moisture_bias: bias,
        }
    }

    #[test]
    fn neutral_conditions_keep_species_default() {
        let i = inputs(7, PotSize::Medium, LightLevel::Medium, Season::Spring, 0);
        assert_eq!(interval_days(&i), 7);
    }

    #[test]
    fn multipliers_compound_and_round() {
        // 14 × 1.25 × 1.25 × 1.3 = 28.44
        let i = inputs(14, PotSize::Large, LightLevel::Low, Season::Winter, 0);
        assert_eq!(interval_days(&i), 28);
        // 7 × 0.8 × 1.0 × 0.85 = 4.76
        let i = inputs(7, PotSize::Small, LightLevel::Medium, Season::Summer, 0);
        assert_eq!(interval_days(&i), 5);
    }

    #[test]
    fn bias_shifts_and_interval_is_clamped() {
        let i = inputs(14, PotSize::Large, LightLevel::Low, Season::Winter, 2);
        assert_eq!(interval_days(&i), 30);
        // 3 × 0.8 × 0.8 × 0.85 ≈ 1.6 → 2, then −5 clamps to the minimum
        let i = inputs(3, PotSize::Small, LightLevel::Bright, Season::Summer, -5);
        assert_eq!(interval_days(&i), MIN_INTERVAL_DAYS);
        let i = inputs(55, PotSize::Large, LightLevel::Low, Season::Winter, 5);
        assert_eq!(interval_days(&i), MAX_INTERVAL_DAYS);
    }

    #[test]
    fn out_of_range_bias_is_clamped_before_use() {
        let i = inputs(7, PotSize::Medium, LightLevel::Medium, Season::Spring, 40);
        assert_eq!(interval_days(&i), 12);
    }

    #[test]
    fn feedback_moves_bias_one_day() {
        assert_eq!(apply_feedback(0, FeedbackKind::TooDry), -1);
        assert_eq!(apply_feedback(0, FeedbackKind::TooWet), 1);
        assert_eq!(apply_feedback(3, FeedbackKind::JustRight), 3);
        assert_eq!(apply_feedback(MIN_BIAS, FeedbackKind::TooDry), MIN_BIAS);
        assert_eq!(apply_feedback(MAX_BIAS, FeedbackKind::TooWet), MAX_BIAS);
    }

    #[test]
    fn never_watered_is_due_on_claim_day() {
        assert_eq!(next_due(None, d(2026, 4, 2), 7), d(2026, 4, 2));
        assert_eq!(next_due(Some(d(2026, 4, 2)), d(2026, 3, 1), 7), d(2026, 4, 9));
    }

    #[test]
    fn due_status_from_days() {
        assert_eq!(DueStatus::from_days_until(0), DueStatus::DueToday);
        assert_eq!(DueStatus::from_days_until(-2), DueStatus::Overdue(2));
        assert_eq!(DueStatus::from_days_until(3), DueStatus::Upcoming(3));
        assert!(DueStatus::Overdue(1).needs_water());
        assert!(!DueStatus::Upcoming(1).needs_water());
        assert_eq!(DueStatus::Overdue(4).days_overdue(), 4);
    }

    #[test]
    fn schedule_uses_season_of_last_watering() {
        let input = ScheduleInput {
            base_interval_days: 10,
            pot: PotSize::Medium,
            light: LightLevel::Medium,
            moisture_bias: 0,
            hemisphere: Hemisphere::North,
            last_watered: Some(d(2026, 11, 28)),
            claimed_on: d(2026, 10, 1),
        };
        let s = Schedule::compute(&input, d(2026, 12, 5));
        assert_eq!(s.season, Season::Autumn);
        assert_eq!(s.interval_days, 11);
        assert_eq!(s.next_due, d(2026, 12, 9));
        assert_eq!(s.status, DueStatus::Upcoming(4));
        assert_eq!(s.label, "in 4 days");
    }

    #[test]
    fn schedule_for_unwatered_plant_is_overdue_after_claim_day() {
        let input = ScheduleInput {
            base_interval_days: 7,
            pot: PotSize::Medium,
            light: LightLevel::Medium,
            moisture_bias: 0,
            hemisphere: Hemisphere::North,
            last_watered: None,
            claimed_on: d(2026, 5, 1),
        };
        let s = Schedule::compute(&input, d(2026, 5, 3));
        assert_eq!(s.next_due, d(2026, 5, 1));
        assert_eq!(s.status, DueStatus::Overdue(2));
        assert_eq!(s.label, "2 days overdue");
    }

    #[test]
    fn due_status_serializes_tagged() {
        let json = serde_json::to_value(DueStatus::Overdue(3)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "overdue", "days": 3}));
        let json = serde_json::to_value(DueStatus::DueToday).unwrap();
        assert_eq!(json, serde_json::json!({"state": "due_today"}));
    }
}
