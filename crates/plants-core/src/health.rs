//! Descriptive statistics over a plant's watering history and the health
//! score derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WateringStats {
    pub count: usize,
    /// Mean days between consecutive waterings.
    pub mean_gap: Option<f64>,
    /// Population standard deviation of the gaps, in days.
    pub std_dev: Option<f64>,
    pub longest_gap: Option<f64>,
}

impl WateringStats {
    pub fn from_events(events: &[DateTime<Utc>]) -> Self {
        let mut sorted = events.to_vec();
        sorted.sort();
        let gaps: Vec<f64> = sorted
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds() as f64 / 86_400.0)
            .collect();

        if gaps.is_empty() {
            return Self {
                count: sorted.len(),
                mean_gap: None,
                std_dev: None,
                longest_gap: None,
            };
        }

        let n = gaps.len() as f64;
        let mean = gaps.iter().sum::<f64>() / n;
        let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n;
        let longest = gaps.iter().cloned().fold(f64::MIN, f64::max);

        Self {
            count: sorted.len(),
            mean_gap: Some(mean),
            std_dev: Some(variance.sqrt()),
            longest_gap: Some(longest),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Thriving,
    Okay,
    NeedsLove,
}

impl HealthGrade {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => HealthGrade::Thriving,
            50..=79 => HealthGrade::Okay,
            _ => HealthGrade::NeedsLove,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: u8,
    pub grade: HealthGrade,
    pub stats: WateringStats,
}

/// Score in 0..=100. Penalises irregular gaps, drifting away from the
/// recommended interval, and being overdue right now.
pub fn health_score(stats: &WateringStats, recommended_interval: u32, days_overdue: u32) -> u8 {
    let mut score: i64 = 100;

    if let (Some(mean), Some(std_dev)) = (stats.mean_gap, stats.std_dev) {
        if mean > 0.0 {
            let cv = std_dev / mean;
            score -= ((cv * 60.0).round() as i64).min(30);
        }
        let interval = recommended_interval.max(1) as f64;
        let drift = (mean - interval).abs() / interval;
        score -= ((drift * 50.0).round() as i64).min(30);
    }

    score -= (days_overdue as i64 * 8).min(40);
    score.clamp(0, 100) as u8
}

pub fn report(events: &[DateTime<Utc>], recommended_interval: u32, days_overdue: u32) -> HealthReport {
    let stats = WateringStats::from_events(events);
    let score = health_score(&stats, recommended_interval, days_overdue);
    HealthReport {
        score,
        grade: HealthGrade::from_score(score),
        stats,
    }
}
