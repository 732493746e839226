//! Interpretation of free-text WhatsApp replies.

use crate::types::FeedbackKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "kind", rename_all = "snake_case")]
pub enum Intent {
    Watered,
    Feedback(FeedbackKind),
    Pause,
    Resume,
    Help,
    Unknown,
}

static WET_RE: OnceLock<Regex> = OnceLock::new();
static DRY_RE: OnceLock<Regex> = OnceLock::new();
static RIGHT_RE: OnceLock<Regex> = OnceLock::new();
static WATERED_RE: OnceLock<Regex> = OnceLock::new();

fn wet_re() -> &'static Regex {
    WET_RE.get_or_init(|| Regex::new(r"(?i)\b(too wet|soggy|overwatered|yellow)\b").unwrap())
}

fn dry_re() -> &'static Regex {
    DRY_RE.get_or_init(|| Regex::new(r"(?i)\b(too dry|dry|thirsty|wilting|crispy)\b").unwrap())
}

fn right_re() -> &'static Regex {
    RIGHT_RE.get_or_init(|| Regex::new(r"(?i)\b(just right|perfect|happy)\b").unwrap())
}

fn watered_re() -> &'static Regex {
    WATERED_RE.get_or_init(|| Regex::new(r"(?i)\b(watered|done|yes)\b").unwrap())
}

pub fn parse_intent(text: &str) -> Intent {
    let normalized = text
        .trim()
        .trim_end_matches(['!', '.'])
        .trim()
        .to_lowercase();

    match normalized.as_str() {
        "stop" | "pause" => return Intent::Pause,
        "start" | "resume" => return Intent::Resume,
        "help" | "?" => return Intent::Help,
        _ => {}
    }

    if wet_re().is_match(&normalized) {
        Intent::Feedback(FeedbackKind::TooWet)
    } else if dry_re().is_match(&normalized) {
        Intent::Feedback(FeedbackKind::TooDry)
    } else if right_re().is_match(&normalized) {
        Intent::Feedback(FeedbackKind::JustRight)
    } else if watered_re().is_match(&normalized)
        || normalized.contains('💧')
        || normalized.contains('✅')
    {
        Intent::Watered
    } else {
        Intent::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantName {
    pub id: String,
    pub nickname: String,
}

/// Pick the plant an inbound message is about.
///
/// Order: a nickname mentioned in the text (longest match wins), the only
/// plant the user has, the plant that sent the most recent reminder.
pub fn resolve_plant(text: &str, plants: &[PlantName], last_reminded: Option<&str>) -> Option<String> {
    let lower = text.to_lowercase();
    let mentioned = plants
        .iter()
        .filter(|p| !p.nickname.is_empty() && lower.contains(&p.nickname.to_lowercase()))
        .max_by_key(|p| p.nickname.chars().count());
    if let Some(p) = mentioned {
        return Some(p.id.clone());
    }

    if plants.len() == 1 {
        return Some(plants[0].id.clone());
    }

    last_reminded
        .filter(|id| plants.iter().any(|p| p.id == *id))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_must_be_the_whole_message() {
        assert_eq!(parse_intent("STOP"), Intent::Pause);
        assert_eq!(parse_intent(" start! "), Intent::Resume);
        assert_eq!(parse_intent("?"), Intent::Help);
        assert_eq!(parse_intent("please don't stop"), Intent::Unknown);
    }

    #[test]
    fn overwatered_is_wet_not_watered() {
        assert_eq!(
            parse_intent("I think I overwatered it"),
            Intent::Feedback(FeedbackKind::TooWet)
        );
        assert_eq!(
            parse_intent("leaves are going yellow"),
            Intent::Feedback(FeedbackKind::TooWet)
        );
    }

    #[test]
    fn dry_and_right_feedback() {
        assert_eq!(
            parse_intent("soil was bone dry"),
            Intent::Feedback(FeedbackKind::TooDry)
        );
        assert_eq!(
            parse_intent("looks perfect"),
            Intent::Feedback(FeedbackKind::JustRight)
        );
        // word boundaries: "laundry" is not "dry"
        assert_eq!(parse_intent("doing laundry"), Intent::Unknown);
    }

    #[test]
    fn watering_confirmations() {
        assert_eq!(parse_intent("Watered!"), Intent::Watered);
        assert_eq!(parse_intent("done"), Intent::Watered);
        assert_eq!(parse_intent("💧"), Intent::Watered);
        assert_eq!(parse_intent("✅ all good"), Intent::Watered);
        assert_eq!(parse_intent("hello there"), Intent::Unknown);
    }

    fn plants() -> Vec<PlantName> {
        vec![
            PlantName { id: "p1".into(), nickname: "Fern".into() },
            PlantName { id: "p2".into(), nickname: "Fernando".into() },
            PlantName { id: "p3".into(), nickname: "Spike".into() },
        ]
    }

    #[test]
    fn nickname_mention_prefers_longest() {
        assert_eq!(resolve_plant("watered fernando", &plants(), None), Some("p2".into()));
        assert_eq!(resolve_plant("watered SPIKE", &plants(), Some("p1")), Some("p3".into()));
    }

    #[test]
    fn single_plant_and_last_reminder_fallbacks() {
        let one = vec![plants()[2].clone()];
        assert_eq!(resolve_plant("done", &one, None), Some("p3".into()));
        assert_eq!(resolve_plant("done", &plants(), Some("p3")), Some("p3".into()));
        assert_eq!(resolve_plant("done", &plants(), Some("gone")), None);
        assert_eq!(resolve_plant("done", &plants(), None), None);
    }
}
