use crate::error::{PlantsError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PLANTS_DIR: &str = ".plants";
pub const CONFIG_FILE: &str = ".plants/config.yaml";
pub const DB_FILE: &str = ".plants/plants.db";
pub const JOBS_FILE: &str = ".plants/jobs.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn plants_dir(root: &Path) -> PathBuf {
    root.join(PLANTS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

pub fn jobs_path(root: &Path) -> PathBuf {
    root.join(JOBS_FILE)
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

static PHONE_RE: OnceLock<Regex> = OnceLock::new();
static SPECIES_ID_RE: OnceLock<Regex> = OnceLock::new();

fn phone_re() -> &'static Regex {
    PHONE_RE.get_or_init(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").unwrap())
}

fn species_id_re() -> &'static Regex {
    SPECIES_ID_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Normalise and validate a phone number to E.164.
///
/// Accepts a `whatsapp:` prefix (as delivered by the messaging webhook) and
/// strips spaces, dashes and parentheses.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix("whatsapp:").unwrap_or(trimmed);
    let cleaned: String = bare
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    if !phone_re().is_match(&cleaned) {
        return Err(PlantsError::InvalidPhone(raw.to_string()));
    }
    Ok(cleaned)
}

pub fn validate_species_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !species_id_re().is_match(id) {
        return Err(PlantsError::invalid("species id", id));
    }
    Ok(())
}

/// Plant nicknames are shown in WhatsApp as the message author.
pub fn validate_nickname(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > 40 {
        return Err(PlantsError::invalid("nickname", name));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_normalisation() {
        assert_eq!(normalize_phone("+1 (555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(
            normalize_phone("whatsapp:+447700900123").unwrap(),
            "+447700900123"
        );
    }

    #[test]
    fn invalid_phones() {
        for raw in ["", "5551234567", "+0123456789", "+1555", "+1555abc4567"] {
            assert!(normalize_phone(raw).is_err(), "expected invalid: {raw}");
        }
    }

    #[test]
    fn nickname_bounds() {
        assert_eq!(validate_nickname("  Fernando ").unwrap(), "Fernando");
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"x".repeat(41)).is_err());
    }

    #[test]
    fn species_ids() {
        validate_species_id("fiddle-leaf-fig").unwrap();
        assert!(validate_species_id("Fiddle Leaf").is_err());
        assert!(validate_species_id("-pothos").is_err());
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/srv/plants");
        assert_eq!(
            config_path(root),
            PathBuf::from("/srv/plants/.plants/config.yaml")
        );
        assert_eq!(db_path(root), PathBuf::from("/srv/plants/.plants/plants.db"));
        assert_eq!(jobs_path(root), PathBuf::from("/srv/plants/.plants/jobs.redb"));
    }
}
