use super::{parse_col, SqliteStore};
use crate::error::{PlantsError, Result};
use crate::paths::normalize_phone;
use crate::types::{Hemisphere, Personality};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const USER_COLUMNS: &str = "id, email, display_name, phone, personality, reminder_hour, \
     utc_offset_minutes, hemisphere, reminders_paused, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Subject id issued by the identity provider.
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    /// Personality given to newly claimed plants.
    pub personality: Personality,
    pub reminder_hour: u32,
    pub utc_offset_minutes: i32,
    pub hemisphere: Hemisphere,
    pub reminders_paused: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name used in message templates.
    pub fn first_name(&self) -> Option<String> {
        self.display_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .map(str::to_string)
    }
}

/// What the identity provider knows about a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partial profile update from `PUT /api/me`. An empty `phone` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub personality: Option<Personality>,
    pub reminder_hour: Option<u32>,
    pub utc_offset_minutes: Option<i32>,
    pub hemisphere: Option<Hemisphere>,
    pub reminders_paused: Option<bool>,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        phone: row.get(3)?,
        personality: parse_col(row, 4)?,
        reminder_hour: row.get(5)?,
        utc_offset_minutes: row.get(6)?,
        hemisphere: parse_col(row, 7)?,
        reminders_paused: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn clean_phone(raw: Option<&str>) -> Result<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) => normalize_phone(p).map(Some),
    }
}

impl SqliteStore {
    /// Create the user on first sight; refresh identity fields the provider
    /// sends. Local preferences are never overwritten.
    pub fn upsert_user(
        &mut self,
        profile: &IdentityProfile,
        default_hour: u32,
        now: DateTime<Utc>,
    ) -> Result<User> {
        if profile.id.trim().is_empty() {
            return Err(PlantsError::invalid("user id", &profile.id));
        }
        let phone = clean_phone(profile.phone.as_deref())?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO users(id, email, display_name, phone, personality, reminder_hour,
                               utc_offset_minutes, hemisphere, reminders_paused, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, 0, ?8, ?8)
             ON CONFLICT(id) DO UPDATE SET
               email = COALESCE(excluded.email, users.email),
               display_name = COALESCE(users.display_name, excluded.display_name),
               phone = COALESCE(excluded.phone, users.phone),
               updated_at = excluded.updated_at",
            params![
                profile.id,
                profile.email,
                profile.display_name,
                phone,
                Personality::default().as_str(),
                default_hour.min(23),
                Hemisphere::default().as_str(),
                now
            ],
        )?;
        tx.commit()?;
        self.get_user(&profile.id)
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?
            .ok_or_else(|| PlantsError::UserNotFound(id.to_string()))
    }

    pub fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let phone = normalize_phone(phone)?;
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
                params![phone],
                user_from_row,
            )
            .optional()?)
    }

    pub fn update_profile(&mut self, id: &str, update: &ProfileUpdate, now: DateTime<Utc>) -> Result<User> {
        let mut user = self.get_user(id)?;
        if let Some(name) = &update.display_name {
            let trimmed = name.trim();
            user.display_name = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        if let Some(phone) = &update.phone {
            user.phone = clean_phone(Some(phone))?;
        }
        if let Some(p) = update.personality {
            user.personality = p;
        }
        if let Some(hour) = update.reminder_hour {
            if hour > 23 {
                return Err(PlantsError::invalid("reminder hour", hour.to_string()));
            }
            user.reminder_hour = hour;
        }
        if let Some(offset) = update.utc_offset_minutes {
            if !(-720..=840).contains(&offset) {
                return Err(PlantsError::invalid("utc offset", offset.to_string()));
            }
            user.utc_offset_minutes = offset;
        }
        if let Some(h) = update.hemisphere {
            user.hemisphere = h;
        }
        if let Some(paused) = update.reminders_paused {
            user.reminders_paused = paused;
        }

        let tx = self.conn.transaction()?;
        if let Some(phone) = &user.phone {
            let taken: Option<String> = tx
                .query_row(
                    "SELECT id FROM users WHERE phone = ?1 AND id != ?2",
                    params![phone, id],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Err(PlantsError::invalid("phone (already registered)", phone.clone()));
            }
        }
        tx.execute(
            "UPDATE users SET display_name = ?2, phone = ?3, personality = ?4, reminder_hour = ?5,
                              utc_offset_minutes = ?6, hemisphere = ?7, reminders_paused = ?8,
                              updated_at = ?9
             WHERE id = ?1",
            params![
                id,
                user.display_name,
                user.phone,
                user.personality.as_str(),
                user.reminder_hour,
                user.utc_offset_minutes,
                user.hemisphere.as_str(),
                user.reminders_paused,
                now
            ],
        )?;
        tx.commit()?;
        self.get_user(id)
    }

    pub fn set_paused(&mut self, id: &str, paused: bool, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE users SET reminders_paused = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, paused, now],
        )?;
        if changed == 0 {
            return Err(PlantsError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Remove a user and everything they own. Returns false if unknown.
    pub fn delete_user(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE claim_tokens SET plant_id = NULL WHERE redeemed_by = ?1",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn upsert_user_creates_with_defaults() {
        let store = store_with_user("user_1");
        let user = store.get_user("user_1").unwrap();
        assert_eq!(user.personality, Personality::Classic);
        assert_eq!(user.reminder_hour, 9);
        assert_eq!(user.hemisphere, Hemisphere::North);
        assert!(!user.reminders_paused);
        assert_eq!(user.first_name().as_deref(), Some("Sam"));
    }

    #[test]
    fn upsert_user_keeps_local_preferences() {
        let mut store = store_with_user("user_1");
        store
            .update_profile(
                "user_1",
                &ProfileUpdate {
                    display_name: Some("Samantha Green".into()),
                    reminder_hour: Some(18),
                    ..ProfileUpdate::default()
                },
                now(),
            )
            .unwrap();
        let again = store
            .upsert_user(
                &IdentityProfile {
                    id: "user_1".into(),
                    email: Some("new@example.com".into()),
                    display_name: Some("Other".into()),
                    phone: None,
                },
                9,
                now(),
            )
            .unwrap();
        assert_eq!(again.email.as_deref(), Some("new@example.com"));
        assert_eq!(again.display_name.as_deref(), Some("Samantha Green"));
        assert_eq!(again.reminder_hour, 18);
    }

    #[test]
    fn profile_update_validates_inputs() {
        let mut store = store_with_user("user_1");
        let bad_hour = ProfileUpdate {
            reminder_hour: Some(24),
            ..ProfileUpdate::default()
        };
        assert!(store.update_profile("user_1", &bad_hour, now()).is_err());
        let bad_offset = ProfileUpdate {
            utc_offset_minutes: Some(900),
            ..ProfileUpdate::default()
        };
        assert!(store.update_profile("user_1", &bad_offset, now()).is_err());
        let bad_phone = ProfileUpdate {
            phone: Some("12345".into()),
            ..ProfileUpdate::default()
        };
        assert!(matches!(
            store.update_profile("user_1", &bad_phone, now()),
            Err(PlantsError::InvalidPhone(_))
        ));
    }

    #[test]
    fn rejected_update_changes_nothing() {
        let mut store = store_with_user("user_1");
        let update = ProfileUpdate {
            reminders_paused: Some(true),
            personality: Some(Personality::Zen),
            reminder_hour: Some(99),
            ..ProfileUpdate::default()
        };
        assert!(store.update_profile("user_1", &update, now()).is_err());
        let user = store.get_user("user_1").unwrap();
        assert!(!user.reminders_paused);
        assert_eq!(user.personality, Personality::Classic);

        let pause = ProfileUpdate {
            reminders_paused: Some(true),
            ..ProfileUpdate::default()
        };
        assert!(store.update_profile("user_1", &pause, now()).unwrap().reminders_paused);
    }

    #[test]
    fn phone_lookup_and_uniqueness() {
        let mut store = store_with_user("user_1");
        add_user(&mut store, "user_2");
        let set_phone = ProfileUpdate {
            phone: Some("+1 555 123 4567".into()),
            ..ProfileUpdate::default()
        };
        store.update_profile("user_1", &set_phone, now()).unwrap();
        let found = store.find_user_by_phone("whatsapp:+15551234567").unwrap().unwrap();
        assert_eq!(found.id, "user_1");
        assert!(store.update_profile("user_2", &set_phone, now()).is_err());

        let clear = ProfileUpdate {
            phone: Some(String::new()),
            ..ProfileUpdate::default()
        };
        let user = store.update_profile("user_1", &clear, now()).unwrap();
        assert!(user.phone.is_none());
    }

    #[test]
    fn pause_and_delete() {
        let mut store = store_with_user("user_1");
        store.set_paused("user_1", true, now()).unwrap();
        assert!(store.get_user("user_1").unwrap().reminders_paused);
        assert!(store.set_paused("ghost", true, now()).is_err());

        let plant = claim_plant(&mut store, "user_1", None);
        assert!(store.delete_user("user_1").unwrap());
        assert!(!store.delete_user("user_1").unwrap());
        assert!(matches!(
            store.get_plant(&plant.id),
            Err(PlantsError::PlantNotFound(_))
        ));
    }
}
