//! Relational store backed by SQLite.
//!
//! One `SqliteStore` owns one connection. The server shares it behind a
//! mutex and calls it from `spawn_blocking`; every multi-statement write
//! runs in a transaction.

mod billing;
mod claims;
mod conversations;
mod messages;
mod plants;
mod users;
mod waterings;

pub use billing::{BillingEventOutcome, Subscription, SubscriptionUpdate};
pub use claims::{ClaimToken, RedeemOptions, MAX_MINT_BATCH};
pub use conversations::{Conversation, Participant};
pub use messages::{Message, NewMessage, MESSAGE_PAGE};
pub use plants::{Plant, PlantDetail, PlantUpdate};
pub use users::{IdentityProfile, ProfileUpdate, User};
pub use waterings::{ReplyEffect, Watering};

use crate::error::{PlantsError, Result};
use crate::species::{self, Species};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS meta (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
              id TEXT PRIMARY KEY,
              email TEXT,
              display_name TEXT,
              phone TEXT UNIQUE,
              personality TEXT NOT NULL,
              reminder_hour INTEGER NOT NULL,
              utc_offset_minutes INTEGER NOT NULL DEFAULT 0,
              hemisphere TEXT NOT NULL DEFAULT 'north',
              reminders_paused INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS species (
              id TEXT PRIMARY KEY,
              common_name TEXT NOT NULL,
              scientific_name TEXT NOT NULL,
              base_interval_days INTEGER NOT NULL,
              light TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS plants (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              species_id TEXT NOT NULL REFERENCES species(id),
              nickname TEXT NOT NULL,
              personality TEXT NOT NULL,
              pot_size TEXT NOT NULL,
              light_level TEXT NOT NULL,
              moisture_bias INTEGER NOT NULL DEFAULT 0,
              claimed_on TEXT NOT NULL,
              last_reminded_on TEXT,
              last_reminded_at TEXT,
              archived_at TEXT,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS waterings (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              plant_id TEXT NOT NULL REFERENCES plants(id) ON DELETE CASCADE,
              watered_at TEXT NOT NULL,
              source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feedback (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              plant_id TEXT NOT NULL REFERENCES plants(id) ON DELETE CASCADE,
              kind TEXT NOT NULL,
              bias_after INTEGER NOT NULL,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS claim_tokens (
              token TEXT PRIMARY KEY,
              species_id TEXT REFERENCES species(id),
              batch TEXT,
              created_at TEXT NOT NULL,
              redeemed_at TEXT,
              redeemed_by TEXT,
              plant_id TEXT
            );

            CREATE TABLE IF NOT EXISTS conversations (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
              remote_sid TEXT NOT NULL,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS participants (
              conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
              identity TEXT NOT NULL,
              kind TEXT NOT NULL,
              remote_sid TEXT,
              PRIMARY KEY (conversation_id, identity)
            );

            CREATE TABLE IF NOT EXISTS messages (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              plant_id TEXT,
              direction TEXT NOT NULL,
              channel TEXT,
              status TEXT NOT NULL,
              body TEXT NOT NULL,
              remote_sid TEXT,
              error TEXT,
              processed_at TEXT,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
              user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
              provider TEXT NOT NULL,
              external_id TEXT NOT NULL,
              customer_id TEXT,
              status TEXT NOT NULL,
              current_period_end TEXT,
              updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS billing_events (
              provider TEXT NOT NULL,
              event_id TEXT NOT NULL,
              received_at TEXT NOT NULL,
              PRIMARY KEY (provider, event_id)
            );

            CREATE INDEX IF NOT EXISTS idx_plants_user ON plants(user_id);
            CREATE INDEX IF NOT EXISTS idx_waterings_plant ON waterings(plant_id, watered_at);
            CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_subscriptions_external ON subscriptions(provider, external_id);
            "#,
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
            params!["schema_version", "1"],
        )?;
        for s in species::catalogue() {
            self.conn.execute(
                "INSERT OR IGNORE INTO species(id, common_name, scientific_name, base_interval_days, light)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    s.id,
                    s.common_name,
                    s.scientific_name,
                    s.base_interval_days,
                    s.light.as_str()
                ],
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Species
    // -----------------------------------------------------------------------

    pub fn list_species(&self) -> Result<Vec<Species>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, common_name, scientific_name, base_interval_days, light
             FROM species ORDER BY common_name",
        )?;
        let rows = stmt.query_map([], species_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_species(&self, id: &str) -> Result<Species> {
        self.conn
            .query_row(
                "SELECT id, common_name, scientific_name, base_interval_days, light
                 FROM species WHERE id = ?1",
                params![id],
                species_from_row,
            )
            .optional()?
            .ok_or_else(|| PlantsError::SpeciesNotFound(id.to_string()))
    }
}

fn species_from_row(row: &Row<'_>) -> rusqlite::Result<Species> {
    Ok(Species {
        id: row.get(0)?,
        common_name: row.get(1)?,
        scientific_name: row.get(2)?,
        base_interval_days: row.get(3)?,
        light: parse_col(row, 4)?,
    })
}

/// Read a TEXT column into one of the string enums in `types`.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = PlantsError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: PlantsError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_col_opt<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = PlantsError>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        r.parse()
            .map_err(|e: PlantsError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
