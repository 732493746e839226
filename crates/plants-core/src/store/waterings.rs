use super::{parse_col, SqliteStore};
use crate::care::apply_feedback;
use crate::error::{PlantsError, Result};
use crate::types::{FeedbackKind, WateringSource};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watering {
    pub id: i64,
    pub plant_id: String,
    pub watered_at: DateTime<Utc>,
    pub source: WateringSource,
}

/// State change asked for by an inbound WhatsApp reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEffect {
    Watered,
    Feedback(FeedbackKind),
}

fn insert_watering(conn: &Connection, plant_id: &str, at: DateTime<Utc>, source: WateringSource) -> Result<i64> {
    let active: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM plants WHERE id = ?1 AND archived_at IS NULL",
            params![plant_id],
            |row| row.get(0),
        )
        .optional()?;
    if active.is_none() {
        return Err(PlantsError::PlantNotFound(plant_id.to_string()));
    }
    conn.execute(
        "INSERT INTO waterings(plant_id, watered_at, source) VALUES (?1, ?2, ?3)",
        params![plant_id, at, source.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn adjust_bias(conn: &Connection, plant_id: &str, kind: FeedbackKind, now: DateTime<Utc>) -> Result<i32> {
    let bias: i32 = conn
        .query_row(
            "SELECT moisture_bias FROM plants WHERE id = ?1 AND archived_at IS NULL",
            params![plant_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| PlantsError::PlantNotFound(plant_id.to_string()))?;
    let next = apply_feedback(bias, kind);
    conn.execute(
        "UPDATE plants SET moisture_bias = ?2, updated_at = ?3 WHERE id = ?1",
        params![plant_id, next, now],
    )?;
    conn.execute(
        "INSERT INTO feedback(plant_id, kind, bias_after, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![plant_id, kind.as_str(), next, now],
    )?;
    Ok(next)
}

impl SqliteStore {
    pub fn record_watering(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        source: WateringSource,
    ) -> Result<Watering> {
        let id = insert_watering(&self.conn, plant_id, at, source)?;
        Ok(Watering {
            id,
            plant_id: plant_id.to_string(),
            watered_at: at,
            source,
        })
    }

    /// Waterings for a plant, oldest first.
    pub fn list_waterings(&self, plant_id: &str) -> Result<Vec<Watering>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, plant_id, watered_at, source FROM waterings
             WHERE plant_id = ?1 ORDER BY watered_at, id",
        )?;
        let rows = stmt.query_map(params![plant_id], |row| {
            Ok(Watering {
                id: row.get(0)?,
                plant_id: row.get(1)?,
                watered_at: row.get(2)?,
                source: parse_col(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn last_watered(&self, plant_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.conn.query_row(
            "SELECT MAX(watered_at) FROM waterings WHERE plant_id = ?1",
            params![plant_id],
            |row| row.get(0),
        )?)
    }

    /// Apply soil feedback to the plant's moisture bias. Returns the new bias.
    pub fn record_feedback(
        &mut self,
        plant_id: &str,
        kind: FeedbackKind,
        now: DateTime<Utc>,
    ) -> Result<i32> {
        let tx = self.conn.transaction()?;
        let next = adjust_bias(&tx, plant_id, kind, now)?;
        tx.commit()?;
        Ok(next)
    }

    /// Apply the effect of an inbound reply to `plant_id` and stamp the
    /// message as processed, in one transaction. Returns false, writing
    /// nothing, when the message was processed before.
    pub fn apply_reply(
        &mut self,
        message_id: &str,
        plant_id: &str,
        effect: ReplyEffect,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let stamped = tx.execute(
            "UPDATE messages SET processed_at = ?2, plant_id = ?3
             WHERE id = ?1 AND direction = 'inbound' AND processed_at IS NULL",
            params![message_id, now, plant_id],
        )?;
        if stamped == 0 {
            let known: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM messages WHERE id = ?1",
                    params![message_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match known {
                Some(_) => Ok(false),
                None => Err(PlantsError::MessageNotFound(message_id.to_string())),
            };
        }
        match effect {
            ReplyEffect::Watered => {
                insert_watering(&tx, plant_id, now, WateringSource::Whatsapp)?;
            }
            ReplyEffect::Feedback(kind) => {
                adjust_bias(&tx, plant_id, kind, now)?;
            }
        }
        tx.commit()?;
        Ok(true)
    }
}
