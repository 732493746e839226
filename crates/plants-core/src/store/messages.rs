use super::{new_id, parse_col, parse_col_opt, SqliteStore};
use crate::error::{PlantsError, Result};
use crate::types::{MessageChannel, MessageDirection, MessageStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const MESSAGE_COLUMNS: &str =
    "id, user_id, plant_id, direction, channel, status, body, remote_sid, error, processed_at, created_at";

/// Default page size for `list_messages`.
pub const MESSAGE_PAGE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub plant_id: Option<String>,
    pub direction: MessageDirection,
    /// How an outbound message went out. `None` until it is delivered.
    pub channel: Option<MessageChannel>,
    pub status: MessageStatus,
    pub body: String,
    pub remote_sid: Option<String>,
    pub error: Option<String>,
    /// When the state change an inbound reply asked for was applied.
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: String,
    pub plant_id: Option<String>,
    pub direction: MessageDirection,
    pub status: MessageStatus,
    pub body: String,
    pub remote_sid: Option<String>,
}

impl NewMessage {
    pub fn outbound(user_id: &str, plant_id: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            plant_id: plant_id.map(str::to_string),
            direction: MessageDirection::Outbound,
            status: MessageStatus::Queued,
            body: body.into(),
            remote_sid: None,
        }
    }

    pub fn inbound(user_id: &str, body: impl Into<String>, remote_sid: Option<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            plant_id: None,
            direction: MessageDirection::Inbound,
            status: MessageStatus::Received,
            body: body.into(),
            remote_sid,
        }
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plant_id: row.get(2)?,
        direction: parse_col(row, 3)?,
        channel: parse_col_opt(row, 4)?,
        status: parse_col(row, 5)?,
        body: row.get(6)?,
        remote_sid: row.get(7)?,
        error: row.get(8)?,
        processed_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl SqliteStore {
    pub fn insert_message(&mut self, new: &NewMessage, now: DateTime<Utc>) -> Result<Message> {
        let id = new_id();
        self.conn.execute(
            "INSERT INTO messages(id, user_id, plant_id, direction, status, body, remote_sid, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                new.user_id,
                new.plant_id,
                new.direction.as_str(),
                new.status.as_str(),
                new.body,
                new.remote_sid,
                now
            ],
        )?;
        self.get_message(&id)
    }

    /// Inbound webhooks can be retried by the provider; a message with the
    /// same remote sid is only stored once.
    pub fn find_message_by_remote_sid(&self, remote_sid: &str) -> Result<Option<Message>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE remote_sid = ?1"),
                params![remote_sid],
                message_from_row,
            )
            .optional()?)
    }

    pub fn update_message_status(
        &mut self,
        id: &str,
        status: MessageStatus,
        channel: Option<MessageChannel>,
        remote_sid: Option<&str>,
        error: Option<&str>,
    ) -> Result<Message> {
        let changed = self.conn.execute(
            "UPDATE messages SET status = ?2,
                                 channel = COALESCE(?3, channel),
                                 remote_sid = COALESCE(?4, remote_sid),
                                 error = ?5
             WHERE id = ?1",
            params![id, status.as_str(), channel.map(|c| c.as_str()), remote_sid, error],
        )?;
        if changed == 0 {
            return Err(PlantsError::MessageNotFound(id.to_string()));
        }
        self.get_message(id)
    }

    /// Attach an inbound message to the plant it was resolved to.
    pub fn set_message_plant(&mut self, id: &str, plant_id: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE messages SET plant_id = ?2 WHERE id = ?1",
            params![id, plant_id],
        )?;
        if changed == 0 {
            return Err(PlantsError::MessageNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn get_message(&self, id: &str) -> Result<Message> {
        self.conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                message_from_row,
            )
            .optional()?
            .ok_or_else(|| PlantsError::MessageNotFound(id.to_string()))
    }

    /// Newest first, optionally narrowed to one plant.
    pub fn list_messages(&self, user_id: &str, plant_id: Option<&str>, limit: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE user_id = ?1 AND (?2 IS NULL OR plant_id = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![user_id, plant_id, limit], message_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Most recent outbound message that named a plant. Replies like "done"
    /// that don't say which plant are matched against it.
    pub fn last_outbound_reminder(&self, user_id: &str) -> Result<Option<Message>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE user_id = ?1 AND direction = 'outbound' AND plant_id IS NOT NULL
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![user_id],
                message_from_row,
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::Duration;

    #[test]
    fn outbound_lifecycle() {
        let mut store = store_with_user("owner");
        let plant = claim_plant(&mut store, "owner", None);
        let msg = store
            .insert_message(&NewMessage::outbound("owner", Some(&plant.id), "drink up"), now())
            .unwrap();
        assert_eq!(msg.status, MessageStatus::Queued);
        assert!(msg.channel.is_none());

        let sent = store
            .update_message_status(
                &msg.id,
                MessageStatus::Sent,
                Some(MessageChannel::Direct),
                Some("SM123"),
                None,
            )
            .unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);
        assert_eq!(sent.channel, Some(MessageChannel::Direct));
        assert_eq!(sent.remote_sid.as_deref(), Some("SM123"));

        assert!(matches!(
            store.update_message_status("nope", MessageStatus::Sent, None, None, None),
            Err(PlantsError::MessageNotFound(_))
        ));
    }

    #[test]
    fn list_filters_by_plant_newest_first() {
        let mut store = store_with_user("owner");
        let a = claim_plant(&mut store, "owner", None);
        let b = claim_plant(&mut store, "owner", None);
        store
            .insert_message(&NewMessage::outbound("owner", Some(&a.id), "first"), now())
            .unwrap();
        store
            .insert_message(
                &NewMessage::outbound("owner", Some(&b.id), "second"),
                now() + Duration::minutes(1),
            )
            .unwrap();
        store
            .insert_message(
                &NewMessage::inbound("owner", "done", Some("SMin".into())),
                now() + Duration::minutes(2),
            )
            .unwrap();

        let all = store.list_messages("owner", None, MESSAGE_PAGE).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].body, "done");
        let only_a = store.list_messages("owner", Some(&a.id), MESSAGE_PAGE).unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].body, "first");

        let last = store.last_outbound_reminder("owner").unwrap().unwrap();
        assert_eq!(last.plant_id.as_deref(), Some(b.id.as_str()));
        assert!(store.find_message_by_remote_sid("SMin").unwrap().is_some());
    }
}
