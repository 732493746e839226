use super::{new_id, parse_col, SqliteStore};
use crate::error::{PlantsError, Result};
use crate::types::ParticipantKind;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// The per-owner group thread on the messaging provider. Each of the
/// owner's plants joins it as its own participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub remote_sid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: String,
    /// Phone number for WhatsApp participants, plant id for plants.
    pub identity: String,
    pub kind: ParticipantKind,
    pub remote_sid: Option<String>,
}

impl SqliteStore {
    pub fn get_conversation(&self, user_id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, remote_sid, created_at FROM conversations WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        remote_sid: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Record the remote conversation for `user_id`. If one is already
    /// stored it is returned unchanged.
    pub fn save_conversation(
        &mut self,
        user_id: &str,
        remote_sid: &str,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        self.conn.execute(
            "INSERT INTO conversations(id, user_id, remote_sid, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO NOTHING",
            params![new_id(), user_id, remote_sid, now],
        )?;
        self.get_conversation(user_id)?
            .ok_or_else(|| PlantsError::UserNotFound(user_id.to_string()))
    }

    /// Returns false when the participant was already present.
    pub fn add_participant(&mut self, participant: &Participant) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO participants(conversation_id, identity, kind, remote_sid)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                participant.conversation_id,
                participant.identity,
                participant.kind.as_str(),
                participant.remote_sid
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn list_participants(&self, conversation_id: &str) -> Result<Vec<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, identity, kind, remote_sid FROM participants
             WHERE conversation_id = ?1 ORDER BY kind, identity",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(Participant {
                conversation_id: row.get(0)?,
                identity: row.get(1)?,
                kind: parse_col(row, 2)?,
                remote_sid: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn conversation_is_one_per_user() {
        let mut store = store_with_user("owner");
        assert!(store.get_conversation("owner").unwrap().is_none());
        let first = store.save_conversation("owner", "CH111", now()).unwrap();
        let second = store.save_conversation("owner", "CH222", now()).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.remote_sid, "CH111");
    }

    #[test]
    fn participants_are_deduplicated() {
        let mut store = store_with_user("owner");
        let convo = store.save_conversation("owner", "CH111", now()).unwrap();
        let phone = Participant {
            conversation_id: convo.id.clone(),
            identity: "+15551234567".into(),
            kind: ParticipantKind::Whatsapp,
            remote_sid: Some("MB1".into()),
        };
        assert!(store.add_participant(&phone).unwrap());
        assert!(!store.add_participant(&phone).unwrap());
        store
            .add_participant(&Participant {
                conversation_id: convo.id.clone(),
                identity: "plant-1".into(),
                kind: ParticipantKind::Plant,
                remote_sid: None,
            })
            .unwrap();
        let all = store.list_participants(&convo.id).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, ParticipantKind::Plant);
        assert_eq!(all[1].identity, "+15551234567");
    }
}
