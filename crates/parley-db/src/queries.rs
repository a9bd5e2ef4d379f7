use crate::Database;
use crate::models::{MessageRow, PartnerRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use parley_types::models::TOMBSTONE_TEXT;
use rusqlite::{Connection, Row};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, text, image, created_at, seen, deleted";

impl Database {
    // -- Users --

    /// Record a user seen in a validated token. Keeps the latest username.
    pub fn upsert_user(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET username = excluded.username",
                (id, username),
            )?;
            Ok(())
        })
    }

    /// Every other known user with the count of their unseen, undeleted
    /// messages addressed to `user_id`.
    pub fn list_partners(&self, user_id: &str) -> Result<Vec<PartnerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.sender_id = u.id AND m.receiver_id = ?1
                            AND m.seen = 0 AND m.deleted = 0)
                 FROM users u
                 WHERE u.id != ?1
                 ORDER BY u.username",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(PartnerRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        unseen: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Store a new message. The store owns id and timestamp assignment.
    pub fn insert_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<MessageRow> {
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text: text.to_string(),
            image: image.map(str::to_string),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            seen: false,
            deleted: false,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.sender_id,
                    row.receiver_id,
                    row.text,
                    row.image,
                    row.created_at
                ],
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Both directions of the conversation between `a` and `b`, newest first.
    pub fn get_conversation(&self, a: &str, b: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![a, b, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark a message seen on behalf of its receiver.
    /// Returns false if no such message is addressed to `receiver_id`.
    pub fn mark_seen(&self, id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET seen = 1 WHERE id = ?1 AND receiver_id = ?2",
                (id, receiver_id),
            )?;
            Ok(updated > 0)
        })
    }

    /// Tombstone a message and return the stored result. Idempotent.
    pub fn mark_deleted(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET deleted = 1, text = ?2, image = NULL WHERE id = ?1",
                (id, TOMBSTONE_TEXT),
            )?;
            query_message(conn, id)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        created_at: row.get(5)?,
        seen: row.get(6)?,
        deleted: row.get(7)?,
    })
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    let row = conn.query_row(&sql, [id], message_from_row).optional()?;
    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
