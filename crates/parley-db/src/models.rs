//! Database row types. These map directly to SQLite rows.
//! Distinct from parley-types API models to keep the DB layer independent.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use parley_types::api::ConversationPartner;
use parley_types::models::Message;

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub image: Option<String>,
    pub created_at: String,
    pub seen: bool,
    pub deleted: bool,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("corrupt created_at '{}' on message {}", self.created_at, self.id))?
            .with_timezone(&Utc);

        Ok(Message {
            id: self.id.parse().with_context(|| format!("corrupt message id '{}'", self.id))?,
            sender_id: self
                .sender_id
                .parse()
                .with_context(|| format!("corrupt sender_id on message {}", self.id))?,
            receiver_id: self
                .receiver_id
                .parse()
                .with_context(|| format!("corrupt receiver_id on message {}", self.id))?,
            text: self.text,
            image: self.image,
            created_at,
            seen: self.seen,
            deleted: self.deleted,
        })
    }
}

pub struct PartnerRow {
    pub id: String,
    pub username: String,
    pub unseen: u32,
}

impl PartnerRow {
    pub fn into_partner(self) -> Result<ConversationPartner> {
        Ok(ConversationPartner {
            user_id: self.id.parse().with_context(|| format!("corrupt user id '{}'", self.id))?,
            username: self.username,
            unseen: self.unseen,
        })
    }
}
