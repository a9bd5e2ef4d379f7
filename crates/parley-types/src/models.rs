use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text shown in place of a deleted message's body.
pub const TOMBSTONE_TEXT: &str = "This message was deleted";

/// A direct message between two users.
///
/// `id` and `created_at` are assigned by the store; clients never invent them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub seen: bool,
    pub deleted: bool,
}

impl Message {
    /// Mark the message deleted. Calling it twice leaves the same result.
    pub fn tombstone(&mut self) {
        self.deleted = true;
        self.text = TOMBSTONE_TEXT.to_string();
        self.image = None;
    }

    pub fn tombstoned(mut self) -> Self {
        self.tombstone();
        self
    }

    /// True if `user_id` is either end of this conversation.
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// The other participant, seen from `user_id`.
    pub fn counterpart_of(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}
