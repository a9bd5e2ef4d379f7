use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use parley_types::models::Message;

/// Local placeholder id for a message the server has not confirmed yet.
/// Never leaves the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(pub u64);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// A message as composed locally, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub temp_id: TempId,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of a conversation.
///
/// A draft starts `Provisional` and either becomes `Confirmed` when the server
/// accepts it or is dropped from the list when the send fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Provisional(Draft),
    Confirmed(Message),
}

impl Entry {
    pub fn text(&self) -> &str {
        match self {
            Entry::Provisional(d) => &d.text,
            Entry::Confirmed(m) => &m.text,
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            Entry::Provisional(d) => d.image.as_deref(),
            Entry::Confirmed(m) => m.image.as_deref(),
        }
    }

    pub fn sender_id(&self) -> Uuid {
        match self {
            Entry::Provisional(d) => d.sender_id,
            Entry::Confirmed(m) => m.sender_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Entry::Provisional(d) => d.created_at,
            Entry::Confirmed(m) => m.created_at,
        }
    }

    pub fn message_id(&self) -> Option<Uuid> {
        match self {
            Entry::Confirmed(m) => Some(m.id),
            Entry::Provisional(_) => None,
        }
    }

    pub fn temp_id(&self) -> Option<TempId> {
        match self {
            Entry::Provisional(d) => Some(d.temp_id),
            Entry::Confirmed(_) => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Entry::Provisional(_))
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Entry::Confirmed(m) if m.deleted)
    }
}

/// Messages with one counterpart, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    entries: Vec<Entry>,
}

impl Conversation {
    pub fn from_messages(mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self {
            entries: messages.into_iter().map(Entry::Confirmed).collect(),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn prepend(&mut self, entry: Entry) {
        self.entries.insert(0, entry);
    }

    pub fn contains_message(&self, message_id: Uuid) -> bool {
        self.position_of_message(message_id).is_some()
    }

    pub fn message(&self, message_id: Uuid) -> Option<&Message> {
        self.entries.iter().find_map(|e| match e {
            Entry::Confirmed(m) if m.id == message_id => Some(m),
            _ => None,
        })
    }

    /// Swap the draft `temp_id` for the server's copy, keeping its position.
    /// If the confirmed id is already listed the draft is dropped instead, so
    /// a message never appears twice. Returns false if the draft is gone.
    pub fn confirm(&mut self, temp_id: TempId, message: Message) -> bool {
        let Some(pos) = self.position_of_draft(temp_id) else {
            return false;
        };
        if self.contains_message(message.id) {
            self.entries.remove(pos);
        } else {
            self.entries[pos] = Entry::Confirmed(message);
        }
        true
    }

    /// Drop the draft `temp_id`. Returns false if it was not present.
    pub fn roll_back(&mut self, temp_id: TempId) -> bool {
        match self.position_of_draft(temp_id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Tombstone a confirmed message in place.
    pub fn tombstone(&mut self, message_id: Uuid) -> bool {
        match self.confirmed_mut(message_id) {
            Some(m) => {
                m.tombstone();
                true
            }
            None => false,
        }
    }

    /// Replace a confirmed message with a newer copy of itself, in place.
    pub fn replace(&mut self, message: Message) -> bool {
        match self.confirmed_mut(message.id) {
            Some(m) => {
                *m = message;
                true
            }
            None => false,
        }
    }

    pub fn mark_seen(&mut self, message_id: Uuid) -> bool {
        match self.confirmed_mut(message_id) {
            Some(m) => {
                m.seen = true;
                true
            }
            None => false,
        }
    }

    fn confirmed_mut(&mut self, message_id: Uuid) -> Option<&mut Message> {
        self.entries.iter_mut().find_map(|e| match e {
            Entry::Confirmed(m) if m.id == message_id => Some(m),
            _ => None,
        })
    }

    fn position_of_message(&self, message_id: Uuid) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.message_id() == Some(message_id))
    }

    fn position_of_draft(&self, temp_id: TempId) -> Option<usize> {
        self.entries.iter().position(|e| e.temp_id() == Some(temp_id))
    }
}

/// Per-counterpart conversations plus unseen counters.
///
/// No eviction: a two-party client holds one entry per person it has opened.
#[derive(Debug, Default)]
pub struct ConversationCache {
    conversations: HashMap<Uuid, Conversation>,
    unseen: HashMap<Uuid, u32>,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counterpart: Uuid) -> Option<&Conversation> {
        self.conversations.get(&counterpart)
    }

    pub fn get_mut(&mut self, counterpart: Uuid) -> Option<&mut Conversation> {
        self.conversations.get_mut(&counterpart)
    }

    pub fn contains(&self, counterpart: Uuid) -> bool {
        self.conversations.contains_key(&counterpart)
    }

    pub fn insert(&mut self, counterpart: Uuid, conversation: Conversation) {
        self.conversations.insert(counterpart, conversation);
    }

    /// The cached conversation holding `message_id`, whichever it is.
    pub fn find_message_mut(&mut self, message_id: Uuid) -> Option<&mut Conversation> {
        self.conversations
            .values_mut()
            .find(|c| c.contains_message(message_id))
    }

    pub fn unseen(&self, counterpart: Uuid) -> u32 {
        self.unseen.get(&counterpart).copied().unwrap_or(0)
    }

    pub fn unseen_counts(&self) -> &HashMap<Uuid, u32> {
        &self.unseen
    }

    pub fn bump_unseen(&mut self, counterpart: Uuid) {
        *self.unseen.entry(counterpart).or_insert(0) += 1;
    }

    pub fn set_unseen(&mut self, counterpart: Uuid, count: u32) {
        self.unseen.insert(counterpart, count);
    }

    pub fn reset_unseen(&mut self, counterpart: Uuid) {
        self.unseen.insert(counterpart, 0);
    }
}
