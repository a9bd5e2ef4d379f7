use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::api::{ConversationPartner, SendMessageRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::Message;

use crate::cache::{Conversation, ConversationCache, Draft, Entry, TempId};
use crate::error::{ApiError, ClientError, Notice};

/// The request/response calls the engine depends on.
#[allow(async_fn_in_trait)]
pub trait ChatApi {
    async fn list_partners(&self) -> Result<Vec<ConversationPartner>, ApiError>;
    async fn fetch_messages(&self, counterpart: Uuid) -> Result<Vec<Message>, ApiError>;
    async fn send_message(
        &self,
        receiver: Uuid,
        request: &SendMessageRequest,
    ) -> Result<Message, ApiError>;
    async fn mark_seen(&self, message_id: Uuid) -> Result<(), ApiError>;
    async fn delete_message(&self, message_id: Uuid) -> Result<Message, ApiError>;
}

/// A send whose draft is already visible and whose request is not resolved.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub temp_id: TempId,
    pub receiver_id: Uuid,
    pub request: SendMessageRequest,
}

/// Client-side view of the user's conversations.
///
/// All state changes go through `&mut self`, so pushes and request
/// completions are applied one at a time.
pub struct SyncEngine<A> {
    api: A,
    user_id: Uuid,
    cache: ConversationCache,
    open: Option<Uuid>,
    online: HashSet<Uuid>,
    partners: Vec<ConversationPartner>,
    notices: Vec<Notice>,
    last_temp_id: u64,
}

impl<A: ChatApi> SyncEngine<A> {
    pub fn new(api: A, user_id: Uuid) -> Self {
        Self {
            api,
            user_id,
            cache: ConversationCache::new(),
            open: None,
            online: HashSet::new(),
            partners: Vec::new(),
            notices: Vec::new(),
            last_temp_id: 0,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn open_counterpart(&self) -> Option<Uuid> {
        self.open
    }

    /// Entries of the open conversation, newest first. Empty when none is open.
    pub fn live_view(&self) -> &[Entry] {
        self.open
            .and_then(|c| self.cache.get(c))
            .map(Conversation::entries)
            .unwrap_or(&[])
    }

    pub fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    pub fn unseen(&self, counterpart: Uuid) -> u32 {
        self.cache.unseen(counterpart)
    }

    pub fn online_users(&self) -> &HashSet<Uuid> {
        &self.online
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online.contains(&user_id)
    }

    pub fn partners(&self) -> &[ConversationPartner] {
        &self.partners
    }

    /// Drain notices queued for the user.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Reload the partner list and server-side unseen counts.
    pub async fn refresh_partners(&mut self) -> Result<(), ClientError> {
        let partners = match self.api.list_partners().await {
            Ok(partners) => partners,
            Err(e) => return Err(self.fetch_failed(e)),
        };

        for partner in &partners {
            if self.open == Some(partner.user_id) {
                self.cache.reset_unseen(partner.user_id);
            } else {
                self.cache.set_unseen(partner.user_id, partner.unseen);
            }
        }
        self.partners = partners;
        Ok(())
    }

    /// Show the conversation with `counterpart`, from cache when possible.
    ///
    /// A cache hit makes no request at all. Unseen incoming messages are left
    /// for `acknowledge_open`, so the view is usable before any ack goes out.
    pub async fn open(&mut self, counterpart: Uuid) -> Result<(), ClientError> {
        if !self.cache.contains(counterpart) {
            let messages = match self.api.fetch_messages(counterpart).await {
                Ok(messages) => messages,
                Err(e) => return Err(self.fetch_failed(e)),
            };
            debug!("Loaded {} messages with {}", messages.len(), counterpart);
            self.cache.insert(counterpart, Conversation::from_messages(messages));
        }

        self.open = Some(counterpart);
        self.cache.reset_unseen(counterpart);
        Ok(())
    }

    /// Ids in the open conversation that are addressed to us and not yet seen.
    pub fn unacknowledged(&self) -> Vec<Uuid> {
        let Some(conversation) = self.open.and_then(|c| self.cache.get(c)) else {
            return Vec::new();
        };
        conversation
            .entries()
            .iter()
            .filter_map(|e| match e {
                Entry::Confirmed(m) if self.awaits_ack(m) => Some(m.id),
                _ => None,
            })
            .collect()
    }

    /// Mark every unseen incoming message of the open conversation as seen.
    /// Failures are logged and the message stays unseen locally.
    pub async fn acknowledge_open(&mut self) {
        let Some(counterpart) = self.open else {
            return;
        };
        for id in self.unacknowledged() {
            self.ack(counterpart, id).await;
        }
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    /// Put a draft at the top of the open conversation. The caller must pass
    /// the returned `PendingSend` to `complete_send` once the request resolves.
    pub fn begin_send(
        &mut self,
        text: impl Into<String>,
        image: Option<String>,
    ) -> Result<PendingSend, ClientError> {
        let receiver_id = self.open.ok_or(ClientError::NoOpenConversation)?;
        let temp_id = self.next_temp_id();
        let text = text.into();

        let draft = Draft {
            temp_id,
            sender_id: self.user_id,
            receiver_id,
            text: text.clone(),
            image: image.clone(),
            created_at: Utc::now(),
        };
        self.cache
            .get_mut(receiver_id)
            .ok_or(ClientError::NoOpenConversation)?
            .prepend(Entry::Provisional(draft));

        Ok(PendingSend {
            temp_id,
            receiver_id,
            request: SendMessageRequest { text, image },
        })
    }

    /// Reconcile or roll back the draft of `pending`.
    pub fn complete_send(
        &mut self,
        pending: PendingSend,
        result: Result<Message, ApiError>,
    ) -> Result<(), ClientError> {
        let conversation = self.cache.get_mut(pending.receiver_id);

        match result {
            Ok(message) => {
                let id = message.id;
                let confirmed = conversation.is_some_and(|c| c.confirm(pending.temp_id, message));
                if !confirmed {
                    warn!("Draft {} vanished before confirmation of {}", pending.temp_id, id);
                }
                if self.open == Some(pending.receiver_id) {
                    self.cache.reset_unseen(pending.receiver_id);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(c) = conversation {
                    c.roll_back(pending.temp_id);
                }
                warn!("Send {} to {} failed: {}", pending.temp_id, pending.receiver_id, e);
                self.notices.push(Notice::SendFailed {
                    counterpart: pending.receiver_id,
                    text: pending.request.text,
                    reason: e.to_string(),
                });
                Err(ClientError::SendFailed(e))
            }
        }
    }

    /// Optimistically send to the open conversation.
    pub async fn send(
        &mut self,
        text: impl Into<String>,
        image: Option<String>,
    ) -> Result<(), ClientError> {
        let pending = self.begin_send(text, image)?;
        let result = self
            .api
            .send_message(pending.receiver_id, &pending.request)
            .await;
        self.complete_send(pending, result)
    }

    /// Tombstone locally, then ask the server. A failed request keeps the
    /// local tombstone; the next full fetch settles it.
    pub async fn delete(&mut self, message_id: Uuid) {
        if let Some(c) = self.cache.find_message_mut(message_id) {
            c.tombstone(message_id);
        }

        match self.api.delete_message(message_id).await {
            Ok(stored) if stored.deleted => {
                if let Some(c) = self.cache.find_message_mut(message_id) {
                    c.replace(stored);
                }
            }
            Ok(_) => warn!("Server returned {} without a tombstone", message_id),
            Err(e) => warn!("Delete of {} failed, keeping local tombstone: {}", message_id, e),
        }
    }

    /// Apply one event pushed over the gateway.
    pub async fn handle_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { user_id } => debug!("Gateway ready for {}", user_id),
            GatewayEvent::GetOnlineUsers(ids) => {
                self.online = ids.into_iter().collect();
            }
            GatewayEvent::NewMessage(message) => self.apply_new_message(message).await,
            GatewayEvent::MessageDeleted(message) => self.apply_deleted(message),
        }
    }

    async fn apply_new_message(&mut self, message: Message) {
        if !message.involves(self.user_id) {
            warn!("Ignoring message {} not addressed to us", message.id);
            return;
        }

        let counterpart = message.counterpart_of(self.user_id);
        let id = message.id;

        if self.open == Some(counterpart) {
            if let Some(c) = self.cache.get_mut(counterpart) {
                if !c.contains_message(id) {
                    c.prepend(Entry::Confirmed(message));
                }
            }
            self.cache.reset_unseen(counterpart);
            // Judge by the held copy: a repeated push of an acked message is not acked again
            let needs_ack = self
                .cache
                .get(counterpart)
                .and_then(|c| c.message(id))
                .is_some_and(|m| self.awaits_ack(m));
            if needs_ack {
                self.ack(counterpart, id).await;
            }
            return;
        }

        // Keep a cached conversation warm so reopening it shows this message
        if let Some(c) = self.cache.get_mut(counterpart) {
            if c.contains_message(id) {
                return;
            }
            c.prepend(Entry::Confirmed(message.clone()));
        }
        if message.sender_id != self.user_id {
            self.cache.bump_unseen(message.sender_id);
            info!("New message from {} ({} unseen)", message.sender_id, self.cache.unseen(message.sender_id));
        }
    }

    fn apply_deleted(&mut self, message: Message) {
        let message = message.tombstoned();
        match self.cache.find_message_mut(message.id) {
            Some(c) => {
                c.replace(message);
            }
            None => debug!("Deleted message {} not held locally", message.id),
        }
    }

    fn awaits_ack(&self, message: &Message) -> bool {
        message.receiver_id == self.user_id && !message.seen && !message.deleted
    }

    async fn ack(&mut self, counterpart: Uuid, message_id: Uuid) {
        match self.api.mark_seen(message_id).await {
            Ok(()) => {
                if let Some(c) = self.cache.get_mut(counterpart) {
                    c.mark_seen(message_id);
                }
            }
            Err(e) => warn!("Failed to mark {} seen: {}", message_id, e),
        }
    }

    fn fetch_failed(&mut self, e: ApiError) -> ClientError {
        warn!("Fetch failed: {}", e);
        self.notices.push(Notice::FetchFailed { reason: e.to_string() });
        ClientError::FetchFailed(e)
    }

    /// Millisecond timestamp, bumped when two drafts land in the same millisecond.
    fn next_temp_id(&mut self) -> TempId {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let id = now.max(self.last_temp_id + 1);
        self.last_temp_id = id;
        TempId(id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Duration;
    use parley_types::models::TOMBSTONE_TEXT;

    use super::*;

    #[derive(Default)]
    struct FakeState {
        conversations: HashMap<Uuid, Vec<Message>>,
        partners: Vec<ConversationPartner>,
        fetch_calls: usize,
        calls: usize,
        fail_fetch: bool,
        fail_send: bool,
        fail_delete: bool,
        sent: Vec<(Uuid, SendMessageRequest)>,
        acked: Vec<Uuid>,
        deleted: Vec<Uuid>,
    }

    struct FakeApi {
        me: Uuid,
        state: Mutex<FakeState>,
    }

    impl FakeApi {
        fn new(me: Uuid) -> Self {
            Self {
                me,
                state: Mutex::new(FakeState::default()),
            }
        }

        fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }
    }

    impl ChatApi for FakeApi {
        async fn list_partners(&self) -> Result<Vec<ConversationPartner>, ApiError> {
            self.with(|s| {
                s.calls += 1;
                s.fetch_calls += 1;
                if s.fail_fetch {
                    Err(ApiError::Rejected(503))
                } else {
                    Ok(s.partners.clone())
                }
            })
        }

        async fn fetch_messages(&self, counterpart: Uuid) -> Result<Vec<Message>, ApiError> {
            self.with(|s| {
                s.calls += 1;
                s.fetch_calls += 1;
                if s.fail_fetch {
                    Err(ApiError::Rejected(503))
                } else {
                    Ok(s.conversations.get(&counterpart).cloned().unwrap_or_default())
                }
            })
        }

        async fn send_message(
            &self,
            receiver: Uuid,
            request: &SendMessageRequest,
        ) -> Result<Message, ApiError> {
            let me = self.me;
            self.with(|s| {
                s.calls += 1;
                if s.fail_send {
                    return Err(ApiError::Rejected(500));
                }
                s.sent.push((receiver, request.clone()));
                Ok(Message {
                    id: Uuid::new_v4(),
                    sender_id: me,
                    receiver_id: receiver,
                    text: request.text.clone(),
                    image: request.image.clone(),
                    created_at: Utc::now(),
                    seen: false,
                    deleted: false,
                })
            })
        }

        async fn mark_seen(&self, message_id: Uuid) -> Result<(), ApiError> {
            self.with(|s| {
                s.calls += 1;
                s.acked.push(message_id);
            });
            Ok(())
        }

        async fn delete_message(&self, message_id: Uuid) -> Result<Message, ApiError> {
            self.with(|s| {
                s.calls += 1;
                if s.fail_delete {
                    return Err(ApiError::Rejected(500));
                }
                s.deleted.push(message_id);
                s.conversations
                    .values()
                    .flatten()
                    .find(|m| m.id == message_id)
                    .cloned()
                    .map(Message::tombstoned)
                    .ok_or(ApiError::Rejected(404))
            })
        }
    }

    fn msg(from: Uuid, to: Uuid, text: &str, age_secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: from,
            receiver_id: to,
            text: text.into(),
            image: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
            seen: false,
            deleted: false,
        }
    }

    fn engine() -> (SyncEngine<FakeApi>, Uuid, Uuid) {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        (SyncEngine::new(FakeApi::new(me), me), me, them)
    }

    #[tokio::test]
    async fn open_fetches_once_then_serves_from_cache() {
        let (mut engine, me, them) = engine();
        engine.api().with(|s| {
            s.conversations.insert(
                them,
                vec![msg(me, them, "first", 20), msg(them, me, "second", 10)],
            );
        });

        engine.open(them).await.unwrap();
        let texts: Vec<&str> = engine.live_view().iter().map(Entry::text).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(engine.api().with(|s| s.fetch_calls), 1);

        engine.close();
        assert!(engine.live_view().is_empty());

        engine.open(them).await.unwrap();
        assert_eq!(engine.api().with(|s| s.fetch_calls), 1);
        assert_eq!(engine.live_view().len(), 2);
    }

    #[tokio::test]
    async fn open_acknowledges_unseen_incoming() {
        let (mut engine, me, them) = engine();
        let incoming = msg(them, me, "unread", 5);
        let outgoing = msg(me, them, "mine", 1);
        engine.api().with(|s| {
            s.conversations
                .insert(them, vec![incoming.clone(), outgoing.clone()]);
        });

        engine.open(them).await.unwrap();
        assert!(engine.api().with(|s| s.acked.is_empty()));
        assert_eq!(engine.unacknowledged(), vec![incoming.id]);

        engine.acknowledge_open().await;
        assert_eq!(engine.api().with(|s| s.acked.clone()), vec![incoming.id]);
        let stored = engine.cache().get(them).unwrap().message(incoming.id).unwrap();
        assert!(stored.seen);
        assert!(engine.unacknowledged().is_empty());

        // Nothing left to acknowledge
        engine.acknowledge_open().await;
        assert_eq!(engine.api().with(|s| s.acked.len()), 1);
    }

    #[tokio::test]
    async fn cache_hit_open_makes_no_requests() {
        let (mut engine, me, them) = engine();
        engine.open(them).await.unwrap();
        engine.close();

        for text in ["one", "two", "three"] {
            engine
                .handle_event(GatewayEvent::NewMessage(msg(them, me, text, 0)))
                .await;
        }
        let calls_before = engine.api().with(|s| s.calls);

        engine.open(them).await.unwrap();
        assert_eq!(engine.api().with(|s| s.calls), calls_before);
        assert_eq!(engine.live_view().len(), 3);
        assert_eq!(engine.unseen(them), 0);
        assert_eq!(engine.unacknowledged().len(), 3);

        engine.acknowledge_open().await;
        assert_eq!(engine.api().with(|s| s.acked.len()), 3);
    }

    #[tokio::test]
    async fn failed_open_leaves_state_alone() {
        let (mut engine, _me, them) = engine();
        let other = Uuid::new_v4();
        engine.open(other).await.unwrap();

        engine.api().with(|s| s.fail_fetch = true);
        let err = engine.open(them).await.unwrap_err();
        assert!(matches!(err, ClientError::FetchFailed(_)));
        assert_eq!(engine.open_counterpart(), Some(other));
        assert!(!engine.cache().contains(them));
        assert!(matches!(engine.take_notices().as_slice(), [Notice::FetchFailed { .. }]));
    }

    #[tokio::test]
    async fn send_requires_open_conversation() {
        let (mut engine, _me, _them) = engine();
        assert!(matches!(
            engine.send("hi", None).await,
            Err(ClientError::NoOpenConversation)
        ));
    }

    #[tokio::test]
    async fn draft_is_visible_before_the_request_resolves() {
        let (mut engine, me, them) = engine();
        engine.api().with(|s| {
            s.conversations.insert(them, vec![msg(them, me, "earlier", 5)]);
        });
        engine.open(them).await.unwrap();

        let pending = engine.begin_send("hello", None).unwrap();
        let top = &engine.live_view()[0];
        assert!(top.is_provisional());
        assert_eq!(top.temp_id(), Some(pending.temp_id));
        assert_eq!(top.text(), "hello");
        assert_eq!(engine.live_view().len(), 2);

        let result = engine
            .api()
            .send_message(pending.receiver_id, &pending.request)
            .await;
        let confirmed_id = result.as_ref().unwrap().id;
        engine.complete_send(pending, result).unwrap();

        let view = engine.live_view();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].message_id(), Some(confirmed_id));
        assert_eq!(
            view.iter().filter(|e| e.message_id() == Some(confirmed_id)).count(),
            1
        );
        assert!(view.iter().all(|e| !e.is_provisional()));
    }

    #[tokio::test]
    async fn confirmation_matches_by_temp_id_not_position() {
        let (mut engine, _me, them) = engine();
        engine.open(them).await.unwrap();

        let first = engine.begin_send("one", None).unwrap();
        let second = engine.begin_send("two", None).unwrap();
        assert_ne!(first.temp_id, second.temp_id);

        // Resolve out of order
        let r2 = engine.api().send_message(them, &second.request).await;
        engine.complete_send(second, r2).unwrap();
        let r1 = engine.api().send_message(them, &first.request).await;
        engine.complete_send(first, r1).unwrap();

        let texts: Vec<&str> = engine.live_view().iter().map(Entry::text).collect();
        assert_eq!(texts, vec!["two", "one"]);
        assert!(engine.live_view().iter().all(|e| !e.is_provisional()));
    }

    #[tokio::test]
    async fn failed_send_rolls_back_and_notifies() {
        let (mut engine, me, them) = engine();
        engine.api().with(|s| {
            s.conversations.insert(them, vec![msg(them, me, "earlier", 5)]);
            s.fail_send = true;
        });
        engine.open(them).await.unwrap();

        let err = engine.send("lost", None).await.unwrap_err();
        assert!(matches!(err, ClientError::SendFailed(_)));

        let view = engine.live_view();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].text(), "earlier");
        match engine.take_notices().as_slice() {
            [Notice::SendFailed { counterpart, text, .. }] => {
                assert_eq!(*counterpart, them);
                assert_eq!(text, "lost");
            }
            other => panic!("unexpected notices {:?}", other),
        }
    }

    #[tokio::test]
    async fn push_for_closed_conversation_bumps_counter() {
        let (mut engine, me, them) = engine();
        let elsewhere = Uuid::new_v4();
        engine.open(elsewhere).await.unwrap();

        engine
            .handle_event(GatewayEvent::NewMessage(msg(them, me, "ping", 0)))
            .await;
        assert_eq!(engine.unseen(them), 1);
        assert!(engine.live_view().is_empty());

        engine
            .handle_event(GatewayEvent::NewMessage(msg(them, me, "ping again", 0)))
            .await;
        assert_eq!(engine.unseen(them), 2);

        engine.open(them).await.unwrap();
        assert_eq!(engine.unseen(them), 0);
    }

    #[tokio::test]
    async fn push_for_open_conversation_prepends_and_acks() {
        let (mut engine, me, them) = engine();
        engine.open(them).await.unwrap();

        let incoming = msg(them, me, "hi", 0);
        engine
            .handle_event(GatewayEvent::NewMessage(incoming.clone()))
            .await;
        // Duplicate delivery is neither shown nor acknowledged twice
        engine
            .handle_event(GatewayEvent::NewMessage(incoming.clone()))
            .await;

        assert_eq!(engine.live_view().len(), 1);
        assert_eq!(engine.live_view()[0].message_id(), Some(incoming.id));
        assert_eq!(engine.unseen(them), 0);
        assert_eq!(engine.api().with(|s| s.acked.clone()), vec![incoming.id]);
    }

    #[tokio::test]
    async fn push_into_cached_but_closed_conversation_stays_warm() {
        let (mut engine, me, them) = engine();
        engine.open(them).await.unwrap();
        engine.close();

        let incoming = msg(them, me, "while away", 0);
        engine
            .handle_event(GatewayEvent::NewMessage(incoming.clone()))
            .await;
        assert_eq!(engine.unseen(them), 1);

        engine.open(them).await.unwrap();
        assert_eq!(engine.api().with(|s| s.fetch_calls), 1);
        assert_eq!(engine.live_view()[0].message_id(), Some(incoming.id));
        assert_eq!(engine.unseen(them), 0);
    }

    #[tokio::test]
    async fn delete_tombstones_locally_even_when_request_fails() {
        let (mut engine, me, them) = engine();
        let mine = msg(me, them, "regret", 1);
        engine.api().with(|s| {
            s.conversations.insert(them, vec![mine.clone()]);
            s.fail_delete = true;
        });
        engine.open(them).await.unwrap();

        engine.delete(mine.id).await;
        let entry = &engine.live_view()[0];
        assert!(entry.is_deleted());
        assert_eq!(entry.text(), TOMBSTONE_TEXT);
        assert_eq!(entry.image(), None);
    }

    #[tokio::test]
    async fn delete_pushes_are_applied_in_place() {
        let (mut engine, me, them) = engine();
        let newer = msg(them, me, "newer", 1);
        let target = msg(them, me, "remove me", 5);
        engine.api().with(|s| {
            s.conversations.insert(them, vec![newer.clone(), target.clone()]);
        });
        engine.open(them).await.unwrap();

        engine
            .handle_event(GatewayEvent::MessageDeleted(target.clone().tombstoned()))
            .await;
        let view = engine.live_view();
        assert_eq!(view[0].message_id(), Some(newer.id));
        assert_eq!(view[1].message_id(), Some(target.id));
        assert!(view[1].is_deleted());

        // Unknown ids are ignored
        engine
            .handle_event(GatewayEvent::MessageDeleted(msg(them, me, "?", 0).tombstoned()))
            .await;
        assert_eq!(engine.live_view().len(), 2);
    }

    #[tokio::test]
    async fn presence_is_replaced_wholesale() {
        let (mut engine, _me, them) = engine();
        let other = Uuid::new_v4();
        engine
            .handle_event(GatewayEvent::GetOnlineUsers(vec![them, other]))
            .await;
        assert!(engine.is_online(them));

        engine.handle_event(GatewayEvent::GetOnlineUsers(vec![other])).await;
        assert!(!engine.is_online(them));
        assert_eq!(engine.online_users().len(), 1);
    }

    #[tokio::test]
    async fn refresh_partners_loads_counts_but_not_for_open_conversation() {
        let (mut engine, _me, them) = engine();
        let open_one = Uuid::new_v4();
        engine.api().with(|s| {
            s.partners = vec![
                ConversationPartner { user_id: them, username: "them".into(), unseen: 3 },
                ConversationPartner { user_id: open_one, username: "open".into(), unseen: 2 },
            ];
        });
        engine.open(open_one).await.unwrap();

        engine.refresh_partners().await.unwrap();
        assert_eq!(engine.partners().len(), 2);
        assert_eq!(engine.unseen(them), 3);
        assert_eq!(engine.unseen(open_one), 0);

        engine.api().with(|s| s.fail_fetch = true);
        assert!(engine.refresh_partners().await.is_err());
        assert_eq!(engine.partners().len(), 2);
        assert_eq!(engine.unseen(them), 3);
    }
}
