use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// What a connection's send task is asked to do.
#[derive(Debug)]
pub enum Outbound {
    Event(GatewayEvent),
    /// Another connection for the same user took over, or the server is
    /// shutting down.
    Close,
}

/// One live connection's outbound queue, tagged with a connection id.
///
/// Two handles are equal only if they refer to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event. Returns false if the connection is already gone.
    pub fn push(&self, event: GatewayEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.conn_id == other.conn_id
    }
}

impl Eq for ConnectionHandle {}

/// Tracks which users hold a live connection and broadcasts the online set.
///
/// Every operation takes the write (or read) lock once and finishes under it,
/// so concurrent connections never observe a half-applied change.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the connection for `user_id`, replacing any earlier one.
    /// Returns the replaced handle so the caller can close it.
    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut users = self.inner.write().await;
        let previous = users.insert(user_id, handle);
        broadcast_online(&users);
        previous
    }

    /// Remove `user_id`, but only if `handle` is still its current connection.
    /// A late disconnect from a replaced connection is a no-op.
    pub async fn deregister(&self, user_id: Uuid, handle: &ConnectionHandle) -> bool {
        let mut users = self.inner.write().await;
        let is_current = users.get(&user_id).is_some_and(|current| current == handle);
        if !is_current {
            debug!("Stale disconnect for {} ignored (conn {})", user_id, handle.conn_id);
            return false;
        }

        users.remove(&user_id);
        broadcast_online(&users);
        true
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner.read().await.get(&user_id).cloned()
    }

    /// `lookup` and `push` under a single read lock. Returns false if the
    /// user is offline or their queue is gone.
    pub async fn send_to(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        match self.inner.read().await.get(&user_id) {
            Some(handle) => handle.push(event),
            None => false,
        }
    }

    /// Sorted snapshot of online user ids.
    pub async fn online_users(&self) -> Vec<Uuid> {
        online_set(&*self.inner.read().await)
    }

    /// Close every connection and forget them. Used at process teardown.
    pub async fn shutdown(&self) {
        let mut users = self.inner.write().await;
        info!("Closing {} gateway connections", users.len());
        for handle in users.values() {
            handle.close();
        }
        users.clear();
    }
}

fn online_set(users: &HashMap<Uuid, ConnectionHandle>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = users.keys().copied().collect();
    ids.sort();
    ids
}

/// Send the full online set to every connection. A dead queue is skipped,
/// it never stops delivery to the rest.
fn broadcast_online(users: &HashMap<Uuid, ConnectionHandle>) {
    let online = online_set(users);
    let mut dead = 0;
    for handle in users.values() {
        if !handle.push(GatewayEvent::GetOnlineUsers(online.clone())) {
            dead += 1;
        }
    }
    debug!("Presence broadcast: {} online, {} unreachable", online.len(), dead);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_presence(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Vec<Uuid>> {
        let mut sets = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Outbound::Event(GatewayEvent::GetOnlineUsers(ids)) = msg {
                sets.push(ids);
            }
        }
        sets
    }

    #[tokio::test]
    async fn register_broadcasts_full_set() {
        let registry = PresenceRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (ha, mut rxa) = ConnectionHandle::new();
        let (hb, mut rxb) = ConnectionHandle::new();

        assert!(registry.register(a, ha).await.is_none());
        assert!(registry.register(b, hb).await.is_none());

        let mut both = vec![a, b];
        both.sort();
        assert_eq!(drain_presence(&mut rxa), vec![vec![a], both.clone()]);
        assert_eq!(drain_presence(&mut rxb), vec![both]);
    }

    #[tokio::test]
    async fn stale_deregister_keeps_newer_connection() {
        let registry = PresenceRegistry::new();
        let id = Uuid::new_v4();
        let (h1, _rx1) = ConnectionHandle::new();
        let (h2, _rx2) = ConnectionHandle::new();

        registry.register(id, h1.clone()).await;
        let replaced = registry.register(id, h2.clone()).await;
        assert_eq!(replaced, Some(h1.clone()));

        assert!(!registry.deregister(id, &h1).await);
        assert_eq!(registry.online_users().await, vec![id]);
        assert_eq!(registry.lookup(id).await, Some(h2.clone()));

        assert!(registry.deregister(id, &h2).await);
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn deregister_without_entry_does_not_broadcast() {
        let registry = PresenceRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (ha, mut rxa) = ConnectionHandle::new();
        let (stray, _rx) = ConnectionHandle::new();
        registry.register(a, ha).await;
        drain_presence(&mut rxa);

        assert!(!registry.deregister(b, &stray).await);
        assert!(drain_presence(&mut rxa).is_empty());
    }

    #[tokio::test]
    async fn visible_set_tracks_latest_registrations() {
        let registry = PresenceRegistry::new();
        let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut handles = Vec::new();
        let mut receivers = Vec::new();
        for &u in &users {
            let (h, rx) = ConnectionHandle::new();
            registry.register(u, h.clone()).await;
            handles.push(h);
            receivers.push(rx);
        }

        // Reconnect user 0, then its old connection drops late
        let (fresh, _rx) = ConnectionHandle::new();
        registry.register(users[0], fresh).await;
        registry.deregister(users[0], &handles[0]).await;
        // User 1 leaves with its own handle
        registry.deregister(users[1], &handles[1]).await;

        let mut expected = vec![users[0], users[2], users[3]];
        expected.sort();
        assert_eq!(registry.online_users().await, expected);
    }

    #[tokio::test]
    async fn dead_connection_does_not_block_broadcast() {
        let registry = PresenceRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (ha, rxa) = ConnectionHandle::new();
        let (hb, mut rxb) = ConnectionHandle::new();
        registry.register(a, ha).await;
        registry.register(b, hb).await;
        drop(rxa);
        drain_presence(&mut rxb);

        let (hc, _rxc) = ConnectionHandle::new();
        registry.register(c, hc).await;

        let sets = drain_presence(&mut rxb);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 3);
    }

    #[tokio::test]
    async fn send_to_reaches_only_online_users() {
        let registry = PresenceRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (ha, mut rxa) = ConnectionHandle::new();
        registry.register(a, ha).await;
        drain_presence(&mut rxa);

        assert!(registry.send_to(a, GatewayEvent::Ready { user_id: a }).await);
        assert!(!registry.send_to(b, GatewayEvent::Ready { user_id: b }).await);
        assert!(matches!(rxa.try_recv(), Ok(Outbound::Event(GatewayEvent::Ready { .. }))));
    }

    #[tokio::test]
    async fn shutdown_closes_everyone() {
        let registry = PresenceRegistry::new();
        let (ha, mut rxa) = ConnectionHandle::new();
        registry.register(Uuid::new_v4(), ha).await;
        drain_presence(&mut rxa);

        registry.shutdown().await;
        assert!(matches!(rxa.try_recv(), Ok(Outbound::Close)));
        assert!(registry.online_users().await.is_empty());
    }
}
