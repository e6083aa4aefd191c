use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod route;

/// Unique identifier for a live WebSocket connection
///
/// Each connection gets a fresh ID when it registers, which allows precise
/// cleanup when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct ConnectionEntry {
    user_id: Uuid,
    device_id: String,
    sender: UnboundedSender<String>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    // user_id -> set of that user's live connections
    users: HashMap<Uuid, HashSet<ConnectionId>>,
    // room name -> member connections
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

/// What `unregister` observed when a connection closed.
#[derive(Debug)]
pub struct Departure {
    pub user_id: Uuid,
    pub device_id: String,
    /// True when this was the user's last connection: the offline
    /// transition happens exactly once.
    pub went_offline: bool,
}

/// In-process presence registry
///
/// Tracks which users hold live connections, the rooms each connection has
/// joined, and fans messages out per-user, per-room, or globally. State
/// lives only in process memory and does not survive a restart; scale-out
/// across processes would need a shared broker instead.
#[derive(Default, Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection.
    ///
    /// Returns the connection ID, the receiver half the socket writer
    /// drains, and whether this connection brought the user online.
    pub async fn register(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> (ConnectionId, UnboundedReceiver<String>, bool) {
        let (tx, rx) = unbounded_channel();
        let conn_id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        guard.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id,
                device_id: device_id.to_string(),
                sender: tx,
                rooms: HashSet::new(),
            },
        );

        let conns = guard.users.entry(user_id).or_default();
        let came_online = conns.is_empty();
        conns.insert(conn_id);

        tracing::debug!(
            user_id = %user_id,
            connections = conns.len(),
            "Connection registered"
        );

        (conn_id, rx, came_online)
    }

    /// Remove a closed connection and report whether the user went offline.
    pub async fn unregister(&self, conn_id: ConnectionId) -> Option<Departure> {
        let mut guard = self.inner.write().await;

        let entry = guard.connections.remove(&conn_id)?;

        for room in &entry.rooms {
            if let Some(members) = guard.rooms.get_mut(room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    guard.rooms.remove(room);
                }
            }
        }

        let mut went_offline = false;
        if let Some(conns) = guard.users.get_mut(&entry.user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                guard.users.remove(&entry.user_id);
                went_offline = true;
            }
        }

        tracing::debug!(
            user_id = %entry.user_id,
            went_offline = went_offline,
            "Connection deregistered"
        );

        Some(Departure {
            user_id: entry.user_id,
            device_id: entry.device_id,
            went_offline,
        })
    }

    pub async fn join_room(&self, conn_id: ConnectionId, room: &str) {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.connections.get_mut(&conn_id) {
            entry.rooms.insert(room.to_string());
            guard.rooms.entry(room.to_string()).or_default().insert(conn_id);
        }
    }

    pub async fn leave_room(&self, conn_id: ConnectionId, room: &str) {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.connections.get_mut(&conn_id) {
            entry.rooms.remove(room);
        }
        if let Some(members) = guard.rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                guard.rooms.remove(room);
            }
        }
    }

    /// Deliver to a single connection (e.g. an error reply).
    pub async fn send_to_connection(&self, conn_id: ConnectionId, payload: &str) {
        let mut guard = self.inner.write().await;
        Self::deliver(&mut guard, &[conn_id], payload, None);
    }

    /// Deliver to every connection of one user (all their devices).
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) {
        let mut guard = self.inner.write().await;
        let Some(conns) = guard.users.get(&user_id) else {
            return;
        };
        let targets: Vec<ConnectionId> = conns.iter().copied().collect();
        Self::deliver(&mut guard, &targets, payload, None);
    }

    /// Deliver to every member of a room, optionally excluding the sender.
    pub async fn broadcast_room(&self, room: &str, payload: &str, except: Option<ConnectionId>) {
        let mut guard = self.inner.write().await;
        let Some(members) = guard.rooms.get(room) else {
            return;
        };
        let targets: Vec<ConnectionId> = members.iter().copied().collect();
        Self::deliver(&mut guard, &targets, payload, except);
    }

    /// Deliver to every live connection (online/offline status events).
    pub async fn broadcast_all(&self, payload: &str) {
        let mut guard = self.inner.write().await;
        let targets: Vec<ConnectionId> = guard.connections.keys().copied().collect();
        Self::deliver(&mut guard, &targets, payload, None);
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).map(|c| !c.is_empty()).unwrap_or(false)
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Drop all connection state (shutdown).
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.connections.clear();
        guard.users.clear();
        guard.rooms.clear();
    }

    /// Send to the given targets, pruning any connection whose channel is
    /// closed so a dead socket cannot linger in the maps.
    fn deliver(guard: &mut Inner, targets: &[ConnectionId], payload: &str, except: Option<ConnectionId>) {
        let mut dead: Vec<ConnectionId> = Vec::new();

        for conn_id in targets {
            if Some(*conn_id) == except {
                continue;
            }
            if let Some(entry) = guard.connections.get(conn_id) {
                if entry.sender.send(payload.to_string()).is_err() {
                    dead.push(*conn_id);
                }
            }
        }

        for conn_id in dead {
            if let Some(entry) = guard.connections.remove(&conn_id) {
                for room in &entry.rooms {
                    if let Some(members) = guard.rooms.get_mut(room) {
                        members.remove(&conn_id);
                        if members.is_empty() {
                            guard.rooms.remove(room);
                        }
                    }
                }
                if let Some(conns) = guard.users.get_mut(&entry.user_id) {
                    conns.remove(&conn_id);
                    if conns.is_empty() {
                        guard.users.remove(&entry.user_id);
                    }
                }
                tracing::debug!(user_id = %entry.user_id, "Pruned dead connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_online_until_last_connection_closes() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();

        // GIVEN: three connections for the same user
        let (c1, _rx1, first) = registry.register(user, "d1").await;
        let (c2, _rx2, second) = registry.register(user, "d1").await;
        let (c3, _rx3, third) = registry.register(user, "d2").await;

        assert!(first, "first connection brings the user online");
        assert!(!second);
        assert!(!third);
        assert_eq!(registry.connection_count(user).await, 3);

        // WHEN: all but one close
        let d1 = registry.unregister(c1).await.expect("departure");
        let d2 = registry.unregister(c2).await.expect("departure");

        // THEN: the user is still online, no offline transition yet
        assert!(!d1.went_offline);
        assert!(!d2.went_offline);
        assert!(registry.is_online(user).await);

        // AND: the final close transitions to offline exactly once
        let d3 = registry.unregister(c3).await.expect("departure");
        assert!(d3.went_offline);
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn test_unregister_twice_is_noop() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();

        let (conn, _rx, _) = registry.register(user, "d1").await;
        assert!(registry.unregister(conn).await.is_some());
        // A second close for the same connection reports nothing.
        assert!(registry.unregister(conn).await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_all_devices() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (_c1, mut rx1, _) = registry.register(user, "d1").await;
        let (_c2, mut rx2, _) = registry.register(user, "d2").await;
        let (_c3, mut rx3, _) = registry.register(other, "d9").await;

        registry.send_to_user(user, "hello").await;

        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert_eq!(rx2.recv().await.unwrap(), "hello");
        assert!(rx3.try_recv().is_err(), "other user receives nothing");
    }

    #[tokio::test]
    async fn test_room_broadcast_excludes_sender() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (ca, mut rx_a, _) = registry.register(alice, "d1").await;
        let (cb, mut rx_b, _) = registry.register(bob, "d1").await;

        registry.join_room(ca, "chat:42").await;
        registry.join_room(cb, "chat:42").await;

        registry.broadcast_room("chat:42", "typing", Some(ca)).await;

        assert_eq!(rx_b.recv().await.unwrap(), "typing");
        assert!(rx_a.try_recv().is_err(), "sender excluded");
    }

    #[tokio::test]
    async fn test_leaving_room_stops_delivery() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();

        let (conn, mut rx, _) = registry.register(user, "d1").await;
        registry.join_room(conn, "chat:7").await;
        registry.leave_room(conn, "chat:7").await;

        registry.broadcast_room("chat:7", "msg", None).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_connections_pruned_on_broadcast() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();

        let (_conn, rx, _) = registry.register(user, "d1").await;
        drop(rx); // simulate the socket task dying without unregister

        registry.broadcast_all("ping").await;

        assert!(!registry.is_online(user).await);
        assert_eq!(registry.connection_count(user).await, 0);
    }
}
