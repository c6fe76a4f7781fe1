use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::client::{ClientHandle, ClientId};
use crate::message::{Message, MessageType};
use crate::room::Room;

/// authoritative registry of clients and rooms; serializes membership
/// changes and routes messages between clients.
///
/// `clients` is guarded by its own reader-writer lock; `rooms` maps a room
/// id to a reader-writer lock around that one room's membership. Routing
/// drops the outer `rooms` map lock before acquiring a room's own lock, so
/// lookups into two different rooms proceed concurrently instead of
/// serializing on one global lock. Membership changes (`join_room`,
/// `leave_room`) instead nest a room's lock *inside* the outer map lock for
/// the span of the change, so the set of registered rooms and a room's own
/// membership can never be observed out of sync with each other — the
/// outer lock is always acquired first, never the other way around.
pub struct Hub {
    clients: RwLock<HashMap<ClientId, Arc<ClientHandle>>>,
    rooms: RwLock<HashMap<String, Arc<RwLock<Room>>>>,
    total_connections: AtomicU64,
}

/// a point-in-time view of hub state, for the health endpoint.
pub struct HubSnapshot {
    pub room_count: usize,
    pub client_count: usize,
    pub total_connections: u64,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            total_connections: AtomicU64::new(0),
        })
    }

    /// admit a new client: insert into the registry and deliver its
    /// `connected` notification. exactly one per connection, first frame.
    pub async fn register(&self, client: Arc<ClientHandle>) {
        self.clients
            .write()
            .await
            .insert(client.id.clone(), client.clone());

        self.total_connections.fetch_add(1, Ordering::Relaxed);
        client.outbox.try_send(Message::connected(&client.id));
        log::info!("client {} connected", client.id);
    }

    /// remove a client. idempotent: once removed, a second call is a
    /// no-op and will not double-close the outbox or double-notify peers.
    pub async fn unregister(&self, client_id: &str) {
        let client = self.clients.write().await.remove(client_id);
        let Some(client) = client else {
            return;
        };

        client.outbox.close();

        if let Some(room_id) = client.room_id() {
            self.leave_room(&room_id, client_id).await;
        }

        log::info!("client {} disconnected", client_id);
    }

    /// join `client` into `room_id`, first leaving any room it currently
    /// occupies. every current member of the room is notified of the new
    /// arrival; the joiner itself is never sent a `peer-joined` about
    /// itself.
    ///
    /// the outer `rooms` map lock is held across both the get-or-create
    /// lookup and the member insert, so a concurrent `leave_room` can never
    /// observe this room as empty and reap it out from under a joiner —
    /// the two operations always see a consistent `rooms` entry for the
    /// same room id, never two disjoint `Room` instances.
    pub async fn join_room(&self, client: &Arc<ClientHandle>, room_id: &str) {
        if let Some(current) = client.room_id() {
            if current == room_id {
                return; // already a member: idempotent no-op.
            }
            self.leave_room(&current, &client.id).await;
        }

        {
            let mut rooms = self.rooms.write().await;
            let room = rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Room::new(room_id))))
                .clone();

            let mut guard = room.write().await;
            for member in guard.members.values() {
                member
                    .outbox
                    .try_send(Message::peer_event(MessageType::PeerJoined, room_id, &client.id));
            }
            guard.members.insert(client.id.clone(), client.clone());
        }

        client.set_room_id(Some(room_id.to_string()));
    }

    async fn leave_room(&self, room_id: &str, client_id: &str) {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return;
        };

        let became_empty = {
            let mut guard = room.write().await;
            if guard.members.remove(client_id).is_none() {
                return; // already removed: idempotent no-op.
            }

            for member in guard.members.values() {
                member
                    .outbox
                    .try_send(Message::peer_event(MessageType::PeerLeft, room_id, client_id));
            }

            guard.is_empty()
        };

        if became_empty {
            let mut rooms = self.rooms.write().await;
            // re-check under the write lock: a join may have raced us
            // between dropping the room lock above and taking this one.
            if rooms
                .get(room_id)
                .map(|current| Arc::ptr_eq(current, &room))
                .unwrap_or(false)
                && room.read().await.is_empty()
            {
                rooms.remove(room_id);
            }
        }
    }

    /// route a relay message. direct addressing (`to`) wins over
    /// broadcast (`room_id`) when both are set. the sender never receives
    /// its own broadcast. a full or missing recipient outbox drops the
    /// message for that recipient only — routing never blocks on a slow
    /// peer.
    pub async fn route(&self, mut message: Message, from: &str) {
        message.stamp_sender(from);

        if let Some(to) = message.to.clone() {
            if let Some(target) = self.clients.read().await.get(&to) {
                if !target.outbox.try_send(message) {
                    log::warn!("dropping message for {}: outbox full", to);
                }
            }
            return;
        }

        let Some(room_id) = message.room_id.clone() else {
            return;
        };

        let Some(room) = self.rooms.read().await.get(&room_id).cloned() else {
            return;
        };

        let guard = room.read().await;
        for (member_id, member) in guard.members.iter() {
            if member_id == from {
                continue;
            }
            if !member.outbox.try_send(message.clone()) {
                log::warn!("dropping message for {}: outbox full", member_id);
            }
        }
    }

    pub async fn client(&self, id: &str) -> Option<Arc<ClientHandle>> {
        self.clients.read().await.get(id).cloned()
    }

    /// broadcast `room-expired` to every member of every room past its
    /// 10-minute lifetime, clear their `room_id`, and delete the room.
    /// membership is not forcibly disconnected.
    pub async fn sweep_expired_rooms(&self) {
        let expired: Vec<(String, Arc<RwLock<Room>>)> = {
            let rooms = self.rooms.read().await;
            let mut out = Vec::new();
            for (id, room) in rooms.iter() {
                if room.read().await.is_expired() {
                    out.push((id.clone(), room.clone()));
                }
            }
            out
        };

        for (room_id, room) in expired {
            let members: Vec<Arc<ClientHandle>> = room.read().await.members.values().cloned().collect();
            for member in &members {
                member.outbox.try_send(Message::room_expired(&room_id));
                member.set_room_id(None);
            }

            self.rooms.write().await.remove(&room_id);
            log::info!("room {} expired", room_id);
        }
    }

    /// spawn the 60-second room-expiry sweep loop.
    pub fn spawn_room_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                self.sweep_expired_rooms().await;
            }
        })
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            room_count: self.rooms.read().await.len(),
            client_count: self.clients.read().await.len(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
        }
    }

    /// close every client's outbox, which terminates each write task,
    /// which closes its socket and unwinds its read task.
    pub async fn shutdown(&self) {
        for client in self.clients.read().await.values() {
            client.outbox.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use crate::client::new_client_id;

    fn new_client() -> Arc<ClientHandle> {
        let (tx, _rx) = channel();
        Arc::new(ClientHandle::new(new_client_id(), tx))
    }

    #[tokio::test]
    async fn register_delivers_connected_first() {
        let hub = Hub::new();
        let (tx, mut rx) = channel();
        let client = Arc::new(ClientHandle::new(new_client_id(), tx));
        hub.register(client.clone()).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, MessageType::Connected);
        assert_eq!(first.client_id.as_deref(), Some(client.id.as_str()));
    }

    #[tokio::test]
    async fn join_notifies_existing_members_not_the_joiner() {
        let hub = Hub::new();
        let (tx1, mut rx1) = channel();
        let c1 = Arc::new(ClientHandle::new(new_client_id(), tx1));
        let (tx2, mut rx2) = channel();
        let c2 = Arc::new(ClientHandle::new(new_client_id(), tx2));

        hub.register(c1.clone()).await;
        hub.register(c2.clone()).await;
        rx1.recv().await; // drain `connected`
        rx2.recv().await;

        hub.join_room(&c1, "42-69").await;
        hub.join_room(&c2, "42-69").await;

        let notice = rx1.recv().await.unwrap();
        assert_eq!(notice.kind, MessageType::PeerJoined);
        assert_eq!(notice.client_id.as_deref(), Some(c2.id.as_str()));

        // c2 must not see a peer-joined about itself.
        let next_for_c2 = tokio::time::timeout(std::time::Duration::from_millis(20), rx2.recv()).await;
        assert!(next_for_c2.is_err());
    }

    #[tokio::test]
    async fn no_self_echo_on_room_broadcast() {
        let hub = Hub::new();
        let (tx1, mut rx1) = channel();
        let c1 = Arc::new(ClientHandle::new(new_client_id(), tx1));
        let (tx2, mut rx2) = channel();
        let c2 = Arc::new(ClientHandle::new(new_client_id(), tx2));

        hub.register(c1.clone()).await;
        hub.register(c2.clone()).await;
        hub.join_room(&c1, "42-69").await;
        hub.join_room(&c2, "42-69").await;
        rx1.recv().await; // connected
        rx2.recv().await; // connected
        rx1.recv().await; // peer-joined (c2)

        let offer = Message {
            kind: MessageType::Offer,
            from: None,
            to: None,
            room_id: Some("42-69".to_string()),
            payload: Some(serde_json::Value::String("SDP_OFFER".to_string())),
            client_id: None,
        };

        hub.route(offer, &c1.id).await;

        let delivered = rx2.recv().await.unwrap();
        assert_eq!(delivered.kind, MessageType::Offer);
        assert_eq!(delivered.from.as_deref(), Some(c1.id.as_str()));

        let nothing = tokio::time::timeout(std::time::Duration::from_millis(20), rx1.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn join_room_is_idempotent() {
        let hub = Hub::new();
        let c1 = new_client();
        hub.register(c1.clone()).await;

        hub.join_room(&c1, "42-69").await;
        hub.join_room(&c1, "42-69").await;

        let room = hub.rooms.read().await.get("42-69").unwrap().clone();
        assert_eq!(room.read().await.members.len(), 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = Hub::new();
        let c1 = new_client();
        hub.register(c1.clone()).await;
        hub.unregister(&c1.id).await;
        hub.unregister(&c1.id).await; // must not panic or double-close.
        assert!(c1.outbox.is_closed());
    }

    #[tokio::test]
    async fn empty_room_is_removed_after_last_member_leaves() {
        let hub = Hub::new();
        let c1 = new_client();
        hub.register(c1.clone()).await;
        hub.join_room(&c1, "42-69").await;
        hub.unregister(&c1.id).await;

        assert!(hub.rooms.read().await.get("42-69").is_none());
    }

    #[tokio::test]
    async fn direct_addressing_wins_over_room_broadcast() {
        let hub = Hub::new();
        let c1 = new_client();
        let (tx2, mut rx2) = channel();
        let c2 = Arc::new(ClientHandle::new(new_client_id(), tx2));
        let (tx3, mut rx3) = channel();
        let c3 = Arc::new(ClientHandle::new(new_client_id(), tx3));

        hub.register(c1.clone()).await;
        hub.register(c2.clone()).await;
        hub.register(c3.clone()).await;
        hub.join_room(&c1, "42-69").await;
        hub.join_room(&c2, "42-69").await;
        hub.join_room(&c3, "42-69").await;
        rx2.recv().await; // connected
        rx2.recv().await; // peer-joined c3 (c3 joins last, notifying c1 and c2)
        rx3.recv().await; // connected — c3 joins last, so nobody notifies it of anything

        let answer = Message {
            kind: MessageType::Answer,
            from: None,
            to: Some(c2.id.clone()),
            room_id: Some("42-69".to_string()),
            payload: Some(serde_json::Value::String("SDP_ANSWER".to_string())),
            client_id: None,
        };

        hub.route(answer, &c3.id).await;

        let delivered = rx2.recv().await.unwrap();
        assert_eq!(delivered.kind, MessageType::Answer);
        assert_eq!(delivered.from.as_deref(), Some(c3.id.as_str()));

        let nothing = tokio::time::timeout(std::time::Duration::from_millis(20), rx3.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn expired_room_notifies_members_clears_room_id_and_is_removed() {
        use crate::room::ROOM_LIFETIME;

        let hub = Hub::new();
        let (tx, mut rx) = channel();
        let c1 = Arc::new(ClientHandle::new(new_client_id(), tx));
        hub.register(c1.clone()).await;
        hub.join_room(&c1, "42-69").await;
        rx.recv().await; // connected

        {
            let room = hub.rooms.read().await.get("42-69").unwrap().clone();
            room.write().await.created_at =
                tokio::time::Instant::now() - ROOM_LIFETIME - Duration::from_secs(1);
        }

        hub.sweep_expired_rooms().await;

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.kind, MessageType::RoomExpired);
        assert_eq!(notice.room_id.as_deref(), Some("42-69"));
        assert_eq!(c1.room_id(), None);
        assert!(hub.rooms.read().await.get("42-69").is_none());
    }
}
