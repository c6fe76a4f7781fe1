use std::sync::Mutex;

use uuid::Uuid;

use crate::channel::Tx;

/// opaque server-assigned identifier. unique across live clients for the
/// lifetime of the process; never derived from or trusted to the remote.
pub type ClientId = String;

pub fn new_client_id() -> ClientId {
    Uuid::new_v4().simple().to_string()
}

/// the hub-facing handle for one live client: everything the hub needs to
/// route to and account for a connection, without owning the socket
/// itself (that belongs to the read/write pump in `socket.rs`).
///
/// `id` is immutable for the lifetime of the client and is set here, at
/// construction, never by the remote peer.
pub struct ClientHandle {
    pub id: ClientId,
    pub outbox: Tx,
    room_id: Mutex<Option<String>>,
}

impl ClientHandle {
    pub fn new(id: ClientId, outbox: Tx) -> Self {
        Self {
            id,
            outbox,
            room_id: Mutex::new(None),
        }
    }

    pub fn room_id(&self) -> Option<String> {
        self.room_id.lock().expect("room_id mutex poisoned").clone()
    }

    pub fn set_room_id(&self, room_id: Option<String>) {
        *self.room_id.lock().expect("room_id mutex poisoned") = room_id;
    }
}
