use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{Duration, Instant};

use crate::client::{ClientHandle, ClientId};

/// a room is anchored to creation time, not last-activity — simpler to
/// reason about, and it keeps the "the code is the secret, and the secret
/// expires" posture without touching room state on every relayed message.
pub const ROOM_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// a named rendezvous set of 0–N clients.
pub struct Room {
    pub id: String,
    pub members: HashMap<ClientId, Arc<ClientHandle>>,
    pub created_at: Instant,
}

impl Room {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            members: HashMap::new(),
            created_at: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > ROOM_LIFETIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_room_is_not_expired() {
        assert!(!Room::new("42-69").is_expired());
    }

    #[test]
    fn room_with_no_members_is_empty() {
        assert!(Room::new("42-69").is_empty());
    }

    #[test]
    fn room_past_its_lifetime_is_expired() {
        let mut room = Room::new("42-69");
        room.created_at = Instant::now() - ROOM_LIFETIME - Duration::from_secs(1);
        assert!(room.is_expired());
    }
}
