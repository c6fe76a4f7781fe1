use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

/// the one on-wire unit the hub ever deals with.
///
/// the hub never inspects `payload`; it only ever reads `type`, `to` and
/// `room_id` to decide where a frame goes, and always overwrites `from`
/// with the sender's server-assigned id before routing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// the `type` discriminant. see the wire protocol table for direction and
/// who sets each variant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Connected,
    HandshakeInit,
    PeerJoined,
    PeerLeft,
    RoomExpired,
    Offer,
    Answer,
    IceCandidate,
    HandshakeVerify,
    Error,
}

impl MessageType {
    /// the relay types: opaque-payload, peer-to-peer via the hub.
    pub fn is_relay(self) -> bool {
        matches!(
            self,
            Self::Offer | Self::Answer | Self::IceCandidate | Self::HandshakeVerify
        )
    }
}

impl Message {
    /// hub-originated `connected` notification, the mandatory first frame
    /// of every connection.
    ///
    /// # Examples
    ///
    /// ```
    /// use signal_hub::message::Message;
    ///
    /// let m = Message::connected("a");
    /// assert_eq!(m.client_id.as_deref(), Some("a"));
    /// ```
    pub fn connected(client_id: &str) -> Self {
        Self {
            kind: MessageType::Connected,
            from: None,
            to: None,
            room_id: None,
            payload: None,
            client_id: Some(client_id.to_string()),
        }
    }

    /// hub-originated `peer-joined` / `peer-left` notification. both
    /// `client_id` (authoritative) and `from` (convenience duplicate) name
    /// the third party, per the open-question resolution in DESIGN.md.
    pub fn peer_event(kind: MessageType, room_id: &str, client_id: &str) -> Self {
        Self {
            kind,
            from: Some(client_id.to_string()),
            to: None,
            room_id: Some(room_id.to_string()),
            payload: None,
            client_id: Some(client_id.to_string()),
        }
    }

    /// hub-originated `room-expired` notification.
    pub fn room_expired(room_id: &str) -> Self {
        Self {
            kind: MessageType::RoomExpired,
            from: None,
            to: None,
            room_id: Some(room_id.to_string()),
            payload: None,
            client_id: None,
        }
    }

    /// hub-originated `error` report, delivered only onto the offending
    /// peer's own outbox.
    pub fn error(reason: &str) -> Self {
        Self {
            kind: MessageType::Error,
            from: None,
            to: None,
            room_id: None,
            payload: Some(serde_json::Value::String(reason.to_string())),
            client_id: None,
        }
    }

    /// overwrite `from` with the hub-assigned sender id. the only sender
    /// identifier a recipient can trust is the one written here — any
    /// value the peer supplied is discarded.
    pub fn stamp_sender(&mut self, sender_id: &str) {
        self.from = Some(sender_id.to_string());
    }

    pub fn to_json(&self) -> String {
        // constructed from our own fields; serialization cannot fail.
        serde_json::to_string(self).expect("message serialization is infallible")
    }
}

impl TryFrom<&str> for Message {
    type Error = serde_json::Error;

    /// # Examples
    ///
    /// ```
    /// use signal_hub::message::{Message, MessageType};
    /// use std::convert::TryFrom;
    ///
    /// let m = Message::try_from(r#"{"type":"handshake-init","room_id":"42-69"}"#).unwrap();
    /// assert_eq!(m.kind, MessageType::HandshakeInit);
    /// assert_eq!(m.room_id.as_deref(), Some("42-69"));
    /// ```
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        serde_json::from_str(value)
    }
}
