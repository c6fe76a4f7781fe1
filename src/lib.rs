//! ## The rendezvous hub
//!
//! Two browsers that want to exchange a file directly can't find each
//! other on their own. Before any bytes move peer-to-peer, something has
//! to let them discover one another and swap the handshake material their
//! transport needs to connect — session offers, answers, and the
//! candidate addresses that make a direct path possible. That's what this
//! hub is: a rendezvous point, not a party to the transfer itself.
//!
//! Two clients agree out of band on a room id, each opens a WebSocket and
//! announces the room, and from then on the hub's only job is routing:
//! frames addressed `to` a specific client id go to that client, frames
//! carrying only a `room_id` get broadcast to the room. The hub never
//! looks inside the relayed payload — its content is opaque to everything
//! here except the two browsers on either end.
//!
//! ## The wire protocol
//!
//! * `to`: target client id, takes precedence over `room_id` when both
//!   are present.
//! * `from`: always overwritten by the hub with the sender's hub-assigned
//!   id, regardless of what the frame claims.
//! * `room_id`: broadcast scope; all other fields are relayed unchanged.

pub mod channel;
pub mod client;
pub mod config;
pub mod hub;
pub mod message;
pub mod rate_limiter;
pub mod room;
pub mod server;
pub mod socket;
