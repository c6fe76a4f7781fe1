use std::convert::TryFrom;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval, timeout, timeout_at, Duration, Instant};

use crate::channel::Rx;
use crate::client::ClientHandle;
use crate::hub::Hub;
use crate::message::{Message, MessageType};

/// read deadline, refreshed only on a received heartbeat-ack.
const READ_DEADLINE: Duration = Duration::from_secs(60);

/// heartbeat probe interval — 90% of the read deadline.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(54);

/// per-frame write deadline.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// drives one client's read and write pump concurrently until either side
/// hits a fatal condition. both sides converge on the same outcome: the
/// hub is told to unregister this client (idempotent, so it's safe for
/// both sides to call it).
pub async fn serve(socket: WebSocket, hub: Arc<Hub>, client: Arc<ClientHandle>, rx: Rx) {
    let (sink, stream) = socket.split();

    tokio::join!(
        read_loop(stream, hub.clone(), client.clone()),
        write_loop(sink, rx, hub, client),
    );
}

async fn read_loop(mut stream: SplitStream<WebSocket>, hub: Arc<Hub>, client: Arc<ClientHandle>) {
    let mut deadline = Instant::now() + READ_DEADLINE;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                log::warn!("client {}: read deadline elapsed", client.id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                log::debug!("client {}: socket read error: {}", client.id, e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Pong(_) => {
                deadline = Instant::now() + READ_DEADLINE;
            }
            WsMessage::Text(text) => {
                handle_text(text.to_string().as_str(), &hub, &client).await;
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Binary(_) => {}
        }
    }

    hub.unregister(&client.id).await;
}

/// decode, overwrite `from`, and dispatch one inbound frame. malformed
/// frames produce an `error` message back to the sender; the connection
/// is not torn down on parse failure.
async fn handle_text(text: &str, hub: &Arc<Hub>, client: &Arc<ClientHandle>) {
    let mut frame = match Message::try_from(text) {
        Ok(frame) => frame,
        Err(e) => {
            client
                .outbox
                .try_send(Message::error(&format!("malformed frame: {e}")));
            return;
        }
    };

    // the only sender identifier a recipient can trust is the one the hub
    // writes — never the peer's own claim.
    frame.stamp_sender(&client.id);

    match frame.kind {
        MessageType::HandshakeInit => match frame.room_id.clone() {
            Some(room_id) => hub.join_room(client, &room_id).await,
            None => {
                client
                    .outbox
                    .try_send(Message::error("handshake-init requires room_id"));
            }
        },
        kind if kind.is_relay() => {
            if frame.to.is_none() && frame.room_id.is_none() {
                frame.room_id = client.room_id();
            }
            hub.route(frame, &client.id).await;
        }
        _ => {
            client
                .outbox
                .try_send(Message::error("unsupported message type"));
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: Rx,
    hub: Arc<Hub>,
    client: Arc<ClientHandle>,
) {
    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // the first tick fires immediately; skip it.

    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(message) => {
                        if send(&mut sink, WsMessage::Text(message.to_json().into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = send(&mut sink, WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if send(&mut sink, WsMessage::Ping(Bytes::new())).await.is_err() {
                    log::warn!("client {}: write deadline elapsed on heartbeat", client.id);
                    break;
                }
            }
        }
    }

    hub.unregister(&client.id).await;
}

async fn send(sink: &mut SplitSink<WebSocket, WsMessage>, message: WsMessage) -> Result<(), ()> {
    match timeout(WRITE_DEADLINE, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use crate::client::new_client_id;
    use crate::hub::Hub;

    #[tokio::test]
    async fn malformed_frame_yields_error_without_tearing_down() {
        let hub = Hub::new();
        let (tx, mut rx) = channel();
        let client = Arc::new(ClientHandle::new(new_client_id(), tx));
        hub.register(client.clone()).await;
        rx.recv().await; // connected

        handle_text("not json", &hub, &client).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.kind, MessageType::Error);
    }

    #[tokio::test]
    async fn handshake_init_without_room_id_is_an_error() {
        let hub = Hub::new();
        let (tx, mut rx) = channel();
        let client = Arc::new(ClientHandle::new(new_client_id(), tx));
        hub.register(client.clone()).await;
        rx.recv().await; // connected

        handle_text(r#"{"type":"handshake-init"}"#, &hub, &client).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.kind, MessageType::Error);
    }

    #[tokio::test]
    async fn spoofed_from_is_overwritten_before_routing() {
        let hub = Hub::new();
        let (tx1, mut rx1) = channel();
        let c1 = Arc::new(ClientHandle::new(new_client_id(), tx1));
        let (tx2, mut rx2) = channel();
        let c2 = Arc::new(ClientHandle::new(new_client_id(), tx2));

        hub.register(c1.clone()).await;
        hub.register(c2.clone()).await;
        hub.join_room(&c1, "42-69").await;
        hub.join_room(&c2, "42-69").await;
        rx1.recv().await;
        rx2.recv().await;
        rx1.recv().await; // peer-joined

        let spoofed = format!(
            r#"{{"type":"offer","from":"{}","to":"{}","payload":"X"}}"#,
            c1.id, c1.id
        );
        handle_text(&spoofed, &hub, &c2).await;

        let delivered = rx1.recv().await.unwrap();
        assert_eq!(delivered.from.as_deref(), Some(c2.id.as_str()));
    }
}
