use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::message::Message;

/// bounded per-client outbox capacity. the hub never blocks on a send to
/// this queue; a peer that can't keep up loses messages, not the hub.
pub const OUTBOX_CAPACITY: usize = 256;

/// consumer half, owned by the client's write task.
pub struct Rx(pub mpsc::Receiver<Message>);

impl Rx {
    pub async fn recv(&mut self) -> Option<Message> {
        self.0.recv().await
    }
}

/// producer half, held by the hub (in `clients` and in any `Room` the
/// client has joined) and clonable freely — every clone shares the same
/// underlying sender, so closing through any one of them closes the
/// outbox for all.
#[derive(Clone)]
pub struct Tx {
    inner: Arc<Mutex<Option<mpsc::Sender<Message>>>>,
}

/// build a fresh bounded outbox pair.
///
/// # Examples
///
/// ```
/// use signal_hub::channel::{channel, OUTBOX_CAPACITY};
/// use signal_hub::message::Message;
/// use tokio::runtime::Runtime;
///
/// Runtime::new().unwrap().block_on(async {
///     let (tx, mut rx) = channel();
///     assert!(tx.try_send(Message::connected("a")));
///     assert_eq!(rx.recv().await.unwrap().client_id.as_deref(), Some("a"));
///     let _ = OUTBOX_CAPACITY;
/// });
/// ```
pub fn channel() -> (Tx, Rx) {
    let (sender, receiver) = mpsc::channel(OUTBOX_CAPACITY);
    (
        Tx {
            inner: Arc::new(Mutex::new(Some(sender))),
        },
        Rx(receiver),
    )
}

impl Tx {
    /// enqueue a message without blocking. returns `false` (and drops the
    /// message) when the outbox is at capacity or already closed; the hub
    /// must never stall routing on a single slow peer because of this.
    pub fn try_send(&self, message: Message) -> bool {
        let guard = self.inner.lock().expect("outbox mutex poisoned");
        match guard.as_ref() {
            Some(sender) => sender.try_send(message).is_ok(),
            None => false,
        }
    }

    /// close the outbox exactly once. idempotent: a second call is a
    /// no-op. dropping the last sender unblocks the write task's `recv()`
    /// with `None`, after it has drained whatever was already queued
    /// (FIFO is preserved — nothing is lost out of order).
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("outbox mutex poisoned");
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("outbox mutex poisoned").is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_within_one_outbox() {
        let (tx, mut rx) = channel();
        tx.try_send(Message::connected("a"));
        tx.try_send(Message::room_expired("42-69"));

        assert_eq!(rx.recv().await.unwrap().client_id.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.unwrap().room_id.as_deref(), Some("42-69"));
    }

    #[tokio::test]
    async fn full_outbox_drops_the_next_message_only() {
        let (sender, mut receiver) = mpsc::channel(1);
        let tx = Tx {
            inner: Arc::new(Mutex::new(Some(sender))),
        };

        assert!(tx.try_send(Message::connected("a")));
        assert!(!tx.try_send(Message::connected("b")));

        // drain, then a later send arrives normally.
        assert_eq!(receiver.recv().await.unwrap().client_id.as_deref(), Some("a"));
        assert!(tx.try_send(Message::connected("c")));
        assert_eq!(receiver.recv().await.unwrap().client_id.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_unblocks_recv() {
        let (tx, mut rx) = channel();
        tx.try_send(Message::connected("a"));
        tx.close();
        tx.close(); // must not panic or double-close.

        assert_eq!(rx.recv().await.unwrap().client_id.as_deref(), Some("a"));
        assert_eq!(rx.recv().await, None);
        assert!(!tx.try_send(Message::connected("b")));
    }
}
