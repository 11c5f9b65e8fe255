//! Bounded single-consumer queue between the push transport and the dispatcher.
//!
//! Transports hold cloned `EventSender`s and may deliver from any task or
//! thread. Exactly one `EventReceiver` exists, so events are handled one at a
//! time in arrival order. A full queue applies backpressure to the transport
//! instead of dropping events.

use thiserror::Error;
use tokio::sync::mpsc;

/// Default number of events buffered before transports wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// An event as delivered by the transport: the name it was registered under and its raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedEvent {
    pub name: String,
    pub body: String,
}

impl PushedEvent {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event queue is closed")]
pub struct QueueClosed;

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PushedEvent>,
}

impl EventSender {
    /// Enqueue, waiting for capacity.
    pub async fn send(&self, event: PushedEvent) -> Result<(), QueueClosed> {
        self.tx.send(event).await.map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<PushedEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<PushedEvent> {
        self.rx.recv().await
    }

    /// Refuse further events; already queued events can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = event_queue(4);
        tx.send(PushedEvent::new("AccessRequestAvailable", "{}"))
            .await
            .unwrap();
        tx.send(PushedEvent::new("AccessRequestClosed", "{}"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().name, "AccessRequestAvailable");
        assert_eq!(rx.recv().await.unwrap().name, "AccessRequestClosed");
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (tx, mut rx) = event_queue(1);
        tx.send(PushedEvent::new("a", "")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.send(PushedEvent::new("b", "")),
        )
        .await;
        assert!(blocked.is_err(), "second send should wait for capacity");

        assert_eq!(rx.recv().await.unwrap().name, "a");
        tx.send(PushedEvent::new("b", "")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().name, "b");
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_sends() {
        let (tx, mut rx) = event_queue(2);
        rx.close();
        assert_eq!(tx.send(PushedEvent::new("a", "")).await, Err(QueueClosed));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_receiver_ends_when_senders_drop() {
        let (tx, mut rx) = event_queue(2);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
