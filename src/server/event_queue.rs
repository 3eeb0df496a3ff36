//! Event queue — broadcast channel carrying stream events to subscribers.
//!
//! One queue exists per `send`/`send_stream` request. The handler's
//! driver task is the only producer; the caller's receiver and, during
//! cancellation, the cancel path are the consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::StreamResponse;

/// Default channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast queue for [`StreamResponse`] events.
///
/// Subscribers receive every event published after they subscribed.
/// Once closed, further publishes are silently dropped.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: broadcast::Sender<StreamResponse>,
    closed: Arc<AtomicBool>,
}

impl EventQueue {
    /// Create a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a queue with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamResponse> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// A missing subscriber is not an error — the caller may have
    /// disconnected mid-stream.
    pub fn publish(&self, event: StreamResponse) {
        if self.closed.load(Ordering::Acquire) {
            warn!("Queue is closed, dropping event");
            return;
        }

        match self.tx.send(event) {
            Ok(count) => debug!(subscriber_count = count, "Event published"),
            Err(_) => debug!("No subscribers for event"),
        }
    }

    /// Close the queue. Subsequent publishes are dropped; receivers
    /// drain buffered events and then observe the channel as closed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, StreamResponse};

    #[tokio::test]
    async fn subscriber_receives_buffered_events() {
        let queue = EventQueue::with_default_capacity();
        let mut rx = queue.subscribe();
        assert_eq!(queue.subscriber_count(), 1);

        queue.publish(StreamResponse::Message(Message::agent("m1", "one")));
        queue.publish(StreamResponse::Message(Message::agent("m2", "two")));

        let first = rx.recv().await.unwrap();
        match first {
            StreamResponse::Message(m) => assert_eq!(m.message_id, "m1"),
            _ => panic!("expected message"),
        }
        let second = rx.recv().await.unwrap();
        match second {
            StreamResponse::Message(m) => assert_eq!(m.message_id, "m2"),
            _ => panic!("expected message"),
        }
    }

    #[tokio::test]
    async fn closed_queue_drops_events() {
        let queue = EventQueue::with_default_capacity();
        let mut rx = queue.subscribe();

        queue.close();
        assert!(queue.is_closed());
        queue.publish(StreamResponse::Message(Message::agent("m1", "late")));

        // Sender still alive, so the receiver just sees an empty channel.
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }
}
