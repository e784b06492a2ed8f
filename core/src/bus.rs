//! In-process event bus, spec §4.10. Best-effort fan-out to subscribers;
//! producers never block on a slow or absent receiver.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ScanProgress {
        library_id: i64,
        total: Option<u64>,
        processed: u64,
        added: u64,
        skipped: u64,
        errored: u64,
        current_file: Option<String>,
        last_error: Option<String>,
    },
    ScanComplete {
        library_id: i64,
        processed: u64,
        added: u64,
        skipped: u64,
        errored: u64,
    },
    EncodingProgress {
        file_id: i64,
        percent: Option<f64>,
        time: Option<String>,
    },
    EncodingComplete {
        file_id: i64,
        outcome: String,
    },
}

/// Wraps a `broadcast::Sender`; publishing is fire-and-forget, matching
/// "best-effort ... must not block producers". A lagging subscriber drops
/// messages and is told so via `RecvError::Lagged` on its own receiver.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Never errors in the caller's sense: zero subscribers is a normal,
    /// expected state and is silently dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::ScanComplete {
            library_id: 1,
            processed: 0,
            added: 0,
            skipped: 0,
            errored: 0,
        });
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::EncodingComplete {
            file_id: 42,
            outcome: "finished".to_string(),
        });
        let event = rx.recv().await.unwrap();
        match event {
            Event::EncodingComplete { file_id, .. } => assert_eq!(file_id, 42),
            _ => panic!("wrong event variant"),
        }
    }
}
