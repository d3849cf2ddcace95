//! Classroom broadcast bus.

use std::collections::HashMap;
use std::sync::Mutex;

use classpulse_core::{ClassroomEvent, ClassroomId, EventSink};
use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 256;

/// Per-classroom fan-out of [`ClassroomEvent`]s.
///
/// Channels are created lazily on first use and publishing to a
/// classroom nobody is watching is a cheap no-op. A slow subscriber
/// that lags past the channel capacity drops the oldest events; the
/// payloads mirror what the read path returns, so a lagged client
/// recovers by re-reading.
pub struct ClassroomBus {
    channels: Mutex<HashMap<ClassroomId, broadcast::Sender<ClassroomEvent>>>,
}

impl ClassroomBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to one classroom's events.
    pub fn subscribe(&self, classroom_id: ClassroomId) -> broadcast::Receiver<ClassroomEvent> {
        self.sender(classroom_id).subscribe()
    }

    fn sender(&self, classroom_id: ClassroomId) -> broadcast::Sender<ClassroomEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(classroom_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for ClassroomBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ClassroomBus {
    fn publish(&self, classroom_id: ClassroomId, event: ClassroomEvent) {
        trace!(%classroom_id, ?event, "publishing classroom event");
        // send fails only when no receiver exists; that is fine.
        let _ = self.sender(classroom_id).send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classpulse_core::{Poll, PollId};

    fn poll(classroom_id: ClassroomId) -> Poll {
        Poll {
            id: PollId::new(),
            classroom_id,
            question: "Q?".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            is_active: true,
            created_at: chrono::Utc::now(),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn events_reach_only_the_right_classroom() {
        let bus = ClassroomBus::new();
        let here = ClassroomId::new();
        let elsewhere = ClassroomId::new();
        let mut rx_here = bus.subscribe(here);
        let mut rx_elsewhere = bus.subscribe(elsewhere);

        bus.publish(here, ClassroomEvent::PollOpened { poll: poll(here) });

        assert!(matches!(
            rx_here.try_recv(),
            Ok(ClassroomEvent::PollOpened { .. })
        ));
        assert!(rx_elsewhere.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let bus = ClassroomBus::new();
        let classroom = ClassroomId::new();
        bus.publish(classroom, ClassroomEvent::PollOpened { poll: poll(classroom) });

        // A later subscriber starts with an empty channel.
        let mut rx = bus.subscribe(classroom);
        assert!(rx.try_recv().is_err());
    }
}
