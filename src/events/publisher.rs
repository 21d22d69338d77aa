use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::defaults;

/// Broadcast publisher for job, step and partition lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event_id: Uuid,
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event with the given name and context
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = PublishedEvent {
            event_id: Uuid::new_v4(),
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers registered");
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher = EventPublisher::default();
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(events::JOB_STARTED, json!({"job_name": "job"}));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher.publish(events::JOB_STARTED, json!({"id": 1}));
        publisher.publish(events::JOB_COMPLETED, json!({"id": 1}));

        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.name, events::JOB_STARTED);
        assert_eq!(second.name, events::JOB_COMPLETED);
        assert_eq!(second.context["id"], 1);
        assert_ne!(first.event_id, second.event_id);
    }
}
