use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::Severity;

/// In-process publisher for filing lifecycle and alert events. The durable
/// audit trail lives in `aduana_transaction_events`; this channel feeds
/// dashboards and the notification collaborator without a database poll.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Alert emitted when a cataloged error crosses its frequency threshold or
/// is flagged for immediate notification.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub transaction_id: Option<Uuid>,
    pub catalog_entry_id: Option<i64>,
    pub severity: Severity,
    pub message: String,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub async fn publish(
        &self,
        event_name: impl Into<String>,
        context: Value,
    ) -> Result<(), PublishError> {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // A send error only means there are no subscribers, which is fine.
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let publisher = EventPublisher::new(16);
        let mut rx = publisher.subscribe();

        publisher
            .publish("transaction.sent", json!({"transaction_id": "abc"}))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "transaction.sent");
        assert_eq!(event.context["transaction_id"], "abc");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(16);
        assert!(publisher.publish("noop", json!({})).await.is_ok());
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
