use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use walrelay_core::Event;

use crate::error::{PublishError, PublishResult};
use crate::publisher::{prepare_message, Message, Publisher};

/// A mock publisher for testing.
#[derive(Clone, Default)]
pub struct MockPublisher {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Recorded messages in publish order.
    messages: Vec<Message>,
    /// If set, publishing fails with this error once `fail_after`
    /// messages have been recorded.
    fail_with: Option<String>,
    fail_after: usize,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock publisher that rejects every message.
    pub fn failing(error_message: impl Into<String>) -> Self {
        Self::failing_after(0, error_message)
    }

    /// Create a mock publisher that accepts `count` messages, then fails.
    pub fn failing_after(count: usize, error_message: impl Into<String>) -> Self {
        let publisher = Self::new();
        {
            let mut state = publisher.lock();
            state.fail_with = Some(error_message.into());
            state.fail_after = count;
        }
        publisher
    }

    /// All recorded messages.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Recorded messages for one topic.
    pub fn messages_for(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Recorded messages decoded back into events.
    pub fn events(&self) -> PublishResult<Vec<Event>> {
        self.lock()
            .messages
            .iter()
            .map(|m| serde_json::from_slice(&m.payload).map_err(PublishError::from))
            .collect()
    }

    pub fn total_messages(&self) -> usize {
        self.lock().messages.len()
    }

    /// Clear all recorded messages.
    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Publisher for MockPublisher {
    fn publish(&self, topic: &str, event: &Event) -> impl Future<Output = PublishResult<()>> + Send {
        let state = self.state.clone();
        let message = prepare_message(topic, event);
        async move {
            let message = message?;
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(ref error) = state.fail_with {
                if state.messages.len() >= state.fail_after {
                    return Err(PublishError::Broker(error.clone()));
                }
            }

            state.messages.push(message);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(table: &str) -> Event {
        Event {
            schema: "public".into(),
            table: table.into(),
            action: "insert".into(),
            ..Event::default()
        }
    }

    #[tokio::test]
    async fn test_mock_publisher_records_messages() {
        let publisher = MockPublisher::new();

        publisher.publish("t.users", &event("users")).await.unwrap();
        publisher.publish("t.orders", &event("orders")).await.unwrap();
        publisher.publish("t.users", &event("users")).await.unwrap();

        assert_eq!(publisher.total_messages(), 3);
        assert_eq!(publisher.messages_for("t.users").len(), 2);
        assert_eq!(publisher.messages_for("t.orders").len(), 1);

        let tables: Vec<_> = publisher
            .events()
            .unwrap()
            .into_iter()
            .map(|e| e.table)
            .collect();
        assert_eq!(tables, vec!["users", "orders", "users"]);

        publisher.clear();
        assert_eq!(publisher.total_messages(), 0);
    }

    #[tokio::test]
    async fn test_mock_publisher_failing() {
        let publisher = MockPublisher::failing("broker down");

        let result = publisher.publish("t.users", &event("users")).await;
        assert!(matches!(result, Err(PublishError::Broker(msg)) if msg == "broker down"));
        assert_eq!(publisher.total_messages(), 0);
    }

    #[tokio::test]
    async fn test_mock_publisher_failing_after() {
        let publisher = MockPublisher::failing_after(2, "broker down");

        publisher.publish("t", &event("a")).await.unwrap();
        publisher.publish("t", &event("b")).await.unwrap();
        assert!(publisher.publish("t", &event("c")).await.is_err());
        assert_eq!(publisher.total_messages(), 2);
    }
}
