use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use walrelay_core::Event;

use crate::error::PublishResult;

/// Trait for sending events to a message broker.
pub trait Publisher: Send + Sync {
    /// Publish one event to a topic.
    fn publish(&self, topic: &str, event: &Event) -> impl Future<Output = PublishResult<()>> + Send;
}

/// A broker-ready message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    /// Target partition; `None` lets the broker choose.
    pub partition: Option<i32>,
    /// JSON-encoded event.
    pub payload: Vec<u8>,
}

/// Encode an event as a message for `topic`.
pub fn prepare_message(topic: &str, event: &Event) -> PublishResult<Message> {
    Ok(Message {
        topic: topic.to_string(),
        partition: None,
        payload: serde_json::to_vec(event)?,
    })
}

/// Maps events to topic names.
///
/// The topic for an event is `{topic}.{prefix}{name}`, where `name` is the
/// `topics_map` entry for `{schema}_{table}`, or `{schema}_{table}` itself.
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    topic: String,
    prefix: String,
    topics_map: HashMap<String, String>,
}

impl TopicRouter {
    pub fn new(
        topic: impl Into<String>,
        prefix: impl Into<String>,
        topics_map: HashMap<String, String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            prefix: prefix.into(),
            topics_map,
        }
    }

    pub fn topic_for(&self, event: &Event) -> String {
        let table = format!("{}_{}", event.schema, event.table);
        let name = self.topics_map.get(&table).unwrap_or(&table);
        format!("{}.{}{}", self.topic, self.prefix, name)
    }
}

/// Publisher that writes each message as one line: the topic, a tab, and
/// the JSON payload.
pub struct StdoutPublisher {
    out: Mutex<Box<dyn Write + Send>>,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    fn write_message(&self, message: &Message) -> PublishResult<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(message.topic.as_bytes())?;
        out.write_all(b"\t")?;
        out.write_all(&message.payload)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for StdoutPublisher {
    fn publish(&self, topic: &str, event: &Event) -> impl Future<Output = PublishResult<()>> + Send {
        let result = prepare_message(topic, event).and_then(|message| self.write_message(&message));
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use walrelay_core::Value;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn event(schema: &str, table: &str) -> Event {
        Event {
            schema: schema.into(),
            table: table.into(),
            action: "insert".into(),
            ..Event::default()
        }
    }

    #[test]
    fn test_prepare_message() {
        let mut ev = event("public", "users");
        ev.data.insert("id".into(), Value::Int(1));

        let message = prepare_message("wal.public_users", &ev).unwrap();
        assert_eq!(message.topic, "wal.public_users");
        assert_eq!(message.partition, None);

        let decoded: Event = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(decoded, ev);
    }

    #[test]
    fn test_topic_router_default_name() {
        let router = TopicRouter::new("wal_listener", "", HashMap::new());
        assert_eq!(
            router.topic_for(&event("public", "users")),
            "wal_listener.public_users"
        );
    }

    #[test]
    fn test_topic_router_prefix_and_map() {
        let topics_map = [("public_users".to_string(), "users_changes".to_string())]
            .into_iter()
            .collect();
        let router = TopicRouter::new("wal_listener", "pre_", topics_map);

        assert_eq!(
            router.topic_for(&event("public", "users")),
            "wal_listener.pre_users_changes"
        );
        assert_eq!(
            router.topic_for(&event("billing", "orders")),
            "wal_listener.pre_billing_orders"
        );
    }

    #[tokio::test]
    async fn test_stdout_publisher_writes_lines() {
        let buf = SharedBuf::default();
        let publisher = StdoutPublisher::with_writer(buf.clone());

        publisher
            .publish("wal.public_users", &event("public", "users"))
            .await
            .unwrap();
        publisher
            .publish("wal.public_orders", &event("public", "orders"))
            .await
            .unwrap();

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);

        let (topic, payload) = lines[1].split_once('\t').unwrap();
        assert_eq!(topic, "wal.public_orders");
        let decoded: Event = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded.table, "orders");
    }
}
