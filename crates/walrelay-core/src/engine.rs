//! The filtering pass that turns buffered actions into an event stream.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::action::ActionData;
use crate::event::{Event, EventPool};
use crate::filter::{Filter, Verdict};
use crate::monitor::Monitor;

/// Events are handed over one at a time; the pass waits for the consumer
/// to take each event before producing the next.
const CHANNEL_CAPACITY: usize = 1;

/// One transaction's filtering pass, run as its own task.
pub struct FilterPass {
    pub actions: Vec<ActionData>,
    pub commit_time: DateTime<Utc>,
    pub filter: Arc<Filter>,
    pub pool: Arc<EventPool>,
    pub monitor: Arc<dyn Monitor>,
    pub cancel: CancellationToken,
}

impl FilterPass {
    /// Spawn the pass on the current tokio runtime and return its stream.
    ///
    /// The receiver yields surviving events in action order and ends when
    /// the actions are exhausted or the token is cancelled.
    pub fn spawn(self) -> mpsc::Receiver<Box<Event>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(self.run(tx));
        rx
    }

    async fn run(self, tx: mpsc::Sender<Box<Event>>) {
        let FilterPass {
            actions,
            commit_time,
            filter,
            pool,
            monitor,
            cancel,
        } = self;

        for action in actions {
            if cancel.is_cancelled() {
                debug!("create events with filter: context canceled");
                break;
            }

            let mut event = pool.acquire();
            materialize(&mut event, action, commit_time);

            match filter.evaluate(&event) {
                Verdict::Pass => {}
                Verdict::SkipTable => {
                    monitor.inc_filter_skipped_events(&event.table);
                    debug!(
                        schema = %event.schema,
                        table = %event.table,
                        action = %event.action,
                        "wal-message was skipped by table/action filter"
                    );
                    pool.release(event);
                    continue;
                }
                Verdict::SkipColumn { column, value } => {
                    monitor.inc_filter_skipped_events(&event.table);
                    debug!(
                        table = %event.table,
                        column = %column,
                        value = %value,
                        "wal-message was skipped by column filter"
                    );
                    pool.release(event);
                    continue;
                }
            }

            // Reserve first so a cancelled send hands the event back to the pool.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("create events with filter: context canceled");
                    pool.release(event);
                    break;
                }
                permit = tx.reserve() => permit,
            };

            match permit {
                Ok(permit) => permit.send(event),
                Err(_) => {
                    debug!("create events with filter: receiver dropped");
                    pool.release(event);
                    break;
                }
            }
        }
    }
}

/// Fill a pooled event from an action.
///
/// Columns are inserted in position order, so a duplicated column name
/// keeps the later value.
fn materialize(event: &mut Event, action: ActionData, commit_time: DateTime<Utc>) {
    event.id = Uuid::new_v4();
    event.schema = action.schema;
    event.table = action.table;
    event.action.push_str(action.kind.as_str());

    event.data.reserve(action.new_columns.len());
    for column in action.new_columns {
        event.data.insert(column.name, column.value);
    }

    event.data_old.reserve(action.old_columns.len());
    for column in action.old_columns {
        event.data_old.insert(column.name, column.value);
    }

    event.event_time = commit_time;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Column;
    use crate::monitor::SkipCounter;
    use crate::types::{ActionKind, Value};

    fn insert(table: &str, id: i64) -> ActionData {
        ActionData {
            schema: "public".into(),
            table: table.into(),
            kind: ActionKind::Insert,
            old_columns: vec![],
            new_columns: vec![Column::new("id", Value::Int(id), true)],
        }
    }

    fn pass(actions: Vec<ActionData>, filter: Filter, monitor: Arc<SkipCounter>) -> FilterPass {
        FilterPass {
            actions,
            commit_time: DateTime::<Utc>::default(),
            filter: Arc::new(filter),
            pool: Arc::new(EventPool::new()),
            monitor,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_materialize() {
        let mut event = Event::default();
        let commit_time = Utc::now();
        let mut action = insert("users", 7);
        action
            .new_columns
            .push(Column::new("id", Value::Int(8), true));

        materialize(&mut event, action, commit_time);

        assert!(!event.id.is_nil());
        assert_eq!(event.schema, "public");
        assert_eq!(event.table, "users");
        assert_eq!(event.action, "insert");
        assert_eq!(event.data.get("id"), Some(&Value::Int(8)));
        assert!(event.data_old.is_empty());
        assert_eq!(event.event_time, commit_time);
    }

    #[tokio::test]
    async fn test_dropped_events_return_to_pool() {
        let monitor = Arc::new(SkipCounter::new());
        let p = pass(
            vec![insert("orders", 1), insert("users", 2), insert("orders", 3)],
            Filter::default().allow("users", ["insert"]),
            monitor.clone(),
        );
        let pool = Arc::clone(&p.pool);

        let mut rx = p.spawn();
        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.data["id"].clone());
            pool.release(event);
        }

        assert_eq!(received, vec![Value::Int(2)]);
        assert_eq!(monitor.get("orders"), 2);
        assert_eq!(pool.available(), pool.allocated());
    }

    #[tokio::test]
    async fn test_dropping_receiver_stops_pass() {
        let monitor = Arc::new(SkipCounter::new());
        let actions = (0..10).map(|i| insert("users", i)).collect();
        let p = pass(actions, Filter::default().allow("users", ["insert"]), monitor);
        let pool = Arc::clone(&p.pool);

        let mut rx = p.spawn();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.data["id"], Value::Int(0));
        pool.release(first);
        drop(rx);

        // Let the task observe the closed channel.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(pool.allocated() <= 3);
    }
}
