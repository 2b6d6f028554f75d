use tokio::sync::mpsc;
use tracing::{debug, warn};
use walrelay_core::{Event, EventPool};

use crate::error::PublishResult;
use crate::publisher::{Publisher, TopicRouter};

/// Counters from one relay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub published: u64,
}

/// Publish every event from `rx` in order, returning each one to `pool`.
///
/// Stops at the first publish error. The receiver is dropped on return,
/// which ends the pass producing the events.
pub async fn relay<P: Publisher>(
    mut rx: mpsc::Receiver<Box<Event>>,
    publisher: &P,
    router: &TopicRouter,
    pool: &EventPool,
) -> PublishResult<RelayStats> {
    let mut stats = RelayStats::default();

    while let Some(event) = rx.recv().await {
        let topic = router.topic_for(&event);
        let result = publisher.publish(&topic, &event).await;

        if let Err(e) = result {
            warn!(
                topic = %topic,
                table = %event.table,
                retryable = e.is_retryable(),
                "failed to publish event: {}",
                e
            );
            pool.release(event);
            return Err(e);
        }

        debug!(topic = %topic, id = %event.id, "event published");
        pool.release(event);
        stats.published += 1;
    }

    Ok(stats)
}
