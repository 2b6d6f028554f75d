//! Publish-ready change events and the pool they are recycled through.
//!
//! An event is acquired from the pool when an action is materialized and
//! is owned by whoever receives it from the event stream. The receiver
//! hands it back with [`EventPool::release`] once it is done with it; the
//! pool never takes an event back on its own.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::RowMap;

/// A filtered change event, the unit handed to publishers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub schema: String,
    pub table: String,
    pub action: String,
    pub data: RowMap,
    pub data_old: RowMap,
    /// Commit time of the transaction the row change belongs to.
    pub event_time: DateTime<Utc>,
}

impl Event {
    /// Drop all row data while keeping allocated capacity.
    fn reset(&mut self) {
        self.id = Uuid::nil();
        self.schema.clear();
        self.table.clear();
        self.action.clear();
        self.data.clear();
        self.data_old.clear();
        self.event_time = DateTime::<Utc>::default();
    }
}

/// Thread-safe free list of reusable events.
///
/// `acquire` allocates a fresh event when the free list is empty, so a
/// consumer that never releases makes the pool allocate more, not fail.
#[derive(Debug, Default)]
pub struct EventPool {
    free: Mutex<Vec<Box<Event>>>,
    allocated: AtomicUsize,
}

impl EventPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool holding `count` ready events.
    pub fn with_capacity(count: usize) -> Self {
        let free = (0..count).map(|_| Box::<Event>::default()).collect();
        Self {
            free: Mutex::new(free),
            allocated: AtomicUsize::new(count),
        }
    }

    /// Take an event out of the pool. Its fields are empty.
    pub fn acquire(&self) -> Box<Event> {
        if let Some(event) = self.free_list().pop() {
            return event;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Box::default()
    }

    /// Return an event to the pool.
    pub fn release(&self, mut event: Box<Event>) {
        event.reset();
        self.free_list().push(event);
    }

    /// Number of events waiting in the free list.
    pub fn available(&self) -> usize {
        self.free_list().len()
    }

    /// Number of events this pool has ever allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn free_list(&self) -> MutexGuard<'_, Vec<Box<Event>>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
