//! Per-transaction action buffer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::action::{ActionData, Column};
use crate::decode::{decode_column, TupleData};
use crate::engine::FilterPass;
use crate::error::{Error, Result};
use crate::event::{Event, EventPool};
use crate::filter::Filter;
use crate::monitor::Monitor;
use crate::relation::{RelationCache, RelationColumn, RelationData};
use crate::types::{ActionKind, Value};

/// Initial action capacity; a sizing hint, not a limit.
const APPROX_ACTIONS: usize = 300;

/// The transaction currently being assembled from the replication stream.
///
/// The relation cache lives for the whole replication session. Everything
/// else is scoped to one transaction and is reset by [`Wal::clear`].
pub struct Wal {
    pool: Arc<EventPool>,
    monitor: Arc<dyn Monitor>,
    relations: RelationCache,
    pub xid: Option<u32>,
    pub lsn: Option<u64>,
    pub begin_time: Option<DateTime<Utc>>,
    pub commit_time: Option<DateTime<Utc>>,
    actions: Vec<ActionData>,
}

impl Wal {
    pub fn new(pool: Arc<EventPool>, monitor: Arc<dyn Monitor>) -> Self {
        Self {
            pool,
            monitor,
            relations: RelationCache::new(),
            xid: None,
            lsn: None,
            begin_time: None,
            commit_time: None,
            actions: Vec::with_capacity(APPROX_ACTIONS),
        }
    }

    /// Register or replace a relation's metadata.
    pub fn register_relation(&mut self, relation_id: u32, relation: RelationData) {
        debug!(
            relation_id,
            schema = %relation.schema,
            table = %relation.table,
            "relation registered"
        );
        self.relations.update(relation_id, relation);
    }

    pub fn relations(&self) -> &RelationCache {
        &self.relations
    }

    /// Start a transaction.
    pub fn begin(&mut self, xid: u32, final_lsn: u64, begin_time: DateTime<Utc>) {
        self.xid = Some(xid);
        self.lsn = Some(final_lsn);
        self.begin_time = Some(begin_time);
    }

    /// Record the transaction's commit; events are stamped with `commit_time`.
    pub fn commit(&mut self, commit_lsn: u64, commit_time: DateTime<Utc>) {
        self.lsn = Some(commit_lsn);
        self.commit_time = Some(commit_time);
    }

    /// Build an action from one decoded row change.
    ///
    /// Row values are paired with the relation's columns by position. Values
    /// past the last column are ignored. The action is not buffered; use
    /// [`Wal::push_action`] for that.
    pub fn create_action_data(
        &self,
        relation_id: u32,
        old_rows: &[TupleData],
        new_rows: &[TupleData],
        kind: ActionKind,
    ) -> Result<ActionData> {
        let Some(relation) = self.relations.get(relation_id) else {
            debug!(relation_id, "relation not found");
            return Err(Error::RelationNotFound(relation_id));
        };

        Ok(ActionData {
            schema: relation.schema.clone(),
            table: relation.table.clone(),
            kind,
            old_columns: decode_row(relation, old_rows),
            new_columns: decode_row(relation, new_rows),
        })
    }

    /// Append an action to the transaction.
    pub fn push_action(&mut self, action: ActionData) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[ActionData] {
        &self.actions
    }

    /// Reset the transaction-scoped state. The relation cache is kept.
    pub fn clear(&mut self) {
        self.xid = None;
        self.lsn = None;
        self.begin_time = None;
        self.commit_time = None;
        self.actions.clear();
    }

    /// Hand a consumed event back to the pool.
    pub fn retrieve_event(&self, event: Box<Event>) {
        self.pool.release(event);
    }

    pub fn pool(&self) -> &Arc<EventPool> {
        &self.pool
    }

    /// Filter the buffered actions and stream the surviving events.
    ///
    /// The buffered actions move into a task spawned on the current tokio
    /// runtime, leaving the buffer empty. Events arrive in buffering order.
    /// The stream ends after the last action, or early once `cancel` fires;
    /// a cut-short stream is a normal outcome.
    ///
    /// Fails with [`Error::MissingCommitTime`] if the transaction has no
    /// commit time yet. The buffered actions are left in place in that case.
    pub fn create_events_with_filter(
        &mut self,
        cancel: CancellationToken,
        filter: Arc<Filter>,
    ) -> Result<mpsc::Receiver<Box<Event>>> {
        let commit_time = self.commit_time.ok_or(Error::MissingCommitTime)?;

        let pass = FilterPass {
            actions: std::mem::take(&mut self.actions),
            commit_time,
            filter,
            pool: Arc::clone(&self.pool),
            monitor: Arc::clone(&self.monitor),
            cancel,
        };

        Ok(pass.spawn())
    }
}

fn decode_row(relation: &RelationData, rows: &[TupleData]) -> Vec<Column> {
    if rows.len() > relation.columns.len() {
        debug!(
            table = %relation.table,
            values = rows.len(),
            columns = relation.columns.len(),
            "row has more values than relation columns, ignoring extras"
        );
    }

    let mut columns = Vec::with_capacity(rows.len().min(relation.columns.len()));
    for (raw, column) in rows.iter().zip(&relation.columns) {
        match decode_column(raw, column) {
            Some(value) => columns.push(to_column(column, value)),
            None => debug!(
                table = %relation.table,
                column = %column.name,
                "unchanged toast value, column omitted"
            ),
        }
    }
    columns
}

fn to_column(column: &RelationColumn, value: Value) -> Column {
    Column::new(column.name.clone(), value, column.is_key)
}
