//! Replays recorded transactions through the relay pipeline.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use walrelay_config::{to_filter, RelayConfig};
use walrelay_core::{
    ActionKind, CancellationToken, EventPool, Monitor, RelationColumn, RelationData, TupleData,
    Wal,
};
use walrelay_publish::{relay, Publisher, TopicRouter};

/// A recorded replication session.
#[derive(Debug, Deserialize)]
pub struct ReplayFile {
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    pub transactions: Vec<TransactionDef>,
}

#[derive(Debug, Deserialize)]
pub struct RelationDef {
    pub id: u32,
    pub schema: String,
    pub table: String,
    pub columns: Vec<RelationColumn>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionDef {
    #[serde(default)]
    pub xid: Option<u32>,
    #[serde(default)]
    pub lsn: Option<u64>,
    #[serde(default)]
    pub begin_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commit_time: Option<DateTime<Utc>>,
    pub actions: Vec<ActionDef>,
}

#[derive(Debug, Deserialize)]
pub struct ActionDef {
    pub relation_id: u32,
    pub kind: String,
    #[serde(default)]
    pub old: Vec<Option<CellDef>>,
    #[serde(default)]
    pub new: Vec<Option<CellDef>>,
}

/// One column value. JSON `null` is SQL NULL.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CellDef {
    Text(String),
    /// Hex-encoded binary value.
    Binary { binary: String },
    Unchanged { unchanged: bool },
}

impl ReplayFile {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse replay file")
    }
}

/// Totals for one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub transactions: usize,
    pub published: u64,
    pub cancelled: bool,
}

/// Run every transaction in `replay` through the filter and publisher.
pub async fn run_replay<P: Publisher>(
    config: &RelayConfig,
    replay: ReplayFile,
    publisher: &P,
    monitor: Arc<dyn Monitor>,
    cancel: CancellationToken,
) -> Result<ReplaySummary> {
    let filter = Arc::new(to_filter(&config.listener.filter)?);
    let router = TopicRouter::new(
        config.publisher.topic.clone(),
        config.publisher.topic_prefix.clone(),
        config.listener.topics_map.clone(),
    );

    let mut wal = Wal::new(Arc::new(EventPool::new()), monitor);
    for relation in replay.relations {
        wal.register_relation(
            relation.id,
            RelationData::new(relation.schema, relation.table, relation.columns),
        );
    }

    let mut summary = ReplaySummary::default();

    for (n, tx) in replay.transactions.into_iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        load_transaction(&mut wal, tx).with_context(|| format!("Transaction {}", n))?;

        let rx = wal
            .create_events_with_filter(cancel.clone(), Arc::clone(&filter))
            .with_context(|| format!("Transaction {}", n))?;
        let stats = relay(rx, publisher, &router, wal.pool())
            .await
            .with_context(|| format!("Failed to publish transaction {}", n))?;

        debug!(
            transaction = n,
            xid = ?wal.xid,
            published = stats.published,
            "transaction relayed"
        );
        wal.clear();

        summary.transactions += 1;
        summary.published += stats.published;
    }

    if cancel.is_cancelled() {
        summary.cancelled = true;
        warn!("replay interrupted");
    }

    info!(
        transactions = summary.transactions,
        published = summary.published,
        "replay finished"
    );

    Ok(summary)
}

fn load_transaction(wal: &mut Wal, tx: TransactionDef) -> Result<()> {
    if let Some(begin_time) = tx.begin_time {
        wal.begin(
            tx.xid.unwrap_or_default(),
            tx.lsn.unwrap_or_default(),
            begin_time,
        );
    } else {
        wal.xid = tx.xid;
    }

    for action in tx.actions {
        let kind: ActionKind = action.kind.parse()?;
        let old = to_tuples(action.old)?;
        let new = to_tuples(action.new)?;
        let data = wal.create_action_data(action.relation_id, &old, &new, kind)?;
        wal.push_action(data);
    }

    if let Some(commit_time) = tx.commit_time {
        wal.commit(tx.lsn.unwrap_or_default(), commit_time);
    }

    Ok(())
}

fn to_tuples(cells: Vec<Option<CellDef>>) -> Result<Vec<TupleData>> {
    cells
        .into_iter()
        .map(|cell| -> Result<TupleData> {
            Ok(match cell {
                None => TupleData::Null,
                Some(CellDef::Text(text)) => TupleData::Text(text),
                Some(CellDef::Binary { binary }) => TupleData::Binary(
                    hex::decode(&binary)
                        .with_context(|| format!("Invalid hex value: {}", binary))?,
                ),
                Some(CellDef::Unchanged { unchanged: true }) => TupleData::Unchanged,
                Some(CellDef::Unchanged { unchanged: false }) => {
                    bail!("\"unchanged\" must be true when present")
                }
            })
        })
        .collect()
}
