//! In-memory core of a Postgres change-data-capture relay.
//!
//! Row changes decoded from logical replication are buffered per
//! transaction in a [`Wal`], turned into pooled [`Event`]s, filtered by
//! table/action and column value, and streamed in order to a consumer.

pub mod action;
pub mod decode;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod monitor;
pub mod relation;
pub mod types;
pub mod wal;

pub use action::{ActionData, Column};
pub use decode::{decode_column, oid, parse_text, TupleData};
pub use engine::FilterPass;
pub use error::{Error, Result};
pub use event::{Event, EventPool};
pub use filter::{fold_case, in_array, Filter, Verdict};
pub use monitor::{Monitor, NoopMonitor, SkipCounter};
pub use relation::{RelationCache, RelationColumn, RelationData};
pub use types::{ActionKind, RowMap, Value};
pub use wal::Wal;

pub use tokio_util::sync::CancellationToken;
