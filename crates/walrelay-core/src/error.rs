use thiserror::Error;

/// Errors that can occur in walrelay-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("relation not found: {0}")]
    RelationNotFound(u32),

    #[error("commit time is not set for the current transaction")]
    MissingCommitTime,

    #[error("unknown action kind: {0}")]
    UnknownActionKind(String),
}

pub type Result<T> = std::result::Result<T, Error>;
