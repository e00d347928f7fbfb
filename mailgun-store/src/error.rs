//! Error types for the envelope store.

use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database rejected an operation.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An operation referenced an envelope id that does not exist in this
    /// shard.
    #[error("envelope {0} not found")]
    NotFound(u64),

    /// Store integrity violation (§7): an operation targeted an envelope
    /// in the wrong pre-state, e.g. marking a terminal envelope sent
    /// again. This indicates a bug in the caller and should abort the
    /// worker rather than silently succeed.
    #[error("envelope {id} is not in the expected state for this transition (status={status})")]
    WrongState { id: u64, status: &'static str },

    /// The store file or directory could not be opened (fatal init,
    /// §6 "Exit codes").
    #[error("could not open store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
