//! Error types for the scope and session layers.

use thiserror::Error;

use crate::models::SessionState;

/// Failures reported by a [`SessionStore`](crate::store::SessionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session location not found: {0}")]
    MissingLocation(String),

    #[error("Store is not bound to a location")]
    NotBound,

    #[error("Historical record {0} not found")]
    RecordNotFound(i64),

    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid rule pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Could not replay record {id}: {reason}")]
    Replay { id: i64, reason: String },

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Session is {0}, mutation not permitted")]
    NotOpen(SessionState),

    #[error("Scope tree owner has shut down")]
    OwnerGone,

    #[error("Session operation panicked: {0}")]
    Panicked(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SessionResult<T> = Result<T, SessionError>;
