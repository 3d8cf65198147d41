//! Persistence layer for timeboxd
//!
//! Provides the durable session history: insert-on-start, update-on-terminate,
//! range queries, and crash cleanup. Never the authority on "what is running
//! now" -- that lives in the engine.

mod sqlite;
mod traits;

pub use sqlite::*;
pub use traits::*;

use thiserror::Error;
use timebox_util::SessionId;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this id already exists. Under correct engine use this
    /// cannot happen; treat as an integrity fault, not a retryable error.
    #[error("Duplicate session id: {0}")]
    DuplicateId(SessionId),

    /// No record with this id exists to update.
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// `update_terminal` was handed a non-terminal status.
    #[error("Status {0} is not terminal")]
    NotTerminal(timebox_api::SessionStatus),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
