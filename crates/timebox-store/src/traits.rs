//! Store trait definitions

use chrono::{DateTime, Utc};
use timebox_api::{Session, SessionStatus};
use timebox_util::SessionId;

use crate::StoreResult;

/// Main store trait.
///
/// Writes are atomic and visible to queries issued after the call returns.
/// Implementations serialize their own writes; callers need not coordinate.
pub trait SessionStore: Send + Sync {
    /// Persist a new session record (status Running).
    fn insert(&self, session: &Session) -> StoreResult<()>;

    /// Set the terminal status and end time of an existing record.
    fn update_terminal(
        &self,
        id: &SessionId,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// All records whose `started_at` falls in the inclusive range
    /// (unbounded by default), newest first. An empty result is `Ok`.
    fn query(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Session>>;

    /// Close records left `Running` by a crash, marking them Stopped.
    /// Returns how many were closed.
    fn cleanup_stale_running(&self) -> StoreResult<usize>;

    /// Check if the store is healthy
    fn is_healthy(&self) -> bool;
}
