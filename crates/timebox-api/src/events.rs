//! Event types for timeboxd -> client streaming

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, Session};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: timebox_util::now(),
            payload,
        }
    }
}

/// All possible events from the daemon to clients.
///
/// Each lifecycle event carries the full session snapshot so a late-joining
/// subscriber never needs a separate status query to interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A session has started
    Started { session: Session },

    /// Once-per-second countdown update for the running session
    Tick { remaining_secs: u64, session: Session },

    /// The session ran its full planned duration
    Completed { session: Session },

    /// The session was stopped before its deadline
    Stopped { session: Session },

    /// Daemon is shutting down
    Shutdown,
}
