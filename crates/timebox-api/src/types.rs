//! Shared types for the timeboxd API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use timebox_util::SessionId;

/// Who initiated a session. Records who started it, not who stops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Human,
    Agent,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Human => write!(f, "human"),
            Origin::Agent => write!(f, "agent"),
        }
    }
}

/// Lifecycle status of a session. `Running` only while active; transitions
/// exactly once to a terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Stopped)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// One timebox attempt.
///
/// `ended_at` is set exactly once, at termination; a completed session's
/// `ended_at` is `started_at + duration_secs` regardless of tick jitter,
/// a stopped session's is the wall-clock stop time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub label: String,
    pub duration_secs: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub origin: Origin,
    pub status: SessionStatus,
}

impl Session {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Planned wall-clock deadline, `started_at + duration`.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::seconds(self.duration_secs as i64)
    }
}

/// Point-in-time view of the engine, safe to request at any moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session: Option<Session>,
    pub remaining_secs: u64,
    pub is_running: bool,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self {
            session: None,
            remaining_secs: 0,
            is_running: false,
        }
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
}
