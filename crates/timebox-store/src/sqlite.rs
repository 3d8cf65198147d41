//! SQLite-based store implementation

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use timebox_api::{Origin, Session, SessionStatus};
use timebox_util::SessionId;
use tracing::debug;

use crate::{SessionStore, StoreError, StoreResult};

/// SQLite-based session store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Fixed-width RFC 3339 so stored timestamps order lexicographically.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn column_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY NOT NULL,
                label TEXT NOT NULL CHECK(length(label) >= 1 AND length(label) <= 64),
                duration_secs INTEGER NOT NULL CHECK(duration_secs > 0),
                started_at TEXT NOT NULL,
                ended_at TEXT,
                origin TEXT NOT NULL CHECK(origin IN ('human', 'agent')),
                status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'stopped'))
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
        let id: String = row.get(0)?;
        let label: String = row.get(1)?;
        let duration_secs: i64 = row.get(2)?;
        let started_at: String = row.get(3)?;
        let ended_at: Option<String> = row.get(4)?;
        let origin: String = row.get(5)?;
        let status: String = row.get(6)?;

        Ok(Session {
            id: SessionId::parse(&id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            label,
            duration_secs: duration_secs as u64,
            started_at: column_ts(3, &started_at)?,
            ended_at: ended_at.as_deref().map(|s| column_ts(4, s)).transpose()?,
            origin: match origin.as_str() {
                "agent" => Origin::Agent,
                _ => Origin::Human,
            },
            status: match status.as_str() {
                "completed" => SessionStatus::Completed,
                "stopped" => SessionStatus::Stopped,
                _ => SessionStatus::Running,
            },
        })
    }
}

impl SessionStore for SqliteStore {
    fn insert(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        let result = conn.execute(
            "INSERT INTO sessions (id, label, duration_secs, started_at, ended_at, origin, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id.to_string(),
                session.label,
                session.duration_secs as i64,
                ts(session.started_at),
                session.ended_at.map(ts),
                session.origin.to_string(),
                session.status.to_string(),
            ],
        );

        match result {
            Ok(_) => {
                debug!(session_id = %session.id, "Session inserted");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateId(session.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_terminal(
        &self,
        id: &SessionId,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !status.is_terminal() {
            return Err(StoreError::NotTerminal(status));
        }

        let conn = self.conn.lock().unwrap();

        let affected = conn.execute(
            "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3",
            params![status.to_string(), ts(ended_at), id.to_string()],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        debug!(session_id = %id, status = %status, "Session terminated");
        Ok(())
    }

    fn query(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Session>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT id, label, duration_secs, started_at, ended_at, origin, status
             FROM sessions WHERE 1=1",
        );
        let mut bound: Vec<String> = Vec::new();

        if let Some(start) = start_date {
            sql.push_str(&format!(" AND started_at >= ?{}", bound.len() + 1));
            bound.push(ts(start));
        }
        if let Some(end) = end_date {
            sql.push_str(&format!(" AND started_at <= ?{}", bound.len() + 1));
            bound.push(ts(end));
        }
        sql.push_str(" ORDER BY started_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let bound_refs: Vec<&dyn rusqlite::types::ToSql> = bound
            .iter()
            .map(|v| v as &dyn rusqlite::types::ToSql)
            .collect();

        let rows = stmt.query_map(bound_refs.as_slice(), Self::row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }

        Ok(sessions)
    }

    fn cleanup_stale_running(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE sessions SET status = 'stopped', ended_at = ?1 WHERE status = 'running'",
            params![ts(timebox_util::now())],
        )?;
        Ok(count)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => false,
        }
    }
}
