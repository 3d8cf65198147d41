//! Command types for the timeboxd protocol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timebox_util::ClientId;

use crate::{API_VERSION, HealthStatus, Origin, Session, StatusSnapshot};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    AlreadyRunning,
    NoActiveSession,
    InvalidDuration,
    InvalidLabel,
    RateLimited,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a new session
    Start {
        duration_minutes: u32,
        label: String,
        origin: Origin,
    },

    /// Stop the current session
    Stop,

    /// Get the current engine status
    GetStatus,

    /// Query terminated sessions by inclusive started_at range
    GetHistory {
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Started(Session),
    Stopped(Session),
    Status(StatusSnapshot),
    // Struct variant: an internally tagged enum cannot carry a bare sequence
    History { sessions: Vec<Session> },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by the IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = Request::new(
            1,
            Command::Start {
                duration_minutes: 25,
                label: "write spec".into(),
                origin: Origin::Human,
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(
            parsed.command,
            Command::Start { duration_minutes: 25, .. }
        ));
    }

    #[test]
    fn response_serialization() {
        let resp = Response::success(7, ResponsePayload::Status(StatusSnapshot::idle()));

        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 7);
        assert!(matches!(
            parsed.result,
            ResponseResult::Ok(ResponsePayload::Status(_))
        ));
    }

    #[test]
    fn error_response_serialization() {
        let resp = Response::error(
            2,
            ErrorInfo::new(ErrorCode::AlreadyRunning, "A timer is already running"),
        );

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("already_running"));
    }

    #[test]
    fn history_response_round_trips() {
        use crate::SessionStatus;
        use timebox_util::SessionId;

        let session = Session {
            id: SessionId::new(),
            label: "done".into(),
            duration_secs: 300,
            started_at: timebox_util::now(),
            ended_at: Some(timebox_util::now()),
            origin: Origin::Agent,
            status: SessionStatus::Completed,
        };
        let resp = Response::success(
            4,
            ResponsePayload::History {
                sessions: vec![session],
            },
        );

        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();
        match parsed.result {
            ResponseResult::Ok(ResponsePayload::History { sessions }) => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].label, "done");
            }
            other => panic!("expected History, got {:?}", other),
        }
    }

    #[test]
    fn history_command_accepts_open_range() {
        let req = Request::new(
            3,
            Command::GetHistory {
                start_date: None,
                end_date: None,
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed.command,
            Command::GetHistory { start_date: None, end_date: None }
        ));
    }
}
