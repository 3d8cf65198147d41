//! Lifecycle events emitted by the timer engine

use timebox_api::Session;

/// Events published on the engine's event bus.
///
/// Every variant carries an immutable snapshot of the session it concerns;
/// subscribers never share mutable state with the engine.
#[derive(Debug, Clone)]
pub enum TimerEvent {
    /// A session was created and is now running
    Started { session: Session },

    /// Once-per-second countdown update while running
    Tick { remaining_secs: u64, session: Session },

    /// The session ran its full planned duration
    Completed { session: Session },

    /// The session was stopped before its deadline
    Stopped { session: Session },
}

impl TimerEvent {
    /// The session snapshot this event carries.
    pub fn session(&self) -> &Session {
        match self {
            TimerEvent::Started { session }
            | TimerEvent::Tick { session, .. }
            | TimerEvent::Completed { session }
            | TimerEvent::Stopped { session } => session,
        }
    }

    /// Whether this is the (single) terminal event of a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TimerEvent::Completed { .. } | TimerEvent::Stopped { .. })
    }
}
