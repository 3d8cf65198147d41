//! Active session tracking

use std::time::Duration;
use timebox_api::Session;
use timebox_util::MonotonicInstant;

/// The one session currently occupying the engine's active slot.
///
/// Pairs the wire-visible `Session` snapshot with the monotonic instants
/// used for enforcement, so a wall-clock adjustment mid-session cannot
/// move the deadline.
#[derive(Debug)]
pub struct ActiveSession {
    /// Session snapshot (status stays `Running` while held here)
    pub session: Session,

    /// Monotonic start time (for enforcement)
    pub started_mono: MonotonicInstant,

    /// Monotonic deadline (for enforcement)
    pub deadline_mono: MonotonicInstant,
}

impl ActiveSession {
    pub fn new(session: Session, now_mono: MonotonicInstant) -> Self {
        let deadline_mono = now_mono + session.duration();
        Self {
            session,
            started_mono: now_mono,
            deadline_mono,
        }
    }

    /// Time remaining until the deadline, zero once passed.
    pub fn remaining(&self, now_mono: MonotonicInstant) -> Duration {
        self.deadline_mono.saturating_duration_until(now_mono)
    }

    /// Remaining whole seconds, rounded up so a fresh session reports its
    /// full duration rather than duration minus a fractional second.
    pub fn remaining_secs(&self, now_mono: MonotonicInstant) -> u64 {
        let remaining = self.remaining(now_mono);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    /// Check if the session has reached its deadline
    pub fn is_expired(&self, now_mono: MonotonicInstant) -> bool {
        now_mono >= self.deadline_mono
    }

    /// Elapsed time since start
    pub fn elapsed(&self, now_mono: MonotonicInstant) -> Duration {
        now_mono.duration_since(self.started_mono)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebox_api::{Origin, SessionStatus};
    use timebox_util::SessionId;

    fn make_session(duration_secs: u64) -> Session {
        Session {
            id: SessionId::new(),
            label: "Test".into(),
            duration_secs,
            started_at: timebox_util::now(),
            ended_at: None,
            origin: Origin::Human,
            status: SessionStatus::Running,
        }
    }

    #[test]
    fn test_session_creation() {
        let now_mono = MonotonicInstant::now();
        let active = ActiveSession::new(make_session(300), now_mono);

        assert_eq!(active.remaining(now_mono), Duration::from_secs(300));
        assert_eq!(active.remaining_secs(now_mono), 300);
        assert!(!active.is_expired(now_mono));
    }

    #[test]
    fn test_remaining_counts_down() {
        let now_mono = MonotonicInstant::now();
        let active = ActiveSession::new(make_session(300), now_mono);

        let later = now_mono + Duration::from_secs(100);
        assert_eq!(active.remaining(later), Duration::from_secs(200));
        assert_eq!(active.elapsed(later), Duration::from_secs(100));
    }

    #[test]
    fn test_remaining_secs_rounds_up() {
        let now_mono = MonotonicInstant::now();
        let active = ActiveSession::new(make_session(300), now_mono);

        let just_after = now_mono + Duration::from_millis(400);
        assert_eq!(active.remaining_secs(just_after), 300);

        let mid_second = now_mono + Duration::from_millis(1500);
        assert_eq!(active.remaining_secs(mid_second), 299);
    }

    #[test]
    fn test_expiry() {
        let now_mono = MonotonicInstant::now();
        let active = ActiveSession::new(make_session(60), now_mono);

        assert!(!active.is_expired(now_mono + Duration::from_secs(59)));
        assert!(active.is_expired(now_mono + Duration::from_secs(60)));
        assert!(active.is_expired(now_mono + Duration::from_secs(61)));
        assert_eq!(active.remaining(now_mono + Duration::from_secs(61)), Duration::ZERO);
    }
}
