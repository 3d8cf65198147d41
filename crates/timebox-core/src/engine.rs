//! The timer engine: single-slot session authority
//!
//! All mutating operations (`start`, `stop`, the completion branch of
//! `on_tick`) run under one write gate, so a human stop, an agent start,
//! and a tick-driven completion can never interleave. Status reads go
//! through a separate snapshot lock that is never held across store I/O,
//! so a slow disk cannot freeze `status()`.

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use timebox_api::{Origin, Session, SessionStatus, StatusSnapshot};
use timebox_store::{SessionStore, StoreError};
use timebox_util::{MonotonicInstant, SessionId};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{ActiveSession, EventBus, EventSubscription, TimerEvent, ticker};

/// Label length bounds, counted in characters
const LABEL_MAX_CHARS: usize = 64;

/// Duration bounds in minutes
const DURATION_MINUTES: std::ops::RangeInclusive<u32> = 1..=1440;

/// Errors from engine operations
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("A timer is already running")]
    AlreadyRunning,

    #[error("No timer is running")]
    NoActiveSession,

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Invalid duration: must be between 1 and 1440 minutes")]
    InvalidDuration,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What the tick loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session still running, keep ticking
    Continue,
    /// Session terminated (or superseded), the loop must exit
    Finished,
}

/// The engine's single mutable slot plus the ticker driving it.
#[derive(Default)]
struct EngineState {
    active: Option<ActiveSession>,
    ticker: Option<ticker::TickerHandle>,
}

struct Shared {
    /// Readable snapshot; locked only for short sync sections
    state: RwLock<EngineState>,
    /// Serializes mutations, held across the mutation's store write
    write_gate: Mutex<()>,
    store: Arc<dyn SessionStore>,
    bus: EventBus,
}

/// The timer engine. Cheap to clone; all clones share one state slot.
#[derive(Clone)]
pub struct TimerEngine {
    shared: Arc<Shared>,
}

impl TimerEngine {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(EngineState::default()),
                write_gate: Mutex::new(()),
                store,
                bus: EventBus::new(),
            }),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> EventSubscription {
        self.shared.bus.subscribe()
    }

    fn validate_label(label: &str) -> Result<String, TimerError> {
        let trimmed = label.trim().to_string();
        if trimmed.is_empty() {
            return Err(TimerError::InvalidLabel("label cannot be empty".into()));
        }
        if trimmed.chars().count() > LABEL_MAX_CHARS {
            return Err(TimerError::InvalidLabel(
                "label must be 64 characters or fewer".into(),
            ));
        }
        if trimmed.chars().any(|c| c.is_control()) {
            return Err(TimerError::InvalidLabel(
                "label cannot contain control characters".into(),
            ));
        }
        Ok(trimmed)
    }

    fn validate_duration(minutes: u32) -> Result<u64, TimerError> {
        if !DURATION_MINUTES.contains(&minutes) {
            return Err(TimerError::InvalidDuration);
        }
        Ok(minutes as u64 * 60)
    }

    /// Start a new session.
    ///
    /// Validation happens before any effect. The store insert happens
    /// before the in-memory transition, so a failed insert leaves the
    /// engine observably idle with nothing to roll back.
    pub async fn start(
        &self,
        duration_minutes: u32,
        label: &str,
        origin: Origin,
        now: DateTime<Utc>,
        now_mono: MonotonicInstant,
    ) -> Result<Session, TimerError> {
        let label = Self::validate_label(label)?;
        let duration_secs = Self::validate_duration(duration_minutes)?;

        let _gate = self.shared.write_gate.lock().await;

        if self.shared.state.read().unwrap().active.is_some() {
            return Err(TimerError::AlreadyRunning);
        }

        let session = Session {
            id: SessionId::new(),
            label,
            duration_secs,
            started_at: now,
            ended_at: None,
            origin,
            status: SessionStatus::Running,
        };

        if let Err(e) = self.shared.store.insert(&session) {
            error!(
                session_id = %session.id,
                error = %e,
                "Failed to persist session start, remaining idle"
            );
            return Err(e.into());
        }

        let ticker = ticker::arm(self.clone(), session.id.clone());
        {
            let mut state = self.shared.state.write().unwrap();
            state.active = Some(ActiveSession::new(session.clone(), now_mono));
            state.ticker = Some(ticker);
        }

        self.shared.bus.publish(TimerEvent::Started {
            session: session.clone(),
        });

        info!(
            session_id = %session.id,
            label = %session.label,
            duration_secs,
            origin = %origin,
            "Session started"
        );

        Ok(session)
    }

    /// Stop the current session.
    ///
    /// If the deadline has already passed the session terminates as
    /// Completed, not Stopped: completion takes precedence over a stop
    /// that lands in the same tick window.
    pub async fn stop(
        &self,
        now: DateTime<Utc>,
        now_mono: MonotonicInstant,
    ) -> Result<Session, TimerError> {
        let _gate = self.shared.write_gate.lock().await;

        let (active, ticker) = {
            let mut state = self.shared.state.write().unwrap();
            match state.active.take() {
                Some(active) => (active, state.ticker.take()),
                None => return Err(TimerError::NoActiveSession),
            }
        };

        if let Some(ticker) = ticker {
            ticker.disarm();
        }

        if active.is_expired(now_mono) {
            debug!(session_id = %active.session.id, "Stop raced completion, completing");
            return self.finish(active, SessionStatus::Completed, None);
        }

        self.finish(active, SessionStatus::Stopped, Some(now))
    }

    /// Snapshot of the current state. Never fails, never blocks on I/O,
    /// and may run concurrently with other reads.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.shared.state.read().unwrap();
        match &state.active {
            Some(active) => StatusSnapshot {
                session: Some(active.session.clone()),
                remaining_secs: active.remaining_secs(MonotonicInstant::now()),
                is_running: true,
            },
            None => StatusSnapshot::idle(),
        }
    }

    /// Advance the session driven by the armed ticker.
    ///
    /// `for_session` guards against a stale tick loop driving a successor
    /// session: a mismatch ends the loop without touching state.
    pub async fn on_tick(
        &self,
        for_session: &SessionId,
        now_mono: MonotonicInstant,
    ) -> TickOutcome {
        let _gate = self.shared.write_gate.lock().await;

        let snapshot = {
            let state = self.shared.state.read().unwrap();
            match &state.active {
                Some(active) if active.session.id == *for_session => Some((
                    active.is_expired(now_mono),
                    active.remaining_secs(now_mono),
                    active.session.clone(),
                )),
                _ => None,
            }
        };

        let Some((expired, remaining_secs, session)) = snapshot else {
            return TickOutcome::Finished;
        };

        if !expired {
            self.shared.bus.publish(TimerEvent::Tick {
                remaining_secs,
                session,
            });
            return TickOutcome::Continue;
        }

        let (active, ticker) = {
            let mut state = self.shared.state.write().unwrap();
            match state.active.take() {
                Some(active) => (active, state.ticker.take()),
                None => return TickOutcome::Finished,
            }
        };

        if let Some(ticker) = ticker {
            ticker.disarm();
        }

        if let Err(e) = self.finish(active, SessionStatus::Completed, None) {
            // Already logged in finish(); completion has no caller to
            // propagate to, the tick loop just winds down.
            debug!(error = %e, "Completion persisted with error");
        }

        TickOutcome::Finished
    }

    /// Terminate a session taken out of the active slot.
    ///
    /// Completed sessions end exactly at `started_at + duration`; stopped
    /// sessions end at the supplied wall-clock time, clamped to the
    /// deadline. The store update failing does not undo the transition:
    /// the single-active-timer invariant outranks history consistency.
    fn finish(
        &self,
        active: ActiveSession,
        status: SessionStatus,
        stopped_at: Option<DateTime<Utc>>,
    ) -> Result<Session, TimerError> {
        let mut session = active.session;
        let ended_at = match (status, stopped_at) {
            (SessionStatus::Completed, _) => session.deadline(),
            (_, Some(now)) => now.min(session.deadline()),
            (_, None) => session.deadline(),
        };
        session.status = status;
        session.ended_at = Some(ended_at);

        let store_result = self
            .shared
            .store
            .update_terminal(&session.id, status, ended_at);

        let event = match status {
            SessionStatus::Completed => TimerEvent::Completed {
                session: session.clone(),
            },
            _ => TimerEvent::Stopped {
                session: session.clone(),
            },
        };
        self.shared.bus.publish(event);

        match store_result {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    status = %status,
                    "Session ended"
                );
                Ok(session)
            }
            Err(e) => {
                error!(
                    session_id = %session.id,
                    status = %status,
                    error = %e,
                    "Session ended but terminal store update failed"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use timebox_store::{SqliteStore, StoreResult};

    fn test_engine() -> (TimerEngine, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        (TimerEngine::new(store.clone()), store)
    }

    async fn start_default(engine: &TimerEngine, minutes: u32, label: &str) -> Session {
        engine
            .start(minutes, label, Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await
            .unwrap()
    }

    /// Store wrapper whose writes can be made to fail on demand.
    struct FlakyStore {
        inner: SqliteStore,
        fail_inserts: AtomicBool,
        fail_updates: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::in_memory().unwrap(),
                fail_inserts: AtomicBool::new(false),
                fail_updates: AtomicBool::new(false),
            }
        }
    }

    impl SessionStore for FlakyStore {
        fn insert(&self, session: &Session) -> StoreResult<()> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(StoreError::Database("disk full".into()));
            }
            self.inner.insert(session)
        }

        fn update_terminal(
            &self,
            id: &SessionId,
            status: SessionStatus,
            ended_at: DateTime<Utc>,
        ) -> StoreResult<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Database("disk full".into()));
            }
            self.inner.update_terminal(id, status, ended_at)
        }

        fn query(
            &self,
            start_date: Option<DateTime<Utc>>,
            end_date: Option<DateTime<Utc>>,
        ) -> StoreResult<Vec<Session>> {
            self.inner.query(start_date, end_date)
        }

        fn cleanup_stale_running(&self) -> StoreResult<usize> {
            self.inner.cleanup_stale_running()
        }

        fn is_healthy(&self) -> bool {
            self.inner.is_healthy()
        }
    }

    #[tokio::test]
    async fn test_start_timer() {
        let (engine, _) = test_engine();
        let session = start_default(&engine, 25, "Work session").await;

        assert_eq!(session.label, "Work session");
        assert_eq!(session.duration_secs, 25 * 60);
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.origin, Origin::Human);
        assert!(session.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_start_writes_through_to_store() {
        let (engine, store) = test_engine();
        let session = start_default(&engine, 25, "Work").await;

        let history = store.query(None, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, session.id);
        assert_eq!(history[0].status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_double_start() {
        let (engine, _) = test_engine();
        let first = start_default(&engine, 25, "First").await;

        let result = engine
            .start(25, "Second", Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::AlreadyRunning));

        // The existing session is untouched
        let status = engine.status();
        assert_eq!(status.session.unwrap().id, first.id);
        assert_eq!(status.remaining_secs, 25 * 60);
    }

    #[tokio::test]
    async fn test_stop_timer() {
        let (engine, store) = test_engine();
        start_default(&engine, 25, "Work").await;

        let session = engine
            .stop(timebox_util::now(), MonotonicInstant::now())
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Stopped);
        assert!(session.ended_at.is_some());
        assert!(session.ended_at.unwrap() <= session.deadline());

        let status = engine.status();
        assert!(!status.is_running);
        assert_eq!(status.remaining_secs, 0);

        let history = store.query(None, None).unwrap();
        assert_eq!(history[0].status, SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let (engine, _) = test_engine();
        let result = engine.stop(timebox_util::now(), MonotonicInstant::now()).await;
        assert!(matches!(result.unwrap_err(), TimerError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_label_validation_empty() {
        let (engine, _) = test_engine();
        let result = engine
            .start(25, "", Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::InvalidLabel(_)));
    }

    #[tokio::test]
    async fn test_label_validation_whitespace_only() {
        let (engine, _) = test_engine();
        let result = engine
            .start(25, "   ", Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::InvalidLabel(_)));
    }

    #[tokio::test]
    async fn test_label_validation_too_long() {
        let (engine, _) = test_engine();
        let long_label = "a".repeat(65);
        let result = engine
            .start(25, &long_label, Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::InvalidLabel(_)));
    }

    #[tokio::test]
    async fn test_label_length_counts_characters() {
        let (engine, _) = test_engine();
        // 64 two-byte characters are within bounds
        let label = "é".repeat(64);
        let session = engine
            .start(25, &label, Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await
            .unwrap();
        assert_eq!(session.label.chars().count(), 64);
    }

    #[tokio::test]
    async fn test_label_validation_control_chars() {
        let (engine, _) = test_engine();
        let result = engine
            .start(25, "test\x00label", Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::InvalidLabel(_)));
    }

    #[tokio::test]
    async fn test_label_trimmed() {
        let (engine, _) = test_engine();
        let session = start_default(&engine, 25, "  Work  ").await;
        assert_eq!(session.label, "Work");
    }

    #[tokio::test]
    async fn test_duration_validation() {
        let (engine, _) = test_engine();

        let result = engine
            .start(0, "Work", Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::InvalidDuration));

        let result = engine
            .start(1441, "Work", Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::InvalidDuration));

        // Validation precedes the running check: nothing was started
        assert!(!engine.status().is_running);
    }

    #[tokio::test]
    async fn test_get_status_idle() {
        let (engine, _) = test_engine();
        let status = engine.status();
        assert!(!status.is_running);
        assert!(status.session.is_none());
        assert_eq!(status.remaining_secs, 0);
    }

    #[tokio::test]
    async fn test_get_status_running() {
        let (engine, _) = test_engine();
        start_default(&engine, 25, "Work").await;

        let status = engine.status();
        assert!(status.is_running);
        assert!(status.session.is_some());
        assert_eq!(status.remaining_secs, 25 * 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_on_start_and_stop() {
        let (engine, _) = test_engine();
        let mut sub = engine.subscribe();

        start_default(&engine, 25, "Work").await;
        assert!(matches!(sub.recv().await.unwrap(), TimerEvent::Started { .. }));

        engine.stop(timebox_util::now(), MonotonicInstant::now()).await.unwrap();
        let event = sub.recv().await.unwrap();
        match event {
            TimerEvent::Stopped { session } => {
                assert_eq!(session.status, SessionStatus::Stopped)
            }
            other => panic!("expected Stopped, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_publishes_remaining() {
        let (engine, _) = test_engine();
        let mut sub = engine.subscribe();

        let now_mono = MonotonicInstant::now();
        let session = engine
            .start(25, "Work", Origin::Human, timebox_util::now(), now_mono)
            .await
            .unwrap();
        let _ = sub.recv().await.unwrap(); // Started

        let outcome = engine.on_tick(&session.id, now_mono + Duration::from_secs(1)).await;
        assert_eq!(outcome, TickOutcome::Continue);

        match sub.recv().await.unwrap() {
            TimerEvent::Tick { remaining_secs, session: snap } => {
                assert_eq!(remaining_secs, 1499);
                assert_eq!(snap.id, session.id);
                assert_eq!(snap.status, SessionStatus::Running);
            }
            other => panic!("expected Tick, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_completion() {
        let (engine, store) = test_engine();
        let mut sub = engine.subscribe();

        let now_mono = MonotonicInstant::now();
        let session = engine
            .start(1, "Quick", Origin::Human, timebox_util::now(), now_mono)
            .await
            .unwrap();
        let _ = sub.recv().await.unwrap(); // Started

        let outcome = engine.on_tick(&session.id, now_mono + Duration::from_secs(60)).await;
        assert_eq!(outcome, TickOutcome::Finished);

        match sub.recv().await.unwrap() {
            TimerEvent::Completed { session: done } => {
                assert_eq!(done.status, SessionStatus::Completed);
                assert_eq!(done.ended_at, Some(done.deadline()));
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        assert!(!engine.status().is_running);
        let history = store.query(None, None).unwrap();
        assert_eq!(history[0].status, SessionStatus::Completed);

        // A late tick for the finished session does nothing
        let outcome = engine.on_tick(&session.id, now_mono + Duration::from_secs(61)).await;
        assert_eq!(outcome, TickOutcome::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_does_not_drive_successor() {
        let (engine, _) = test_engine();

        let first = start_default(&engine, 25, "First").await;
        engine.stop(timebox_util::now(), MonotonicInstant::now()).await.unwrap();

        let now_mono = MonotonicInstant::now();
        let second = engine
            .start(25, "Second", Origin::Human, timebox_util::now(), now_mono)
            .await
            .unwrap();

        let mut sub = engine.subscribe();

        // A tick addressed to the stopped session must not touch the new one
        let outcome = engine.on_tick(&first.id, now_mono + Duration::from_secs(1)).await;
        assert_eq!(outcome, TickOutcome::Finished);

        let outcome = engine.on_tick(&second.id, now_mono + Duration::from_secs(1)).await;
        assert_eq!(outcome, TickOutcome::Continue);
        match sub.recv().await.unwrap() {
            TimerEvent::Tick { session, .. } => assert_eq!(session.id, second.id),
            other => panic!("expected Tick, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_deadline_completes() {
        let (engine, store) = test_engine();
        let mut sub = engine.subscribe();

        let now_mono = MonotonicInstant::now();
        let session = engine
            .start(1, "Race", Origin::Human, timebox_util::now(), now_mono)
            .await
            .unwrap();
        let _ = sub.recv().await.unwrap(); // Started

        // Stop lands after the deadline: completion wins
        let stopped = engine
            .stop(timebox_util::now(), now_mono + Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(stopped.status, SessionStatus::Completed);
        assert_eq!(stopped.ended_at, Some(session.deadline()));

        // Exactly one terminal event, and it is Completed
        match sub.recv().await.unwrap() {
            TimerEvent::Completed { .. } => {}
            other => panic!("expected Completed, got {:?}", other),
        }

        let history = store.query(None, None).unwrap();
        assert_eq!(history[0].status, SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rolls_back_on_store_failure() {
        let store = Arc::new(FlakyStore::new());
        let engine = TimerEngine::new(store.clone());
        let mut sub = engine.subscribe();

        store.fail_inserts.store(true, Ordering::SeqCst);
        let result = engine
            .start(25, "Doomed", Origin::Human, timebox_util::now(), MonotonicInstant::now())
            .await;
        assert!(matches!(result.unwrap_err(), TimerError::Store(_)));

        // Nothing running, nothing published, nothing persisted
        assert!(!engine.status().is_running);
        assert!(store.query(None, None).unwrap().is_empty());

        // The engine recovers once the store does
        store.fail_inserts.store(false, Ordering::SeqCst);
        let session = start_default(&engine, 25, "Recovered").await;
        assert_eq!(session.label, "Recovered");
        assert!(matches!(sub.recv().await.unwrap(), TimerEvent::Started { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_transitions_despite_store_failure() {
        let store = Arc::new(FlakyStore::new());
        let engine = TimerEngine::new(store.clone());

        start_default(&engine, 25, "Work").await;
        let mut sub = engine.subscribe();

        store.fail_updates.store(true, Ordering::SeqCst);
        let result = engine.stop(timebox_util::now(), MonotonicInstant::now()).await;
        assert!(matches!(result.unwrap_err(), TimerError::Store(_)));

        // The in-memory transition still happened and the event was published
        assert!(!engine.status().is_running);
        assert!(matches!(sub.recv().await.unwrap(), TimerEvent::Stopped { .. }));

        // A fresh start is possible
        store.fail_updates.store(false, Ordering::SeqCst);
        start_default(&engine, 5, "Next").await;
        assert!(engine.status().is_running);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (engine, _) = test_engine();
        start_default(&engine, 25, "First").await;
        engine.stop(timebox_util::now(), MonotonicInstant::now()).await.unwrap();

        let session = engine
            .start(15, "Second", Origin::Agent, timebox_util::now(), MonotonicInstant::now())
            .await
            .unwrap();
        assert_eq!(session.label, "Second");
        assert_eq!(session.origin, Origin::Agent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_emits_every_tick_then_completes() {
        let (engine, store) = test_engine();
        let mut sub = engine.subscribe();

        let now_mono = MonotonicInstant::now();
        let session = engine
            .start(25, "write spec", Origin::Human, timebox_util::now(), now_mono)
            .await
            .unwrap();
        assert_eq!(engine.status().remaining_secs, 1500);
        let _ = sub.recv().await.unwrap(); // Started

        for i in 1..1500u64 {
            let outcome = engine
                .on_tick(&session.id, now_mono + Duration::from_secs(i))
                .await;
            assert_eq!(outcome, TickOutcome::Continue);
            match sub.recv().await.unwrap() {
                TimerEvent::Tick { remaining_secs, .. } => {
                    assert_eq!(remaining_secs, 1500 - i)
                }
                other => panic!("expected Tick, got {:?}", other),
            }
        }

        let outcome = engine
            .on_tick(&session.id, now_mono + Duration::from_secs(1500))
            .await;
        assert_eq!(outcome, TickOutcome::Finished);

        match sub.recv().await.unwrap() {
            TimerEvent::Completed { session: done } => {
                assert_eq!(done.ended_at, Some(session.deadline()));
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        let history = store.query(None, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SessionStatus::Completed);
        assert_eq!(history[0].ended_at, Some(session.deadline()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_subscribers_see_identical_sequences() {
        let (engine, _) = test_engine();
        let mut eager = engine.subscribe();
        let mut lazy = engine.subscribe();

        let now_mono = MonotonicInstant::now();
        let session = engine
            .start(1, "Pair", Origin::Human, timebox_util::now(), now_mono)
            .await
            .unwrap();

        for i in 1..=3u64 {
            engine
                .on_tick(&session.id, now_mono + Duration::from_secs(i))
                .await;
        }
        engine
            .on_tick(&session.id, now_mono + Duration::from_secs(60))
            .await;

        // One subscriber drains promptly, the other only after the session
        // ended. Both must observe the same sequence.
        let mut seen_eager = Vec::new();
        for _ in 0..5 {
            seen_eager.push(label_of(eager.recv().await.unwrap()));
        }
        let mut seen_lazy = Vec::new();
        for _ in 0..5 {
            seen_lazy.push(label_of(lazy.recv().await.unwrap()));
        }

        assert_eq!(seen_eager, vec!["started", "tick:59", "tick:58", "tick:57", "completed"]);
        assert_eq!(seen_eager, seen_lazy);
    }

    fn label_of(event: TimerEvent) -> String {
        match event {
            TimerEvent::Started { .. } => "started".into(),
            TimerEvent::Tick { remaining_secs, .. } => format!("tick:{}", remaining_secs),
            TimerEvent::Completed { .. } => "completed".into(),
            TimerEvent::Stopped { .. } => "stopped".into(),
        }
    }

    #[tokio::test]
    async fn test_agent_origin() {
        let (engine, store) = test_engine();
        let session = engine
            .start(25, "AI Task", Origin::Agent, timebox_util::now(), MonotonicInstant::now())
            .await
            .unwrap();
        assert_eq!(session.origin, Origin::Agent);

        let history = store.query(None, None).unwrap();
        assert_eq!(history[0].origin, Origin::Agent);
    }
}
