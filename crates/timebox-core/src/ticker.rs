//! The 1-second pulse driving a running session
//!
//! Armed on start, disarmed on any termination. The ticker never counts
//! time itself: each firing hands the engine a fresh monotonic instant, so
//! missed or delayed ticks self-correct on the next one.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use timebox_util::{MonotonicInstant, SessionId};
use tracing::debug;

use crate::{TickOutcome, TimerEngine};

/// Tick period for countdown updates
pub(crate) const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Handle to an armed ticker task; disarming cancels the loop.
#[derive(Debug)]
pub(crate) struct TickerHandle {
    cancel: Option<oneshot::Sender<()>>,
}

impl TickerHandle {
    /// Cancel the tick loop. Safe to call after the loop already exited.
    pub(crate) fn disarm(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Spawn the tick loop for one session.
///
/// The loop exits when the engine reports the session finished, when the
/// handle is disarmed, or when the session id no longer matches the active
/// slot (a stale loop must never drive a successor session).
pub(crate) fn arm(engine: TimerEngine, session_id: SessionId) -> TickerHandle {
    let (cancel_tx, mut cancel_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = engine.on_tick(&session_id, MonotonicInstant::now()).await;
                    if outcome == TickOutcome::Finished {
                        break;
                    }
                }
                _ = &mut cancel_rx => {
                    break;
                }
            }
        }

        debug!(session_id = %session_id, "Ticker disarmed");
    });

    TickerHandle { cancel: Some(cancel_tx) }
}
