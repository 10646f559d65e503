//! Race status polling.
//!
//! Queries the race at a fixed cadence and reports each observation until the race
//! finishes or a query fails. Queries for one race are strictly serialized: the next
//! tick is only awaited after the previous response has been handled. At most one loop
//! runs per race; claiming a race cancels the loop that held it before.

use crate::engine::gateway::RaceGateway;
use crate::engine::ticker::Ticker;
use crate::error::{LifecycleResult, Operation, RaceError};
use crate::model::{PollStopReason, RaceEvent, RaceId, RaceSnapshot, RaceStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Parameters for running a poll loop.
pub(crate) struct PollParams<'a, G: ?Sized> {
    pub gateway: &'a G,
    pub race_id: RaceId,
    pub interval: Duration,
    pub event_tx: &'a mpsc::UnboundedSender<RaceEvent>,
    /// Resolves when a newer poll for the same race takes over.
    pub cancel: &'a mut oneshot::Receiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    Polling,
    Stopped(PollStopReason),
}

struct PollLoop<'a> {
    race_id: RaceId,
    state: PollState,
    ticker: Ticker,
    event_tx: &'a mpsc::UnboundedSender<RaceEvent>,
}

impl PollLoop<'_> {
    /// Leave `Polling`. The ticker is cancelled and `PollStopped` reported exactly once,
    /// however many times this is reached.
    fn stop(&mut self, reason: PollStopReason) {
        if self.state != PollState::Polling {
            return;
        }
        self.state = PollState::Stopped(reason);
        if self.ticker.cancel() {
            tracing::debug!(race = %self.race_id, ?reason, "polling stopped");
            let _ = self.event_tx.send(RaceEvent::PollStopped {
                race_id: self.race_id,
                reason,
            });
        }
    }
}

/// Poll `race_id` until it finishes. Resolves with the terminal snapshot, fails with
/// `PollingAborted` on the first failed query, or with `PollSuperseded` once a newer poll
/// for the same race cancels this one. There is no retry.
pub(crate) async fn poll_race<G>(params: PollParams<'_, G>) -> LifecycleResult<RaceSnapshot>
where
    G: RaceGateway + ?Sized,
{
    let PollParams {
        gateway,
        race_id,
        interval,
        event_tx,
        cancel,
    } = params;

    let mut lp = PollLoop {
        race_id,
        state: PollState::Polling,
        ticker: Ticker::start("poll", interval),
        event_tx,
    };

    loop {
        // The ticker is only cancelled by stop(), which always returns right after.
        tokio::select! {
            _ = lp.ticker.tick() => {}
            _ = &mut *cancel => {
                lp.stop(PollStopReason::Superseded);
                return Err(RaceError::PollSuperseded(race_id));
            }
        }
        let snapshot = match gateway.get_race(race_id).await {
            Ok(s) => s,
            Err(e) => {
                lp.stop(PollStopReason::Errored);
                tracing::debug!(race = %race_id, error = %e, "race status query failed");
                return Err(RaceError::PollingAborted {
                    race_id,
                    source: Box::new(RaceError::remote(Operation::GetRace, e)),
                });
            }
        };

        match snapshot.status {
            RaceStatus::InProgress => {
                let _ = event_tx.send(RaceEvent::Leaderboard { snapshot });
            }
            RaceStatus::Finished => {
                lp.stop(PollStopReason::Finished);
                let _ = event_tx.send(RaceEvent::RaceFinished {
                    snapshot: snapshot.clone(),
                });
                return Ok(snapshot);
            }
            other => {
                tracing::debug!(race = %race_id, status = ?other, "race not running yet");
            }
        }
    }
}

struct ActivePoll {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct Active {
    next_generation: u64,
    polls: HashMap<RaceId, ActivePoll>,
}

/// Tracks the poll loop of each race, so a race is never polled twice at once.
#[derive(Clone, Default)]
pub(crate) struct PollRegistry {
    active: Arc<Mutex<Active>>,
}

/// Held for as long as a poll loop runs; releases the race on drop.
pub(crate) struct PollClaim {
    race_id: RaceId,
    generation: u64,
    cancelled: oneshot::Receiver<()>,
    active: Arc<Mutex<Active>>,
}

impl PollRegistry {
    /// Claim `race_id` for a new poll loop. An existing loop for the same race is
    /// cancelled first.
    pub(crate) fn claim(&self, race_id: RaceId) -> PollClaim {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.next_generation += 1;
        let generation = active.next_generation;
        let (cancel, cancelled) = oneshot::channel();
        if let Some(old) = active
            .polls
            .insert(race_id, ActivePoll { generation, cancel })
        {
            tracing::debug!(race = %race_id, "cancelling existing poll");
            let _ = old.cancel.send(());
        }
        PollClaim {
            race_id,
            generation,
            cancelled,
            active: self.active.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self, race_id: RaceId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .polls
            .contains_key(&race_id)
    }
}

impl PollClaim {
    pub(crate) fn cancelled(&mut self) -> &mut oneshot::Receiver<()> {
        &mut self.cancelled
    }
}

impl Drop for PollClaim {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        // A newer claim for the same race owns the entry now.
        if active
            .polls
            .get(&self.race_id)
            .is_some_and(|p| p.generation == self.generation)
        {
            active.polls.remove(&self.race_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{snapshot, MockCall, MockGateway};

    #[derive(Default, Debug)]
    struct Renders {
        leaderboard: usize,
        finished: usize,
        stopped: Vec<PollStopReason>,
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RaceEvent>) -> Renders {
        let mut r = Renders::default();
        while let Ok(ev) = rx.try_recv() {
            match ev {
                RaceEvent::Leaderboard { .. } => r.leaderboard += 1,
                RaceEvent::RaceFinished { .. } => r.finished += 1,
                RaceEvent::PollStopped { reason, .. } => r.stopped.push(reason),
                _ => {}
            }
        }
        r
    }

    fn gets(gw: &MockGateway) -> usize {
        gw.count(|c| matches!(c, MockCall::GetRace(_)))
    }

    async fn poll(gw: &MockGateway, tx: &mpsc::UnboundedSender<RaceEvent>) -> LifecycleResult<RaceSnapshot> {
        let registry = PollRegistry::default();
        let mut claim = registry.claim(RaceId(7));
        poll_race(PollParams {
            gateway: gw,
            race_id: RaceId(7),
            interval: Duration::from_millis(500),
            event_tx: tx,
            cancel: claim.cancelled(),
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn renders_progress_then_final_and_stops_once() {
        let gw = MockGateway::new().with_race(4);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let snap = poll(&gw, &tx).await.unwrap();
        assert_eq!(snap.status, RaceStatus::Finished);

        let r = drain(&mut rx);
        assert_eq!(r.leaderboard, 4);
        assert_eq!(r.finished, 1);
        assert_eq!(r.stopped, vec![PollStopReason::Finished]);
        assert_eq!(gets(&gw), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn no_queries_after_finish() {
        let gw = MockGateway::new().with_race(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        poll(&gw, &tx).await.unwrap();
        let after = gets(&gw);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gets(&gw), after);
    }

    #[tokio::test(start_paused = true)]
    async fn queries_follow_the_cadence() {
        let gw = MockGateway::new().with_race(2);
        let (tx, _rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        poll(&gw, &tx).await.unwrap();
        // first query one interval in, three queries total
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_query_aborts_without_retry() {
        let gw = MockGateway::new().with_statuses(vec![
            Some(snapshot(RaceStatus::InProgress)),
            None,
            Some(snapshot(RaceStatus::Finished)),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = poll(&gw, &tx).await.unwrap_err();
        assert!(matches!(err, RaceError::PollingAborted { race_id: RaceId(7), .. }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(gets(&gw), 2);

        let r = drain(&mut rx);
        assert_eq!(r.leaderboard, 1);
        assert_eq!(r.finished, 0);
        assert_eq!(r.stopped, vec![PollStopReason::Errored]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_and_pending_statuses_keep_polling() {
        let gw = MockGateway::new().with_statuses(vec![
            Some(snapshot(RaceStatus::Pending)),
            Some(snapshot(RaceStatus::Unknown)),
            Some(snapshot(RaceStatus::Finished)),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        poll(&gw, &tx).await.unwrap();
        let r = drain(&mut rx);
        assert_eq!(r.leaderboard, 0);
        assert_eq!(r.finished, 1);
        assert_eq!(gets(&gw), 3);
    }

    #[test]
    fn stale_claim_does_not_release_newer_one() {
        let reg = PollRegistry::default();
        let mut first = reg.claim(RaceId(1));
        let second = reg.claim(RaceId(1));
        assert!(first.cancelled().try_recv().is_ok());
        let _other = reg.claim(RaceId(2));

        drop(first);
        assert!(reg.is_active(RaceId(1)));
        drop(second);
        assert!(!reg.is_active(RaceId(1)));
        assert!(reg.is_active(RaceId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn second_claim_stops_first_loop() {
        // Never finishes on its own.
        let gw = Arc::new(MockGateway::new().with_statuses(vec![]));
        let reg = PollRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut first = reg.claim(RaceId(7));
        let (gw1, tx1) = (gw.clone(), tx.clone());
        let handle = tokio::spawn(async move {
            poll_race(PollParams {
                gateway: gw1.as_ref(),
                race_id: RaceId(7),
                interval: Duration::from_millis(500),
                event_tx: &tx1,
                cancel: first.cancelled(),
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(1250)).await;
        assert_eq!(gets(&gw), 2);

        let _second = reg.claim(RaceId(7));
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, RaceError::PollSuperseded(RaceId(7))));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gets(&gw), 2);
        assert_eq!(drain(&mut rx).stopped, vec![PollStopReason::Superseded]);
    }
}
