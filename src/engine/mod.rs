mod countdown;
pub(crate) mod gateway;
#[cfg(test)]
pub(crate) mod mock;
mod poll;
mod ticker;

pub use gateway::{HttpGateway, RaceGateway};

use crate::error::{LifecycleResult, Operation, RaceError};
use crate::leaderboard;
use crate::model::{InfoEvent, Phase, RaceEvent, RaceResult, RunConfig};
use crate::store::{self, SharedStore};
use poll::{PollParams, PollRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Drives one race from creation to the final standings.
pub struct RaceEngine<G: ?Sized> {
    cfg: RunConfig,
    polls: PollRegistry,
    gateway: Arc<G>,
}

impl<G> RaceEngine<G>
where
    G: RaceGateway + ?Sized + 'static,
{
    pub fn new(cfg: RunConfig, gateway: Arc<G>) -> Self {
        Self {
            cfg,
            polls: PollRegistry::default(),
            gateway,
        }
    }

    /// Run the full lifecycle: create, count down, start, poll until finished.
    ///
    /// Each step starts only after the previous one settled, and the first failure aborts
    /// the rest. Nothing is rolled back on the server.
    pub async fn run(
        &self,
        store: &SharedStore,
        event_tx: &mpsc::UnboundedSender<RaceEvent>,
    ) -> LifecycleResult<RaceResult> {
        let res = self
            .run_steps(store, event_tx)
            .instrument(tracing::info_span!("race"))
            .await;
        if let Err(e) = &res {
            tracing::warn!(error = %e, "race lifecycle aborted");
        }
        res
    }

    async fn run_steps(
        &self,
        store: &SharedStore,
        event_tx: &mpsc::UnboundedSender<RaceEvent>,
    ) -> LifecycleResult<RaceResult> {
        let (racer_id, track_id, track_name, racer_name) = {
            let s = store::lock(store);
            let (racer_id, track_id) = s.ready()?;
            (
                racer_id,
                track_id,
                s.track().map(|t| t.name.clone()),
                s.racer().map(|r| r.name.clone()),
            )
        };

        let _ = event_tx.send(RaceEvent::PhaseStarted {
            phase: Phase::Creating,
        });
        store::lock(store).clear_race();
        let handle = self
            .gateway
            .create_race(racer_id, track_id)
            .await
            .map_err(|e| RaceError::remote(Operation::CreateRace, e))?;
        let race_id = handle.id;
        store::lock(store).set_race(race_id)?;
        tracing::info!(race = %race_id, track = %track_id, racer = %racer_id, "race created");
        let _ = event_tx.send(RaceEvent::RaceCreated { race_id });

        let _ = event_tx.send(RaceEvent::PhaseStarted {
            phase: Phase::Countdown,
        });
        countdown::run_countdown(self.cfg.countdown, event_tx).await;

        let _ = event_tx.send(RaceEvent::PhaseStarted {
            phase: Phase::Starting,
        });
        self.gateway
            .start_race(race_id)
            .await
            .map_err(|e| RaceError::remote(Operation::StartRace, e))?;
        tracing::info!(race = %race_id, "race started");

        let _ = event_tx.send(RaceEvent::PhaseStarted {
            phase: Phase::Racing,
        });
        let final_snapshot = {
            let mut claim = self.polls.claim(race_id);
            poll::poll_race(PollParams {
                gateway: self.gateway.as_ref(),
                race_id,
                interval: self.cfg.poll_interval,
                event_tx,
                cancel: claim.cancelled(),
            })
            .await?
        };

        let _ = event_tx.send(RaceEvent::PhaseStarted {
            phase: Phase::Finished,
        });
        let standings = leaderboard::rank(&final_snapshot.positions, Some(racer_id));
        tracing::info!(race = %race_id, racers = standings.len(), "race finished");

        Ok(RaceResult {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            base_url: self.cfg.base_url.clone(),
            race_id,
            track: track_name,
            racer: racer_name,
            standings,
        })
    }

    /// Fire-and-forget accelerate for the current race.
    ///
    /// Does nothing without a race id. Failures are logged and reported as info only;
    /// they never affect the lifecycle.
    pub fn accelerate(
        &self,
        store: &SharedStore,
        event_tx: Option<mpsc::UnboundedSender<RaceEvent>>,
    ) -> Option<JoinHandle<()>> {
        let Some(race_id) = store::lock(store).race_id() else {
            tracing::debug!("accelerate ignored: no active race");
            return None;
        };
        let gateway = self.gateway.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = gateway.accelerate(race_id).await {
                tracing::warn!(race = %race_id, error = %e, "accelerate failed");
                if let Some(tx) = event_tx {
                    let _ = tx.send(RaceEvent::Info(InfoEvent::AccelerateFailed {
                        race_id,
                        error: e.to_string(),
                    }));
                }
            }
        }))
    }
}
