//! Call-logging mock gateway for tests.

use crate::engine::gateway::{GatewayResult, RaceGateway};
use crate::error::GatewayError;
use crate::model::{
    CountdownConfig, RaceHandle, RaceId, RaceSnapshot, RaceStatus, Racer, RacerId,
    RacerPosition, RunConfig, Track, TrackId,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListTracks,
    ListRacers,
    CreateRace { racer: RacerId, track: TrackId },
    StartRace(RaceId),
    GetRace(RaceId),
    Accelerate(RaceId),
}

#[derive(Default)]
struct MockResponses {
    create_fails: bool,
    start_fails: bool,
    accelerate_fails: bool,
    race_id: u64,
    /// Scripted status replies, consumed in order. `None` entries fail the query.
    statuses: VecDeque<Option<RaceSnapshot>>,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    responses: Arc<Mutex<MockResponses>>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

/// Run configuration with the game's default cadence.
pub fn config() -> RunConfig {
    RunConfig {
        base_url: "http://localhost:3001".into(),
        user_agent: "race-client/test".into(),
        request_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(500),
        countdown: CountdownConfig::default(),
        auto_accelerate: None,
    }
}

pub fn failure() -> GatewayError {
    GatewayError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "boom".into(),
    }
}

pub fn position(id: u64, segment: u32) -> RacerPosition {
    RacerPosition {
        id: RacerId(id),
        driver_name: format!("Racer {id}"),
        segment,
        speed: None,
        final_position: None,
    }
}

pub fn snapshot(status: RaceStatus) -> RaceSnapshot {
    RaceSnapshot {
        status,
        positions: vec![position(1, 5), position(2, 9)],
    }
}

impl MockGateway {
    pub fn new() -> Self {
        let gw = Self::default();
        gw.responses.lock().unwrap().race_id = 1;
        gw
    }

    pub fn with_race_id(self, id: u64) -> Self {
        self.responses.lock().unwrap().race_id = id;
        self
    }

    pub fn with_create_failure(self) -> Self {
        self.responses.lock().unwrap().create_fails = true;
        self
    }

    pub fn with_start_failure(self) -> Self {
        self.responses.lock().unwrap().start_fails = true;
        self
    }

    pub fn with_accelerate_failure(self) -> Self {
        self.responses.lock().unwrap().accelerate_fails = true;
        self
    }

    /// `in_progress` non-terminal replies followed by one `Finished`.
    pub fn with_race(self, in_progress: usize) -> Self {
        {
            let mut r = self.responses.lock().unwrap();
            for _ in 0..in_progress {
                r.statuses.push_back(Some(snapshot(RaceStatus::InProgress)));
            }
            r.statuses.push_back(Some(snapshot(RaceStatus::Finished)));
        }
        self
    }

    pub fn with_statuses(self, statuses: Vec<Option<RaceSnapshot>>) -> Self {
        self.responses.lock().unwrap().statuses = statuses.into();
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.call_log.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn log(&self, call: MockCall) {
        self.call_log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RaceGateway for MockGateway {
    async fn list_tracks(&self) -> GatewayResult<Vec<Track>> {
        self.log(MockCall::ListTracks);
        Ok(vec![Track {
            id: TrackId(1),
            name: "Track 1".into(),
            segments: vec![],
        }])
    }

    async fn list_racers(&self) -> GatewayResult<Vec<Racer>> {
        self.log(MockCall::ListRacers);
        Ok(vec![Racer {
            id: RacerId(1),
            driver_name: "Racer 1".into(),
            top_speed: 500.0,
            acceleration: 10.0,
            handling: 10.0,
        }])
    }

    async fn create_race(&self, racer: RacerId, track: TrackId) -> GatewayResult<RaceHandle> {
        self.log(MockCall::CreateRace { racer, track });
        let r = self.responses.lock().unwrap();
        if r.create_fails {
            return Err(failure());
        }
        Ok(RaceHandle {
            id: RaceId(r.race_id),
        })
    }

    async fn start_race(&self, race: RaceId) -> GatewayResult<()> {
        self.log(MockCall::StartRace(race));
        if self.responses.lock().unwrap().start_fails {
            return Err(failure());
        }
        Ok(())
    }

    async fn get_race(&self, race: RaceId) -> GatewayResult<RaceSnapshot> {
        self.log(MockCall::GetRace(race));
        let next = self.responses.lock().unwrap().statuses.pop_front();
        match next {
            Some(Some(s)) => Ok(s),
            Some(None) => Err(failure()),
            // Script exhausted: keep reporting the race as running.
            None => Ok(snapshot(RaceStatus::InProgress)),
        }
    }

    async fn accelerate(&self, race: RaceId) -> GatewayResult<()> {
        self.log(MockCall::Accelerate(race));
        if self.responses.lock().unwrap().accelerate_fails {
            return Err(failure());
        }
        Ok(())
    }
}
