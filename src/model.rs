use crate::leaderboard::LeaderboardRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(TrackId);
id_newtype!(RacerId);
id_newtype!(RaceId);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    pub user_agent: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub countdown: CountdownConfig,
    #[serde(default, with = "humantime_serde")]
    pub auto_accelerate: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownConfig {
    pub initial: u32,
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
    #[serde(with = "humantime_serde")]
    pub start_delay: Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            initial: 3,
            tick: Duration::from_millis(1000),
            start_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    #[serde(default)]
    pub segments: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Racer {
    pub id: RacerId,
    pub driver_name: String,
    #[serde(default)]
    pub top_speed: f64,
    #[serde(default)]
    pub acceleration: f64,
    #[serde(default)]
    pub handling: f64,
}

impl Racer {
    /// One-line card text used by selection lists.
    pub fn card(&self) -> String {
        format!(
            "{} (Speed: {}, Accel: {}, Handling: {})",
            self.driver_name, self.top_speed, self.acceleration, self.handling
        )
    }
}

/// Returned by race creation. The server has shipped both `id` and `ID`, sometimes
/// together; `id` wins then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RaceHandleWire")]
pub struct RaceHandle {
    pub id: RaceId,
}

#[derive(Deserialize)]
struct RaceHandleWire {
    id: Option<RaceId>,
    #[serde(rename = "ID")]
    upper_id: Option<RaceId>,
}

impl TryFrom<RaceHandleWire> for RaceHandle {
    type Error = String;

    fn try_from(wire: RaceHandleWire) -> Result<Self, Self::Error> {
        wire.id
            .or(wire.upper_id)
            .map(|id| RaceHandle { id })
            .ok_or_else(|| "race response has no id".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    #[serde(rename = "unstarted", alias = "pending")]
    Pending,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "finished")]
    Finished,
    #[serde(other)]
    Unknown,
}

impl RaceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RaceStatus::Finished)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacerPosition {
    pub id: RacerId,
    pub driver_name: String,
    #[serde(default)]
    pub segment: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_position: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub status: RaceStatus,
    #[serde(default)]
    pub positions: Vec<RacerPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Selecting,
    Creating,
    Countdown,
    Starting,
    Racing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollStopReason {
    Finished,
    Errored,
    /// A newer poll for the same race took over.
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RaceEvent {
    PhaseStarted {
        phase: Phase,
    },
    RaceCreated {
        race_id: RaceId,
    },
    Countdown {
        count: u32,
    },
    /// Non-terminal snapshot observed while the race is running.
    Leaderboard {
        snapshot: RaceSnapshot,
    },
    RaceFinished {
        snapshot: RaceSnapshot,
    },
    PollStopped {
        race_id: RaceId,
        reason: PollStopReason,
    },
    Info(InfoEvent),
    RunCompleted {
        result: Box<RaceResult>,
    },
    RunFailed {
        error: String,
    },
}

/// Structured info events emitted by the engine and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    AccelerateFailed { race_id: RaceId, error: String },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::AccelerateFailed { race_id, error } => {
                format!("Accelerate on race {} failed: {}", race_id, error)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    pub timestamp_utc: String,
    pub base_url: String,
    pub race_id: RaceId,
    pub track: Option<String>,
    pub racer: Option<String>,
    pub standings: Vec<LeaderboardRow>,
}
