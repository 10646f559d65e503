use crate::model::RaceId;
use std::fmt;

/// Failure of a single remote call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateRace,
    StartRace,
    GetRace,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::CreateRace => "create race",
            Operation::StartRace => "start race",
            Operation::GetRace => "get race",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSelection {
    Track,
    Racer,
    Both,
}

impl fmt::Display for MissingSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingSelection::Track => f.write_str("a track"),
            MissingSelection::Racer => f.write_str("a racer"),
            MissingSelection::Both => f.write_str("a track and a racer"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    #[error("select {missing} before starting a race")]
    PreconditionUnmet { missing: MissingSelection },
    #[error("{op} failed: {source}")]
    RemoteCallFailed {
        op: Operation,
        #[source]
        source: GatewayError,
    },
    #[error("polling race {race_id} aborted: {source}")]
    PollingAborted {
        race_id: RaceId,
        #[source]
        source: Box<RaceError>,
    },
    #[error("race {current} is already assigned to this session")]
    RaceIdAlreadyAssigned { current: RaceId },
    #[error("polling race {0} was replaced by a newer poll")]
    PollSuperseded(RaceId),
}

impl RaceError {
    pub(crate) fn remote(op: Operation, source: GatewayError) -> Self {
        RaceError::RemoteCallFailed { op, source }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, RaceError>;
