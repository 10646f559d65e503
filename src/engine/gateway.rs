//! Remote race operations.
//!
//! `RaceGateway` is the seam between the lifecycle engine and the game server.
//! `HttpGateway` talks to the server's REST API; tests use `MockGateway`.

use crate::error::GatewayError;
use crate::model::{RaceHandle, RaceId, RaceSnapshot, Racer, RacerId, RunConfig, Track, TrackId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[async_trait]
pub trait RaceGateway: Send + Sync {
    async fn list_tracks(&self) -> GatewayResult<Vec<Track>>;

    async fn list_racers(&self) -> GatewayResult<Vec<Racer>>;

    async fn create_race(&self, racer: RacerId, track: TrackId) -> GatewayResult<RaceHandle>;

    async fn start_race(&self, race: RaceId) -> GatewayResult<()>;

    async fn get_race(&self, race: RaceId) -> GatewayResult<RaceSnapshot>;

    async fn accelerate(&self, race: RaceId) -> GatewayResult<()>;
}

#[derive(Debug, Serialize)]
struct CreateRaceBody {
    player_id: RacerId,
    track_id: TrackId,
}

#[derive(Clone)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(cfg: &RunConfig) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid base URL {}", cfg.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base URL {} must be an http(s) URL", cfg.base_url);
        }
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, base_url })
    }

    /// Append `segments` to the base URL, keeping any path prefix it already has.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Only fails for cannot-be-a-base URLs, which `new` rejects.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn tracks_url(&self) -> Url {
        self.url(&["api", "tracks"])
    }

    fn racers_url(&self) -> Url {
        self.url(&["api", "cars"])
    }

    fn races_url(&self) -> Url {
        self.url(&["api", "races"])
    }

    fn race_url(&self, race: RaceId, action: Option<&str>) -> Url {
        let id = race.to_string();
        match action {
            Some(a) => self.url(&["api", "races", &id, a]),
            None => self.url(&["api", "races", &id]),
        }
    }
}

/// Turn a non-2xx response into `GatewayError::Status`, keeping the body for diagnostics.
async fn check_status(resp: Response) -> GatewayResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::Status { status, body })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> GatewayResult<T> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl RaceGateway for HttpGateway {
    async fn list_tracks(&self) -> GatewayResult<Vec<Track>> {
        let url = self.tracks_url();
        tracing::debug!(%url, "calling server");
        decode(self.http.get(url).send().await?).await
    }

    async fn list_racers(&self) -> GatewayResult<Vec<Racer>> {
        let url = self.racers_url();
        tracing::debug!(%url, "calling server");
        decode(self.http.get(url).send().await?).await
    }

    async fn create_race(&self, racer: RacerId, track: TrackId) -> GatewayResult<RaceHandle> {
        let url = self.races_url();
        tracing::debug!(%url, %racer, %track, "creating race");
        let body = CreateRaceBody {
            player_id: racer,
            track_id: track,
        };
        decode(self.http.post(url).json(&body).send().await?).await
    }

    async fn start_race(&self, race: RaceId) -> GatewayResult<()> {
        let url = self.race_url(race, Some("start"));
        tracing::debug!(%url, "starting race");
        // Acknowledgement only; the body (if any) is ignored.
        check_status(self.http.post(url).send().await?).await?;
        Ok(())
    }

    async fn get_race(&self, race: RaceId) -> GatewayResult<RaceSnapshot> {
        let url = self.race_url(race, None);
        tracing::trace!(%url, "polling race");
        decode(self.http.get(url).send().await?).await
    }

    async fn accelerate(&self, race: RaceId) -> GatewayResult<()> {
        let url = self.race_url(race, Some("accelerate"));
        tracing::trace!(%url, "accelerating");
        check_status(self.http.post(url).send().await?).await?;
        Ok(())
    }
}
