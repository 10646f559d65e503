use crate::engine::{HttpGateway, RaceEngine, RaceGateway};
use crate::leaderboard;
use crate::model::{CountdownConfig, Phase, RaceEvent, RaceResult, RacerId, RunConfig, TrackId};
use crate::orchestrator::{self, UiCommand};
use crate::store::{self, SelectionStore};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "race-client",
    version,
    about = "Pick a track and a racer, race, and watch the live leaderboard"
)]
pub struct Cli {
    /// Base URL of the race server
    #[arg(long, default_value = "http://localhost:3001")]
    pub base_url: String,

    /// Track id to race on (required with --text/--json)
    #[arg(long)]
    pub track: Option<u64>,

    /// Racer id to race with (required with --text/--json)
    #[arg(long)]
    pub racer: Option<u64>,

    /// List available tracks and racers and exit
    #[arg(long)]
    pub list: bool,

    /// Print the final result as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print progress and results as text and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Race status polling interval
    #[arg(long, default_value = "500ms")]
    pub poll_interval: humantime::Duration,

    /// Countdown starting number
    #[arg(long, default_value_t = 3)]
    pub countdown_from: u32,

    /// Countdown step duration
    #[arg(long, default_value = "1s")]
    pub countdown_tick: humantime::Duration,

    /// Delay before the countdown shows its first number
    #[arg(long, default_value = "1s")]
    pub start_delay: humantime::Duration,

    /// Per-request timeout for server calls
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,

    /// In text/JSON mode, accelerate automatically at this interval while racing
    #[arg(long)]
    pub auto_accelerate: Option<humantime::Duration>,

    /// Export the final result as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Write logs to this file (the only log output in TUI mode)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

impl Cli {
    pub fn is_tui(&self) -> bool {
        cfg!(feature = "tui") && !self.list && !self.json && !self.text
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.list {
        return run_list(args).await;
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, false).await;
        }
    }

    let json = args.json;
    run_headless(args, json).await
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        base_url: args.base_url.clone(),
        user_agent: format!("race-client/{}", env!("CARGO_PKG_VERSION")),
        request_timeout: Duration::from(args.request_timeout),
        poll_interval: Duration::from(args.poll_interval),
        countdown: CountdownConfig {
            initial: args.countdown_from,
            tick: Duration::from(args.countdown_tick),
            start_delay: Duration::from(args.start_delay),
        },
        auto_accelerate: args.auto_accelerate.map(Duration::from),
    }
}

/// Seed the selection from `--track`/`--racer`, resolving display names from the server.
async fn initial_selection<G>(args: &Cli, gateway: &G) -> SelectionStore
where
    G: RaceGateway + ?Sized,
{
    let mut selection = SelectionStore::new();

    if let Some(id) = args.track.map(TrackId) {
        let name = match gateway.list_tracks().await {
            Ok(tracks) => tracks.into_iter().find(|t| t.id == id).map(|t| t.name),
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch tracks");
                None
            }
        };
        selection.select_track(id, name.unwrap_or_else(|| format!("Track {id}")));
    }

    if let Some(id) = args.racer.map(RacerId) {
        let name = match gateway.list_racers().await {
            Ok(racers) => racers
                .into_iter()
                .find(|r| r.id == id)
                .map(|r| r.driver_name),
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch racers");
                None
            }
        };
        selection.select_racer(id, name.unwrap_or_else(|| format!("Racer {id}")));
    }

    selection
}

async fn run_list(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let gateway = HttpGateway::new(&cfg)?;
    let tracks = gateway
        .list_tracks()
        .await
        .context("failed to fetch tracks")?;
    let racers = gateway
        .list_racers()
        .await
        .context("failed to fetch racers")?;

    let (out_tx, out_handle) = spawn_output_writer();
    for line in crate::text_summary::build_listing(&tracks, &racers).lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}

/// Run one race without the TUI. `json` prints the final result as JSON instead of text.
async fn run_headless(args: Cli, json: bool) -> Result<()> {
    let cfg = build_config(&args);
    let gateway = Arc::new(HttpGateway::new(&cfg)?);
    let store = store::shared(initial_selection(&args, gateway.as_ref()).await);
    let player = store::lock(&store).racer().map(|r| r.id);
    let engine = Arc::new(RaceEngine::new(cfg.clone(), gateway));

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RaceEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let controller = tokio::spawn(orchestrator::run_controller(
        engine, store, true, evt_tx, cmd_rx,
    ));

    // Dropping the command sender lets the controller exit once the race settles.
    let mut cmd_tx = Some(cmd_tx);
    let mut accelerator = cfg.auto_accelerate.map(|period| {
        let mut i = tokio::time::interval(period.max(Duration::from_millis(1)));
        i.set_missed_tick_behavior(MissedTickBehavior::Skip);
        i
    });
    let mut racing = false;
    let mut outcome: Option<std::result::Result<RaceResult, String>> = None;

    loop {
        tokio::select! {
            ev = evt_rx.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    RaceEvent::PhaseStarted { phase } => {
                        racing = phase == Phase::Racing;
                        if !json {
                            let _ = out_tx.send(OutputLine::Stderr(format!("== {phase:?} ==")));
                        }
                    }
                    RaceEvent::RaceCreated { race_id } => {
                        if !json {
                            let _ = out_tx.send(OutputLine::Stderr(format!("Race {race_id} created")));
                        }
                    }
                    RaceEvent::Countdown { count } => {
                        if !json {
                            let _ = out_tx.send(OutputLine::Stderr(format!("Race starts in... {count}")));
                        }
                    }
                    RaceEvent::Leaderboard { snapshot } => {
                        if !json {
                            let rows = leaderboard::rank(&snapshot.positions, player);
                            let _ = out_tx.send(OutputLine::Stderr(leaderboard::lines(&rows).join(" | ")));
                        }
                    }
                    RaceEvent::Info(info) => {
                        let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                    }
                    RaceEvent::RunCompleted { result } => {
                        racing = false;
                        outcome = Some(Ok(*result));
                        cmd_tx = None;
                    }
                    RaceEvent::RunFailed { error } => {
                        racing = false;
                        outcome = Some(Err(error));
                        cmd_tx = None;
                    }
                    // Final standings are printed from RunCompleted.
                    RaceEvent::RaceFinished { .. } | RaceEvent::PollStopped { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c(), if cmd_tx.is_some() => {
                if let Some(tx) = cmd_tx.take() {
                    let _ = tx.send(UiCommand::Quit);
                }
                outcome = Some(Err("interrupted".into()));
                break;
            }
            _ = next_tick(&mut accelerator), if racing => {
                if let Some(tx) = cmd_tx.as_ref() {
                    let _ = tx.send(UiCommand::Accelerate);
                }
            }
        }
    }

    controller
        .await
        .context("race controller task failed")?
        .context("race controller failed")?;

    let result = match outcome {
        Some(Ok(r)) => r,
        Some(Err(e)) => {
            drop(out_tx);
            let _ = out_handle.await;
            anyhow::bail!("race failed: {e}");
        }
        None => {
            drop(out_tx);
            let _ = out_handle.await;
            anyhow::bail!("race ended without a result");
        }
    };

    let processed = orchestrator::process_race_completion(&args, &result);
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    if json {
        let out = serde_json::to_string_pretty(&result)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&result).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockCall, MockGateway};

    #[test]
    fn config_reflects_arguments() {
        let args = Cli::parse_from([
            "race-client",
            "--text",
            "--track",
            "2",
            "--racer",
            "3",
            "--poll-interval",
            "250ms",
            "--countdown-from",
            "5",
            "--auto-accelerate",
            "100ms",
        ]);
        let cfg = build_config(&args);
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.countdown.initial, 5);
        assert_eq!(cfg.countdown.tick, Duration::from_secs(1));
        assert_eq!(cfg.countdown.start_delay, Duration::from_secs(1));
        assert_eq!(cfg.auto_accelerate, Some(Duration::from_millis(100)));
        assert!(!args.is_tui());
    }

    #[test]
    fn defaults_match_game_cadence() {
        let cfg = build_config(&Cli::parse_from(["race-client", "--json"]));
        assert_eq!(cfg.base_url, "http://localhost:3001");
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.countdown, CountdownConfig::default());
        assert_eq!(cfg.auto_accelerate, None);
    }

    #[tokio::test]
    async fn selection_resolves_names_from_server() {
        let gw = MockGateway::new();
        let args = Cli::parse_from(["race-client", "--text", "--track", "1", "--racer", "7"]);
        let s = initial_selection(&args, &gw).await;

        assert_eq!(s.track().unwrap().name, "Track 1");
        // unknown racer id falls back to a generated name
        assert_eq!(s.racer().unwrap().name, "Racer 7");
        assert_eq!(gw.calls(), vec![MockCall::ListTracks, MockCall::ListRacers]);
    }

    #[tokio::test]
    async fn selection_without_flags_makes_no_calls() {
        let gw = MockGateway::new();
        let args = Cli::parse_from(["race-client", "--json"]);
        let s = initial_selection(&args, &gw).await;
        assert!(s.ready().is_err());
        assert!(gw.calls().is_empty());
    }
}
