//! Race lifecycle controller.
//!
//! Owns start/accelerate/quit orchestration and emits events for presentation layers.

use crate::engine::{RaceEngine, RaceGateway};
use crate::error::LifecycleResult;
use crate::model::{InfoEvent, RaceEvent, RaceResult};
use crate::store::SharedStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers to control the race.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Start a race with the current selection.
    Start,
    Accelerate,
    Quit,
}

/// Internal handle for a running lifecycle task.
struct RunCtx {
    handle: Option<tokio::task::JoinHandle<LifecycleResult<RaceResult>>>,
}

/// Spawn a new lifecycle and return its handle.
fn start_run<G>(
    engine: &Arc<RaceEngine<G>>,
    store: &SharedStore,
    event_tx: &UnboundedSender<RaceEvent>,
) -> RunCtx
where
    G: RaceGateway + ?Sized + 'static,
{
    let engine = engine.clone();
    let store = store.clone();
    let event_tx = event_tx.clone();
    let handle = tokio::spawn(async move { engine.run(&store, &event_tx).await });
    RunCtx {
        handle: Some(handle),
    }
}

/// Orchestrate races based on UI commands and emit events back to presentation layers.
///
/// Returns once `Quit` arrives, or once the command channel is closed and no race is running.
pub(crate) async fn run_controller<G>(
    engine: Arc<RaceEngine<G>>,
    store: SharedStore,
    start_on_launch: bool,
    event_tx: UnboundedSender<RaceEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()>
where
    G: RaceGateway + ?Sized + 'static,
{
    let mut run_ctx = if start_on_launch {
        Some(start_run(&engine, &store, &event_tx))
    } else {
        None
    };
    let mut cmds_open = true;

    loop {
        if !cmds_open && run_ctx.is_none() {
            break;
        }
        tokio::select! {
            cmd = cmd_rx.recv(), if cmds_open => {
                match cmd {
                    Some(UiCommand::Start) => {
                        if run_ctx.is_some() {
                            let _ = event_tx.send(RaceEvent::Info(InfoEvent::Message(
                                "A race is already running".into(),
                            )));
                        } else {
                            run_ctx = Some(start_run(&engine, &store, &event_tx));
                        }
                    }
                    Some(UiCommand::Accelerate) => {
                        let _ = engine.accelerate(&store, Some(event_tx.clone()));
                    }
                    Some(UiCommand::Quit) => {
                        // Aborting drops the lifecycle future and with it any live ticker.
                        if let Some(ctx) = run_ctx.take() {
                            if let Some(h) = ctx.handle {
                                h.abort();
                            }
                        }
                        break;
                    }
                    None => {
                        cmds_open = false;
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    match join_res {
                        Ok(Ok(r)) => {
                            let _ = event_tx.send(RaceEvent::RunCompleted { result: Box::new(r) });
                        }
                        Ok(Err(e)) => {
                            let _ = event_tx.send(RaceEvent::RunFailed { error: e.to_string() });
                        }
                        Err(e) => {
                            let _ = event_tx.send(RaceEvent::RunFailed {
                                error: format!("race task failed: {e}"),
                            });
                        }
                    }
                    run_ctx = None;
                }
            }
        }
    }

    Ok(())
}
