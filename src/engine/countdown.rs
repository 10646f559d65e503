use crate::engine::ticker::Ticker;
use crate::model::{CountdownConfig, RaceEvent};
use tokio::sync::mpsc;

/// Run the pre-start countdown.
///
/// Waits `start_delay`, emits `initial`, then emits each decremented count on every tick.
/// Zero is never emitted: reaching it cancels the ticker and completes the countdown.
pub(crate) async fn run_countdown(cfg: CountdownConfig, event_tx: &mpsc::UnboundedSender<RaceEvent>) {
    tokio::time::sleep(cfg.start_delay).await;

    let mut count = cfg.initial;
    if count == 0 {
        return;
    }
    let _ = event_tx.send(RaceEvent::Countdown { count });

    let mut ticker = Ticker::start("countdown", cfg.tick);
    while ticker.tick().await {
        count -= 1;
        if count == 0 {
            ticker.cancel();
            break;
        }
        let _ = event_tx.send(RaceEvent::Countdown { count });
    }
    tracing::debug!("countdown complete");
}
