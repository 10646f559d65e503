//! Text summary builder for CLI output.
//!
//! Formats the final standings and race details as human-readable lines for text mode.

use crate::leaderboard;
use crate::model::{Racer, RaceResult, Track};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished race.
pub(crate) fn build_text_summary(result: &RaceResult) -> TextSummary {
    let mut lines = Vec::new();

    lines.push("Race Results".to_string());
    lines.push(format!("Race: {}", result.race_id));
    if let Some(track) = result.track.as_deref() {
        lines.push(format!("Track: {track}"));
    }
    if let Some(racer) = result.racer.as_deref() {
        lines.push(format!("Racer: {racer}"));
    }
    if result.standings.is_empty() {
        lines.push("No positions reported".to_string());
    } else {
        lines.extend(leaderboard::lines(&result.standings));
    }

    TextSummary { lines }
}

/// Lines listing available tracks and racers, as shown by `--list`.
pub(crate) fn build_listing(tracks: &[Track], racers: &[Racer]) -> TextSummary {
    let mut lines = vec!["Tracks:".to_string()];
    if tracks.is_empty() {
        lines.push("  (none)".to_string());
    }
    lines.extend(tracks.iter().map(|t| format!("  {:>3}  {}", t.id, t.name)));
    lines.push("Racers:".to_string());
    if racers.is_empty() {
        lines.push("  (none)".to_string());
    }
    lines.extend(racers.iter().map(|r| format!("  {:>3}  {}", r.id, r.card())));
    TextSummary { lines }
}
