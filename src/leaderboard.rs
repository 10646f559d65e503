//! Leaderboard view model.
//!
//! Ranks racer positions by progress and marks the local player's row. Renderers consume
//! the rows; the underlying snapshot is never modified, so repeated renders stay clean.

use crate::model::{RacerId, RacerPosition};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub place: usize,
    pub id: RacerId,
    pub driver_name: String,
    pub segment: u32,
    pub is_you: bool,
}

impl LeaderboardRow {
    /// Display name, tagged with "(you)" for the local player.
    pub fn label(&self) -> String {
        if self.is_you {
            format!("{} (you)", self.driver_name)
        } else {
            self.driver_name.clone()
        }
    }
}

/// Rank positions by `segment`, furthest first. Ties keep the server's order.
pub fn rank(positions: &[RacerPosition], player: Option<RacerId>) -> Vec<LeaderboardRow> {
    let mut sorted: Vec<&RacerPosition> = positions.iter().collect();
    // sort_by is stable
    sorted.sort_by(|a, b| b.segment.cmp(&a.segment));

    let mut tagged = false;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let is_you = !tagged && Some(p.id) == player;
            tagged |= is_you;
            LeaderboardRow {
                place: i + 1,
                id: p.id,
                driver_name: p.driver_name.clone(),
                segment: p.segment,
                is_you,
            }
        })
        .collect()
}

/// Plain text lines, "1 - Name", as shown by the text renderer.
pub fn lines(rows: &[LeaderboardRow]) -> Vec<String> {
    rows.iter()
        .map(|r| format!("{} - {}", r.place, r.label()))
        .collect()
}
