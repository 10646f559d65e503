//! Post-race processing utilities.
//!
//! Handles exports after a race completes.

use crate::cli::Cli;
use crate::model::RaceResult;
use anyhow::{Context, Result};
use std::path::Path;

/// Result of post-race processing, ready for presentation layers.
pub(crate) struct ProcessedRace {
    pub export_messages: Vec<String>,
}

/// Write a finished race as pretty-printed JSON.
pub(crate) fn export_json(path: &Path, result: &RaceResult) -> Result<()> {
    let out = serde_json::to_string_pretty(result).context("serialize race result")?;
    std::fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Process a completed race: run the exports requested on the command line.
pub(crate) fn process_race_completion(args: &Cli, race: &RaceResult) -> ProcessedRace {
    let mut export_messages = Vec::new();
    if let Some(export_path) = args.export_json.as_deref() {
        match export_json(export_path, race) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRace { export_messages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::LeaderboardRow;
    use crate::model::{RaceId, RacerId};

    #[test]
    fn export_writes_standings() {
        let race = RaceResult {
            timestamp_utc: "2024-01-01T00:00:00Z".into(),
            base_url: "http://localhost:3001".into(),
            race_id: RaceId(3),
            track: Some("Track 1".into()),
            racer: Some("Racer 1".into()),
            standings: vec![LeaderboardRow {
                place: 1,
                id: RacerId(1),
                driver_name: "Racer 1".into(),
                segment: 12,
                is_you: true,
            }],
        };
        let path = std::env::temp_dir().join(format!("race-client-export-{}.json", std::process::id()));
        export_json(&path, &race).unwrap();

        let back: RaceResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.race_id, RaceId(3));
        assert!(back.standings[0].is_you);
        let _ = std::fs::remove_file(&path);
    }
}
