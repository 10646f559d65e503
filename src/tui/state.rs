use crate::leaderboard::LeaderboardRow;
use crate::model::{Phase, RaceId, RaceResult, Racer, RacerId, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Select,
    Race,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Tracks,
    Racers,
}

pub struct UiState {
    pub screen: Screen,
    pub focus: Pane,
    pub show_help: bool,
    pub info: String,

    pub tracks: Vec<Track>,
    pub racers: Vec<Racer>,
    pub track_cursor: usize,
    pub racer_cursor: usize,
    pub chosen_track: Option<usize>,
    pub chosen_racer: Option<usize>,

    pub phase: Phase,
    pub race_id: Option<RaceId>,
    // Current countdown value; cleared once the start request goes out.
    pub countdown: Option<u32>,
    pub leaderboard: Vec<LeaderboardRow>,
    pub accelerations: u64,
    pub last_result: Option<RaceResult>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            screen: Screen::Select,
            focus: Pane::Tracks,
            show_help: false,
            info: String::new(),
            tracks: Vec::new(),
            racers: Vec::new(),
            track_cursor: 0,
            racer_cursor: 0,
            chosen_track: None,
            chosen_racer: None,
            phase: Phase::Selecting,
            race_id: None,
            countdown: None,
            leaderboard: Vec::new(),
            accelerations: 0,
            last_result: None,
        }
    }
}

impl UiState {
    pub fn new(tracks: Vec<Track>, racers: Vec<Racer>) -> Self {
        Self {
            tracks,
            racers,
            ..Default::default()
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Pane::Tracks => Pane::Racers,
            Pane::Racers => Pane::Tracks,
        };
    }

    /// Move the cursor of the focused list, clamped to its bounds.
    pub fn move_cursor(&mut self, delta: isize) {
        let (cursor, len) = match self.focus {
            Pane::Tracks => (&mut self.track_cursor, self.tracks.len()),
            Pane::Racers => (&mut self.racer_cursor, self.racers.len()),
        };
        if len == 0 {
            *cursor = 0;
            return;
        }
        *cursor = cursor.saturating_add_signed(delta).min(len - 1);
    }

    /// Mark the entry under the cursor as chosen. Returns it so the caller can record it.
    pub fn choose_highlighted(&mut self) -> Option<Choice<'_>> {
        match self.focus {
            Pane::Tracks => {
                let track = self.tracks.get(self.track_cursor)?;
                self.chosen_track = Some(self.track_cursor);
                Some(Choice::Track(track))
            }
            Pane::Racers => {
                let racer = self.racers.get(self.racer_cursor)?;
                self.chosen_racer = Some(self.racer_cursor);
                Some(Choice::Racer(racer))
            }
        }
    }

    pub fn player(&self) -> Option<RacerId> {
        self.chosen_racer
            .and_then(|i| self.racers.get(i))
            .map(|r| r.id)
    }

    pub fn track_name(&self) -> Option<&str> {
        self.chosen_track
            .and_then(|i| self.tracks.get(i))
            .map(|t| t.name.as_str())
    }

    /// Clear per-race state ahead of a new submission. Selections are kept.
    pub fn reset_race(&mut self) {
        self.phase = Phase::Selecting;
        self.race_id = None;
        self.countdown = None;
        self.leaderboard.clear();
        self.accelerations = 0;
    }
}

pub enum Choice<'a> {
    Track(&'a Track),
    Racer(&'a Racer),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackId;

    fn state() -> UiState {
        let tracks = (1..=3)
            .map(|i| Track {
                id: TrackId(i),
                name: format!("Track {i}"),
                segments: vec![],
            })
            .collect();
        let racers = (1..=2)
            .map(|i| Racer {
                id: RacerId(i),
                driver_name: format!("Racer {i}"),
                top_speed: 500.0,
                acceleration: 10.0,
                handling: 10.0,
            })
            .collect();
        UiState::new(tracks, racers)
    }

    #[test]
    fn cursor_is_clamped_per_pane() {
        let mut s = state();
        s.move_cursor(-1);
        assert_eq!(s.track_cursor, 0);
        s.move_cursor(10);
        assert_eq!(s.track_cursor, 2);

        s.toggle_focus();
        s.move_cursor(10);
        assert_eq!(s.racer_cursor, 1);
        assert_eq!(s.track_cursor, 2);
    }

    #[test]
    fn choosing_records_player_and_track() {
        let mut s = state();
        s.move_cursor(1);
        assert!(matches!(s.choose_highlighted(), Some(Choice::Track(t)) if t.id == TrackId(2)));
        s.toggle_focus();
        assert!(matches!(s.choose_highlighted(), Some(Choice::Racer(r)) if r.id == RacerId(1)));

        assert_eq!(s.track_name(), Some("Track 2"));
        assert_eq!(s.player(), Some(RacerId(1)));
    }

    #[test]
    fn empty_lists_choose_nothing() {
        let mut s = UiState::new(vec![], vec![]);
        s.move_cursor(1);
        assert!(s.choose_highlighted().is_none());
        assert_eq!(s.player(), None);
    }
}
