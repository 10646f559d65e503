mod help;
mod state;

use crate::cli::{build_config, Cli};
use crate::engine::{HttpGateway, RaceEngine, RaceGateway};
use crate::leaderboard;
use crate::model::{Phase, RaceEvent, RaceResult};
use crate::orchestrator::{self, UiCommand};
use crate::store::{self, SelectionStore, SharedStore};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs},
    Terminal,
};
use state::{Choice, Pane, Screen, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let gateway = Arc::new(HttpGateway::new(&cfg)?);

    // The selection screen needs both lists before it can draw anything useful.
    let tracks = gateway
        .list_tracks()
        .await
        .context("failed to fetch tracks")?;
    let racers = gateway
        .list_racers()
        .await
        .context("failed to fetch racers")?;

    let store = store::shared(SelectionStore::new());
    let auto_accelerate = cfg.auto_accelerate;
    let engine = Arc::new(RaceEngine::new(cfg, gateway));

    let (event_tx, event_rx) = mpsc::unbounded_channel::<RaceEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_store = store.clone();
    let ui_handle = std::thread::spawn(move || {
        let mut state = UiState::new(tracks, racers);
        let res = run_threaded(
            &ui_args,
            &mut state,
            &ui_store,
            auto_accelerate,
            event_rx,
            &cmd_tx,
        );
        // Make sure the controller stops even if the UI bailed out on an error.
        let _ = cmd_tx.send(UiCommand::Quit);
        res
    });

    let res = orchestrator::run_controller(engine, store, false, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: &Cli,
    state: &mut UiState,
    store: &SharedStore,
    auto_accelerate: Option<Duration>,
    mut event_rx: UnboundedReceiver<RaceEvent>,
    cmd_tx: &UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut last_auto_accel = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                RaceEvent::RunCompleted { result } => {
                    handle_run_completed(args, state, *result);
                }
                other => apply_event(state, other),
            }
        }

        if let Some(every) = auto_accelerate {
            if state.phase == Phase::Racing && last_auto_accel.elapsed() >= every {
                let _ = cmd_tx.send(UiCommand::Accelerate);
                state.accelerations += 1;
                last_auto_accel = Instant::now();
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('?')) => {
                        state.show_help = !state.show_help;
                    }
                    (_, KeyCode::Esc) => {
                        state.show_help = false;
                    }
                    (_, KeyCode::Tab) if state.screen == Screen::Select => {
                        state.toggle_focus();
                    }
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) if state.screen == Screen::Select => {
                        state.move_cursor(-1);
                    }
                    (_, KeyCode::Down) | (_, KeyCode::Char('j'))
                        if state.screen == Screen::Select =>
                    {
                        state.move_cursor(1);
                    }
                    (_, KeyCode::Enter) if state.screen == Screen::Select => {
                        choose(state, store);
                    }
                    (_, KeyCode::Char('s')) if state.screen == Screen::Select => {
                        submit(state, store, cmd_tx);
                    }
                    (_, KeyCode::Char(' ')) if state.screen == Screen::Race => {
                        let _ = cmd_tx.send(UiCommand::Accelerate);
                        state.accelerations += 1;
                    }
                    (_, KeyCode::Char('n')) if state.screen == Screen::Results => {
                        state.reset_race();
                        state.screen = Screen::Select;
                        state.info = "Choose a track and a racer, then press s".into();
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Record the highlighted entry in the selection store.
fn choose(state: &mut UiState, store: &SharedStore) {
    let msg = match state.choose_highlighted() {
        Some(Choice::Track(t)) => {
            store::lock(store).select_track(t.id, t.name.clone());
            format!("Track: {}", t.name)
        }
        Some(Choice::Racer(r)) => {
            store::lock(store).select_racer(r.id, r.driver_name.clone());
            format!("Racer: {}", r.driver_name)
        }
        None => return,
    };
    state.info = msg;
}

/// Ask the controller for a race if the selection is complete.
fn submit(state: &mut UiState, store: &SharedStore, cmd_tx: &UnboundedSender<UiCommand>) {
    let ready = store::lock(store).ready();
    match ready {
        Ok(_) => {
            state.reset_race();
            state.screen = Screen::Race;
            state.info = "Creating race".into();
            let _ = cmd_tx.send(UiCommand::Start);
        }
        Err(e) => {
            state.info = e.to_string();
        }
    }
}

fn apply_event(state: &mut UiState, ev: RaceEvent) {
    match ev {
        RaceEvent::PhaseStarted { phase } => {
            state.phase = phase;
            if phase == Phase::Starting || phase == Phase::Racing {
                state.countdown = None;
            }
            state.info = format!("Phase: {phase:?}");
        }
        RaceEvent::RaceCreated { race_id } => {
            state.race_id = Some(race_id);
        }
        RaceEvent::Countdown { count } => {
            state.countdown = Some(count);
        }
        RaceEvent::Leaderboard { snapshot } | RaceEvent::RaceFinished { snapshot } => {
            state.leaderboard = leaderboard::rank(&snapshot.positions, state.player());
        }
        RaceEvent::PollStopped { race_id, reason } => {
            tracing::debug!(race = %race_id, ?reason, "polling stopped");
        }
        RaceEvent::Info(info) => {
            state.info = info.to_message();
        }
        RaceEvent::RunCompleted { result } => {
            state.leaderboard = result.standings.clone();
            state.last_result = Some(*result);
            state.screen = Screen::Results;
        }
        RaceEvent::RunFailed { error } => {
            state.info = format!("Race failed: {error}");
            state.countdown = None;
            state.screen = Screen::Select;
        }
    }
}

fn handle_run_completed(args: &Cli, state: &mut UiState, r: RaceResult) {
    let processed = orchestrator::process_race_completion(args, &r);
    state.info = if processed.export_messages.is_empty() {
        "Race finished. Press n for a new race".into()
    } else {
        processed.export_messages.join("; ")
    };
    apply_event(state, RaceEvent::RunCompleted {
        result: Box::new(r),
    });
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let selected = match state.screen {
        Screen::Select => 0,
        Screen::Race => 1,
        Screen::Results => 2,
    };
    let tabs = Tabs::new(vec![Line::from("Select"), Line::from("Race"), Line::from("Results")])
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title("race-client"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    if state.show_help {
        help::draw_help(chunks[1], f);
    } else {
        match state.screen {
            Screen::Select => draw_select(chunks[1], f, state),
            Screen::Race => draw_race(chunks[1], f, state),
            Screen::Results => draw_results(chunks[1], f, state),
        }
    }

    let status = Paragraph::new(Line::from(vec![
        Span::styled(state.info.as_str(), Style::default().fg(Color::Gray)),
        Span::raw("   "),
        Span::styled("? help  q quit", Style::default().fg(Color::DarkGray)),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, chunks[2]);
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn marked(text: String, chosen: bool) -> ListItem<'static> {
    if chosen {
        ListItem::new(Line::from(vec![
            Span::styled("* ", Style::default().fg(Color::Green)),
            Span::styled(text, Style::default().fg(Color::Green)),
        ]))
    } else {
        ListItem::new(Line::from(vec![Span::raw("  "), Span::raw(text)]))
    }
}

fn draw_select(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(area);
    let highlight = Style::default().add_modifier(Modifier::REVERSED);

    let tracks: Vec<ListItem> = state
        .tracks
        .iter()
        .enumerate()
        .map(|(i, t)| marked(t.name.clone(), state.chosen_track == Some(i)))
        .collect();
    let mut track_state = ListState::default().with_selected(Some(state.track_cursor));
    f.render_stateful_widget(
        List::new(tracks)
            .block(pane_block("Tracks", state.focus == Pane::Tracks))
            .highlight_style(highlight),
        cols[0],
        &mut track_state,
    );

    let racers: Vec<ListItem> = state
        .racers
        .iter()
        .enumerate()
        .map(|(i, r)| marked(r.card(), state.chosen_racer == Some(i)))
        .collect();
    let mut racer_state = ListState::default().with_selected(Some(state.racer_cursor));
    f.render_stateful_widget(
        List::new(racers)
            .block(pane_block("Racers", state.focus == Pane::Racers))
            .highlight_style(highlight),
        cols[1],
        &mut racer_state,
    );
}

fn leaderboard_lines(rows: &[leaderboard::LeaderboardRow]) -> Vec<Line<'static>> {
    rows.iter()
        .map(|row| {
            let style = if row.is_you {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:>2} - ", row.place), style),
                Span::styled(row.label(), style),
                Span::styled(
                    format!("  (segment {})", row.segment),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect()
}

fn draw_race(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)].as_ref())
        .split(area);

    let headline = match (state.phase, state.countdown) {
        (Phase::Countdown, Some(n)) => Span::styled(
            format!("Race begins in {n}"),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        (Phase::Countdown, None) => Span::raw("Get ready"),
        (Phase::Racing, _) => Span::styled(
            "Click space to accelerate!",
            Style::default().fg(Color::Green),
        ),
        (phase, _) => Span::raw(format!("{phase:?}")),
    };
    let race = state
        .race_id
        .map(|id| format!("Race {id}"))
        .unwrap_or_else(|| "Race pending".into());
    let track = state.track_name().unwrap_or("-").to_string();
    let header = Paragraph::new(vec![
        Line::from(headline),
        Line::from(format!("{race}  Track: {track}")),
        Line::from(format!("Accelerations: {}", state.accelerations)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Race"));
    f.render_widget(header, rows[0]);

    let board = Paragraph::new(leaderboard_lines(&state.leaderboard))
        .block(Block::default().borders(Borders::ALL).title("Leaderboard"));
    f.render_widget(board, rows[1]);
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let Some(result) = state.last_result.as_ref() else {
        f.render_widget(
            Paragraph::new("No results yet")
                .block(Block::default().borders(Borders::ALL).title("Race Results")),
            area,
        );
        return;
    };

    let mut lines = vec![
        Line::from(format!("Race: {}", result.race_id)),
        Line::from(format!(
            "Track: {}",
            result.track.as_deref().unwrap_or("-")
        )),
        Line::from(""),
    ];
    lines.extend(leaderboard_lines(&result.standings));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press n to start a new race",
        Style::default().fg(Color::DarkGray),
    )));

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Race Results")),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RaceId, RaceSnapshot, RaceStatus, Racer, RacerId, RacerPosition, Track, TrackId};

    fn state_with_player() -> UiState {
        let mut s = UiState::new(
            vec![Track {
                id: TrackId(1),
                name: "Track 1".into(),
                segments: vec![],
            }],
            vec![Racer {
                id: RacerId(2),
                driver_name: "Racer 2".into(),
                top_speed: 500.0,
                acceleration: 10.0,
                handling: 10.0,
            }],
        );
        s.chosen_track = Some(0);
        s.chosen_racer = Some(0);
        s
    }

    fn pos(id: u64, segment: u32) -> RacerPosition {
        RacerPosition {
            id: RacerId(id),
            driver_name: format!("Racer {id}"),
            segment,
            speed: None,
            final_position: None,
        }
    }

    #[test]
    fn countdown_then_leaderboard() {
        let mut s = state_with_player();
        apply_event(&mut s, RaceEvent::RaceCreated { race_id: RaceId(9) });
        apply_event(&mut s, RaceEvent::PhaseStarted { phase: Phase::Countdown });
        apply_event(&mut s, RaceEvent::Countdown { count: 2 });
        assert_eq!(s.countdown, Some(2));
        assert_eq!(s.race_id, Some(RaceId(9)));

        apply_event(&mut s, RaceEvent::PhaseStarted { phase: Phase::Racing });
        assert_eq!(s.countdown, None);

        let snapshot = RaceSnapshot {
            status: RaceStatus::InProgress,
            positions: vec![pos(1, 4), pos(2, 7)],
        };
        apply_event(&mut s, RaceEvent::Leaderboard { snapshot });
        assert_eq!(s.leaderboard.len(), 2);
        assert_eq!(s.leaderboard[0].label(), "Racer 2 (you)");
        assert_eq!(s.leaderboard[1].label(), "Racer 1");
    }

    #[test]
    fn failure_returns_to_selection() {
        let mut s = state_with_player();
        s.screen = Screen::Race;
        apply_event(&mut s, RaceEvent::RunFailed {
            error: "boom".into(),
        });
        assert_eq!(s.screen, Screen::Select);
        assert!(s.info.contains("boom"));
    }

    #[test]
    fn submit_requires_both_selections() {
        let mut s = state_with_player();
        let store = store::shared(SelectionStore::new());
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();

        submit(&mut s, &store, &cmd_tx);
        assert!(cmd_rx.try_recv().is_err());
        assert_eq!(s.screen, Screen::Select);

        choose(&mut s, &store);
        s.toggle_focus();
        choose(&mut s, &store);
        submit(&mut s, &store, &cmd_tx);
        assert!(matches!(cmd_rx.try_recv(), Ok(UiCommand::Start)));
        assert_eq!(s.screen, Screen::Race);
    }
}
