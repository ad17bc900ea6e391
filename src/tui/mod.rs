pub mod charts;
mod help;
mod state;

use crate::cli::{build_config, make_invoker, Cli};
use crate::model::SessionConfig;
use crate::orchestrator::{self, AcquisitionController, InfoEvent, SessionPhase, SessionState, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Tabs},
    Terminal,
};
use state::UiState;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let controller = AcquisitionController::new(make_invoker(&cfg)?);
    let state_rx = controller.subscribe();

    // Unbounded channels avoid backpressure between the UI thread and the runtime.
    let (info_tx, info_rx) = mpsc::unbounded_channel::<InfoEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(cfg, state_rx, info_rx, cmd_tx));

    orchestrator::run_controller(controller, info_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(res) => res?,
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }
    Ok(())
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    cfg: SessionConfig,
    mut state_rx: watch::Receiver<SessionState>,
    mut info_rx: UnboundedReceiver<InfoEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(cfg);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        if state_rx.has_changed().unwrap_or(false) {
            let session = state_rx.borrow_and_update().clone();
            state.apply_session(session);
        }
        while let Ok(info) = info_rx.try_recv() {
            state.apply_info(info);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
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
                        state.renderer.dispose();
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Tab) => {
                        state.tab = (state.tab + 1) % 2;
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = 1;
                    }
                    (_, KeyCode::Char(key)) if state.edit_form(key).is_some() => {}
                    (_, KeyCode::Char(key)) => match state.command_for_key(key) {
                        Some(Ok(command)) => {
                            state.info.clear();
                            let _ = cmd_tx.send(UiCommand::Submit(command));
                        }
                        Some(Err(e)) => {
                            state.info = format!("Invalid request: {e}");
                        }
                        None => {}
                    },
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

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Dashboard"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("scale-diag"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_dashboard(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }
}

fn phase_color(phase: SessionPhase) -> Color {
    match phase {
        SessionPhase::Idle => Color::Gray,
        SessionPhase::Running => Color::Yellow,
        SessionPhase::Succeeded => Color::Green,
        SessionPhase::Failed => Color::Red,
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(6), // Status
                Constraint::Length(3), // Progress
                Constraint::Min(8),    // Plot + statistics
                Constraint::Length(3), // Key hints
            ]
            .as_ref(),
        )
        .split(area);

    let session = &state.session;
    let cfg = &state.config;
    let color = phase_color(session.phase);
    let mut trial = format!(
        "{:?} x{} every {}",
        cfg.mode,
        cfg.sample_count,
        humantime::format_duration(cfg.sample_period)
    );
    if let Some(fc) = cfg.cutoff_frequency {
        trial.push_str(&format!(", cutoff {fc} Hz"));
    }
    let backend = cfg.backend_url.as_deref().unwrap_or("simulator");
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("{:?}", session.phase), Style::default().fg(color)),
            Span::raw("  "),
            Span::styled("Command: ", Style::default().fg(Color::Gray)),
            Span::raw(session.command.unwrap_or("-")),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::styled(session.status_message.clone(), Style::default().fg(color)),
        ]),
        Line::from(vec![
            Span::styled("Trial: ", Style::default().fg(Color::Gray)),
            Span::raw(trial),
            Span::raw("  "),
            Span::styled("Backend: ", Style::default().fg(Color::Gray)),
            Span::raw(backend),
            Span::raw("  "),
            Span::styled("Calibration weight: ", Style::default().fg(Color::Gray)),
            Span::raw(cfg.calibration_weight.to_string()),
        ]),
    ];
    if !state.info.is_empty() {
        lines.push(Line::from(Span::styled(
            state.info.clone(),
            Style::default().fg(Color::Cyan),
        )));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Session")),
        main[0],
    );

    let percent = session.progress_percent.clamp(0.0, 100.0);
    let gauge_title = match session.finished_at.as_deref() {
        Some(at) if session.phase.is_finished() => format!("Progress (finished {at})"),
        _ => "Progress".to_string(),
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(gauge_title))
        .gauge_style(Style::default().fg(color))
        .ratio(percent / 100.0)
        .label(format!("{percent:.0}%"));
    f.render_widget(gauge, main[1]);

    state.renderer.render(f, main[2]);

    let hints = Paragraph::new(Line::from(vec![
        Span::styled("s", Style::default().fg(Color::Magenta)),
        Span::raw(" trial  "),
        Span::styled("l", Style::default().fg(Color::Magenta)),
        Span::raw(" load cells  "),
        Span::styled("d", Style::default().fg(Color::Magenta)),
        Span::raw(" dispense  "),
        Span::styled("e/x", Style::default().fg(Color::Magenta)),
        Span::raw(" motor on/off  "),
        Span::styled("a/k/g", Style::default().fg(Color::Magenta)),
        Span::raw(" trial/calibrate/coefficients  "),
        Span::styled("?", Style::default().fg(Color::Magenta)),
        Span::raw(" help  "),
        Span::styled("q", Style::default().fg(Color::Magenta)),
        Span::raw(" quit"),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(hints, main[3]);
}
