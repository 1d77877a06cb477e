use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::error::EoError;
use crate::pipeline::CancelToken;
use crate::progress::{self, ProgressEvent, ProgressSink};

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Validate,
    Query,
    Scenes,
    Archive,
    Done,
}

impl Phase {
    fn from_percent(percent: u8) -> Self {
        match percent {
            p if p >= progress::DONE => Phase::Done,
            p if p >= progress::ARCHIVED => Phase::Archive,
            p if p >= progress::SCENE_FETCH => Phase::Scenes,
            p if p >= progress::QUERY_STARTED => Phase::Query,
            _ => Phase::Validate,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Phase::Validate => "Validate",
            Phase::Query => "Query",
            Phase::Scenes => "Scenes",
            Phase::Archive => "Archive",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    status: String,
    percent: u8,
    fetches: usize,
    computes: usize,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
    cancel_requested: bool,
}

pub struct Tui {
    title: String,
    state: Arc<Mutex<MonitorState>>,
    cancel: CancelToken,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<MonitorState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if message.starts_with("fetching") {
                state.fetches = state.fetches.saturating_add(1);
            } else if message.starts_with("computing") {
                state.computes = state.computes.saturating_add(1);
            }
            state.percent = state.percent.max(event.percent);
            state.status = message.clone();
            let elapsed = state.started.elapsed().as_secs();
            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
            push_bounded(
                &mut state.logs,
                format!("[{elapsed:>4}s {:>3}%] {message}", event.percent),
                LOGS_MAX,
            );
        }
    }
}

impl Tui {
    pub fn new(title: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            title: title.into(),
            state: Arc::new(Mutex::new(MonitorState {
                status: "starting".to_string(),
                percent: 0,
                fetches: 0,
                computes: 0,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                started: Instant::now(),
                cancel_requested: false,
            })),
            cancel,
            log_scroll: 0,
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, EoError> + Send + 'static,
        R: Send + 'static,
    {
        enable_raw_mode().into_diagnostic()?;
        let restore = RestoreOnDrop(restore_terminal);
        io::stdout()
            .execute(EnterAlternateScreen)
            .into_diagnostic()?;

        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let monitored = self.monitor(&mut terminal, &rx);
        drop(terminal);
        drop(restore);
        let result = match monitored {
            Ok(result) => result,
            Err(err) => {
                self.cancel.cancel();
                return Err(err);
            }
        };
        handle.join().ok();

        match result {
            Some(result) => result.map_err(miette::Report::new),
            None => Err(miette::Report::msg("pipeline worker exited without a result")),
        }
    }

    fn monitor<R>(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        rx: &Receiver<Result<R, EoError>>,
    ) -> miette::Result<Option<Result<R, EoError>>> {
        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            match rx.try_recv() {
                Ok(result) => return Ok(Some(result)),
                Err(TryRecvError::Disconnected) => return Ok(None),
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    self.handle_key(key);
                }
            }
            tick = tick.wrapping_add(1);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                if !state.cancel_requested {
                    state.cancel_requested = true;
                    self.cancel.cancel();
                    push_bounded(
                        &mut state.logs,
                        "cancel requested; waiting for in-flight scenes".to_string(),
                        LOGS_MAX,
                    );
                }
            }
            KeyCode::F(4) | KeyCode::Char('l') => {
                state.view = match state.view {
                    View::Operational => View::Logs,
                    View::Logs => View::Operational,
                };
            }
            KeyCode::Up => self.log_scroll = self.log_scroll.saturating_add(1),
            KeyCode::Down => self.log_scroll = self.log_scroll.saturating_sub(1),
            _ => {}
        }
    }
}

struct RestoreOnDrop<F: FnMut()>(F);

impl<F: FnMut()> Drop for RestoreOnDrop<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = io::stdout().execute(LeaveAlternateScreen);
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &MonitorState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, state, tick), chunks[0]);

    let phase = Phase::from_percent(state.percent);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(phase.label()))
        .gauge_style(Style::default().fg(if phase == Phase::Done {
            Color::Green
        } else {
            Color::Cyan
        }))
        .percent(u16::from(state.percent));
    frame.render_widget(gauge, chunks[1]);

    match state.view {
        View::Operational => frame.render_widget(draw_status_panel(state), chunks[2]),
        View::Logs => frame.render_widget(draw_logs_view(state, tui.log_scroll), chunks[2]),
    }

    let keys = Paragraph::new(Line::from(Span::styled(
        "q/Esc cancel   l/F4 logs   Up/Down scroll",
        Style::default().fg(Color::Gray),
    )));
    frame.render_widget(keys, chunks[3]);
}

fn draw_header(tui: &Tui, state: &MonitorState, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let mut spans = vec![
        Span::styled(
            "EO-INDICES",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw(format!("   {}   ", tui.title)),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ];
    if state.cancel_requested {
        spans.push(Span::styled(
            "   cancelling",
            Style::default().fg(Color::Yellow),
        ));
    }
    Paragraph::new(Line::from(spans))
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &MonitorState) -> Paragraph<'static> {
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(vec![
            Span::styled("Scenes fetched: ", Style::default().fg(Color::Gray)),
            Span::raw(state.fetches.to_string()),
            Span::styled("   computing: ", Style::default().fg(Color::Gray)),
            Span::raw(state.computes.to_string()),
            Span::styled("   elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}s", state.started.elapsed().as_secs())),
        ]),
        Line::from(Span::styled(
            "Recent events:",
            Style::default().fg(Color::Gray),
        )),
    ];
    for event in state.events.iter().rev() {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Run"))
        .wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &MonitorState, scroll: u16) -> Paragraph<'static> {
    let lines: Vec<Line<'static>> = state
        .logs
        .iter()
        .map(|line| Line::from(line.clone()))
        .collect();
    let offset = (lines.len() as u16).saturating_sub(scroll.saturating_add(1));
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Progress log"))
        .scroll((offset.saturating_sub(10), 0))
        .wrap(Wrap { trim: false })
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_follows_milestones() {
        assert_eq!(Phase::from_percent(0), Phase::Validate);
        assert_eq!(Phase::from_percent(progress::QUERY_STARTED), Phase::Query);
        assert_eq!(Phase::from_percent(progress::SCENE_COMPUTE), Phase::Scenes);
        assert_eq!(Phase::from_percent(progress::ARCHIVED), Phase::Archive);
        assert_eq!(Phase::from_percent(progress::DONE), Phase::Done);
    }

    #[test]
    fn restore_runs_when_the_monitor_bails_out() {
        let restored = std::cell::Cell::new(0);
        let monitored = || -> Result<(), std::io::Error> {
            let _restore = RestoreOnDrop(|| restored.set(restored.get() + 1));
            std::fs::read("/nonexistent/eo-indices/terminal")?;
            Ok(())
        };

        assert!(monitored().is_err());
        assert_eq!(restored.get(), 1);
    }

    #[test]
    fn sink_counts_scene_events() {
        let tui = Tui::new("test", CancelToken::new());
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        sink.event(ProgressEvent {
            percent: 20,
            message: "fetching A".to_string(),
        });
        sink.event(ProgressEvent {
            percent: 40,
            message: "computing NDVI for A".to_string(),
        });
        let state = tui.state.lock().unwrap();
        assert_eq!((state.fetches, state.computes, state.percent), (1, 1, 40));
    }
}
