use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use linkpulse_core::{ButtonFeed, ButtonId, Mode, StatusFrame};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph};
use ratatui::Terminal;
use tokio::sync::watch;

use crate::report::{bar, hearts};

const SERIES: [(&str, Color); 3] = [
    ("Latency (ms)", Color::Yellow),
    ("Jitter (ms)", Color::Cyan),
    ("Loss (%)", Color::Red),
];

struct MetricSeries {
    label: &'static str,
    color: Color,
    points: VecDeque<(f64, f64)>,
}

impl MetricSeries {
    fn new(label: &'static str, color: Color) -> Self {
        Self {
            label,
            color,
            points: VecDeque::new(),
        }
    }

    fn push(&mut self, x: f64, y: f64, window_sec: f64) {
        self.points.push_back((x, y));
        while let Some((old_x, _)) = self.points.front() {
            if x - old_x > window_sec {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    fn bounds(&self) -> [f64; 2] {
        let max = self.points.iter().map(|(_, y)| *y).fold(0.0_f64, f64::max);
        // metrics are never negative, keep zero on the axis
        if max < f64::EPSILON {
            [0.0, 1.0]
        } else {
            [0.0, max * 1.12]
        }
    }
}

struct ViewerState {
    start: Instant,
    latest: Option<Arc<StatusFrame>>,
    samples_seen: u64,
    series: [MetricSeries; 3],
}

impl ViewerState {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            latest: None,
            samples_seen: 0,
            series: SERIES.map(|(label, color)| MetricSeries::new(label, color)),
        }
    }

    fn update(&mut self, frame: Arc<StatusFrame>, window_sec: f64) {
        let snapshot = &frame.snapshot;
        if snapshot.samples_taken > self.samples_seen {
            self.samples_seen = snapshot.samples_taken;
            if let Some(sample) = snapshot.last_sample {
                let t = self.start.elapsed().as_secs_f64();
                // unanswered batches carry no latency or jitter
                if sample.answered > 0 {
                    self.series[0].push(t, sample.latency_ms, window_sec);
                    self.series[1].push(t, sample.jitter_ms, window_sec);
                }
                self.series[2].push(t, sample.loss_pct, window_sec);
            }
        }
        self.latest = Some(frame);
    }
}

pub async fn run_viewer(
    mut frames: watch::Receiver<Arc<StatusFrame>>,
    feed: ButtonFeed,
    window_sec: f64,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = ViewerState::new();
    state.update(Arc::clone(&frames.borrow_and_update()), window_sec);

    let run_result = async {
        loop {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char(c) => {
                            if let Some(button) = button_for_key(c) {
                                feed.press(button);
                            }
                        }
                        _ => {}
                    }
                }
            }

            match frames.has_changed() {
                Ok(true) => {
                    let frame = Arc::clone(&frames.borrow_and_update());
                    state.update(frame, window_sec);
                }
                Ok(false) => {}
                // appliance stopped
                Err(_) => break,
            }

            terminal.draw(|frame| draw_ui(frame.size(), frame, &state, window_sec))?;
            tokio::task::yield_now().await;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

pub(crate) fn button_for_key(key: char) -> Option<ButtonId> {
    match key.to_ascii_lowercase() {
        'a' => Some(ButtonId::A),
        'b' => Some(ButtonId::B),
        'x' => Some(ButtonId::X),
        'y' => Some(ButtonId::Y),
        _ => None,
    }
}

fn draw_ui(area: Rect, frame: &mut ratatui::Frame<'_>, state: &ViewerState, window_sec: f64) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    frame.render_widget(render_header(state, window_sec), rows[0]);

    let Some(latest) = &state.latest else {
        return;
    };

    let levels = [latest.bars.latency, latest.bars.jitter, latest.bars.loss];
    let bars = state
        .series
        .iter()
        .zip(levels)
        .map(|(series, level)| {
            Line::from(vec![
                Span::raw(format!("{:<14}", series.label)),
                Span::styled(bar(level), Style::default().fg(series.color)),
            ])
        })
        .collect::<Vec<_>>();
    frame.render_widget(
        Paragraph::new(bars).block(Block::default().borders(Borders::ALL).title("Health bars")),
        rows[1],
    );

    let now_sec = state.start.elapsed().as_secs_f64();
    // screen 1 shows every chart, later screens one metric each
    match usize::from(latest.screen) {
        n @ 2..=4 => render_metric_chart(frame, rows[2], &state.series[n - 2], now_sec, window_sec),
        _ => {
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Ratio(1, 3),
                    Constraint::Ratio(1, 3),
                    Constraint::Ratio(1, 3),
                ])
                .split(rows[2]);
            for (series, col) in state.series.iter().zip(cols.iter().copied()) {
                render_metric_chart(frame, col, series, now_sec, window_sec);
            }
        }
    }
}

fn render_header(state: &ViewerState, window_sec: f64) -> Paragraph<'static> {
    let mut lines = Vec::new();
    if let Some(frame) = &state.latest {
        let health = frame.health;
        let snapshot = &frame.snapshot;
        let mode = frame.mode.map_or_else(|| "starting".to_string(), |mode| mode.to_string());
        let throughput = &snapshot.throughput;
        let speed = if throughput.in_progress {
            "speed test running".to_string()
        } else if throughput.ts.is_some() {
            format!(
                "down {:.1} Mbps  up {:.1} Mbps",
                throughput.download_mbps, throughput.upload_mbps
            )
        } else {
            "speed not measured yet".to_string()
        };

        lines.push(Line::from(vec![
            Span::styled(
                format!("{} {} ", health.score, health.state.label()),
                Style::default().fg(state_color(frame)).add_modifier(Modifier::BOLD),
            ),
            Span::styled(hearts(health.state.hearts()), Style::default().fg(Color::Red)),
            Span::raw(format!("  {}", health.state.message())),
        ]));
        lines.push(Line::from(format!(
            "mode={mode}  screen={}  target={} via {}  samples={}",
            frame.screen, snapshot.target, snapshot.interface, snapshot.samples_taken
        )));
        lines.push(Line::from(format!("{speed}  window={}s", window_sec as u64)));
    } else {
        lines.push(Line::from("Waiting for first sample..."));
    }

    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("linkpulse  (a/b/x/y buttons, q quits)"),
    )
}

fn state_color(frame: &StatusFrame) -> Color {
    match frame.mode {
        Some(Mode::Degraded) => Color::Red,
        Some(Mode::Provisioning) => Color::Magenta,
        _ => match frame.health.state.hearts() {
            4..=5 => Color::Green,
            3 => Color::Yellow,
            _ => Color::Red,
        },
    }
}

fn render_metric_chart(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    series: &MetricSeries,
    now_sec: f64,
    window_sec: f64,
) {
    let points: Vec<(f64, f64)> = series.points.iter().copied().collect();

    let x_min = (now_sec - window_sec).max(0.0);
    let x_max = now_sec.max(window_sec);
    let y_bounds = series.bounds();

    let dataset = Dataset::default()
        .name(series.label)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(series.color))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .block(Block::default().borders(Borders::ALL).title(series.label))
        .x_axis(
            Axis::default()
                .title("time (s)")
                .style(Style::default().fg(Color::Gray))
                .bounds([x_min, x_max])
                .labels(vec![
                    Span::raw(format!("{x_min:.0}")),
                    Span::raw(format!("{x_max:.0}")),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(vec![
                    Span::raw(format!("{:.1}", y_bounds[0])),
                    Span::raw(format!("{:.1}", y_bounds[1])),
                ]),
        );

    frame.render_widget(chart, area);
}
