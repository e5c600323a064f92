mod help;

use crate::cli::{build_config, Cli};
use crate::model::{AppEvent, Artifact, InfoEvent, RunConfig, RunOutcome, UploadedDataset};
use crate::orchestrator::{self, UiCommand};
use crate::session::SessionState;
use crate::transcript;
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
    widgets::{Block, Borders, Paragraph, Wrap},
    Terminal,
};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const INTERPRETATION: &str = "It is recommended that wines with a supersaturation ratio in the \
high-risk range should be treated to prevent calcium tartrate formation. It is possible for \
medium-risk wines to form calcium tartrate, but most wines in this range will not require \
treatment.";

const OUT_OF_RANGE_WARNING: &str = "⚠️ The model may not find a solution if the input data falls \
outside the simulation range. If this occurs, please load a new Excel file with the same format.";

const RUNNING_NOTICE: &str =
    "⏳ The simulation can take a few minutes. It will always stop by itself when finished.";

const NO_DATASET_ERROR: &str = "⚠️ Please upload a wine data file before running the model.";

struct UiState {
    cfg: RunConfig,
    session: SessionState,
    info: String,
    run_active: bool,
    active_label: Option<String>,
    template_ready: bool,
    indicator_ready: bool,
    log_scroll: usize,
    follow_tail: bool,
    /// Some while the dataset path prompt is open; holds the typed path.
    input: Option<String>,
    show_help: bool,
}

impl UiState {
    fn new(cfg: RunConfig) -> Self {
        Self {
            cfg,
            session: SessionState::new(),
            info: String::new(),
            run_active: false,
            active_label: None,
            template_ready: false,
            indicator_ready: false,
            log_scroll: 0,
            follow_tail: true,
            input: None,
            show_help: false,
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    // Unbounded channels: command and event volumes are tiny.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the
    // Tokio runtime; the controller owns every network and child-process op.
    let ui_cfg = cfg.clone();
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, ui_cfg, event_rx, cmd_tx));

    let res = orchestrator::run_controller(&cfg, event_tx, cmd_rx).await;

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
    args: Cli,
    cfg: RunConfig,
    mut event_rx: UnboundedReceiver<AppEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::new(cfg);
    // Session-start freshness: template and indicator are fetched once here
    // and again only on explicit refresh.
    let _ = cmd_tx.send(UiCommand::RefreshArtifacts);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the loop responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
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
                if state.input.is_some() {
                    handle_prompt_key(&mut state, k.code);
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('t')) => {
                        state.info = "Fetching the data template…".into();
                        let _ = cmd_tx.send(UiCommand::FetchTemplate);
                    }
                    (_, KeyCode::Char('f')) => {
                        state.info = "Refreshing template and indicator…".into();
                        let _ = cmd_tx.send(UiCommand::RefreshArtifacts);
                    }
                    (_, KeyCode::Char('l')) => {
                        state.input = Some(String::new());
                    }
                    (_, KeyCode::Char('r')) => {
                        trigger_run(&mut state, &cmd_tx);
                    }
                    (_, KeyCode::Char('c')) => {
                        if state.run_active {
                            let _ = cmd_tx.send(UiCommand::Cancel);
                        }
                    }
                    (_, KeyCode::Char('x')) => {
                        if state.run_active {
                            state.info =
                                "⚠️ Cannot clear the session while a simulation is running.".into();
                        } else {
                            state.session.reset();
                            state.log_scroll = 0;
                            state.follow_tail = true;
                            state.info = "Session cleared.".into();
                        }
                    }
                    (_, KeyCode::Char('?')) => {
                        state.show_help = !state.show_help;
                    }
                    (_, KeyCode::Up) => {
                        state.follow_tail = false;
                        state.log_scroll = state.log_scroll.saturating_sub(1);
                    }
                    (_, KeyCode::Down) => {
                        state.log_scroll = state.log_scroll.saturating_add(1);
                    }
                    (_, KeyCode::PageUp) => {
                        state.follow_tail = false;
                        state.log_scroll = state.log_scroll.saturating_sub(10);
                    }
                    (_, KeyCode::PageDown) => {
                        state.log_scroll = state.log_scroll.saturating_add(10);
                    }
                    (_, KeyCode::Home) => {
                        state.follow_tail = false;
                        state.log_scroll = 0;
                    }
                    (_, KeyCode::End) => {
                        state.follow_tail = true;
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();

    if let Some(p) = args.transcripts_json.as_deref() {
        transcript::export_json(p, state.session.run_records())?;
        eprintln!("Saved: {}", p.display());
    }

    res
}

/// Keys for the dataset path prompt.
fn handle_prompt_key(state: &mut UiState, code: KeyCode) {
    match code {
        KeyCode::Esc => {
            state.input = None;
        }
        KeyCode::Enter => {
            if let Some(path) = state.input.take() {
                load_dataset(state, path.trim());
            }
        }
        KeyCode::Backspace => {
            if let Some(buf) = state.input.as_mut() {
                buf.pop();
            }
        }
        KeyCode::Char(c) => {
            if let Some(buf) = state.input.as_mut() {
                buf.push(c);
            }
        }
        _ => {}
    }
}

/// Read a local spreadsheet into the session, replacing any previous upload.
fn load_dataset(state: &mut UiState, path: &str) {
    if path.is_empty() {
        return;
    }
    let path = std::path::Path::new(path);
    let is_xlsx = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);
    if !is_xlsx {
        state.info = "⚠️ Please choose an Excel (.xlsx) file.".into();
        return;
    }
    match std::fs::read(path) {
        Ok(bytes) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            state.info = state.session.set_dataset(UploadedDataset { name, bytes });
        }
        Err(e) => {
            state.info = format!("❌ Could not read {}: {e}", path.display());
        }
    }
}

/// Run trigger: validation, counter claim, dataset persistence, then hand the
/// run to the controller.
fn trigger_run(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>) {
    if state.run_active {
        state.info = InfoEvent::RunInProgress.to_message();
        return;
    }
    match state.session.begin_run() {
        None => {
            state.info = NO_DATASET_ERROR.into();
        }
        Some((seq, label)) => {
            if let Err(e) = state.session.persist_dataset(&state.cfg.dataset_path()) {
                state.info = format!("❌ Could not save the dataset: {e:#}");
                return;
            }
            state.run_active = true;
            state.active_label = Some(label.clone());
            state.info = RUNNING_NOTICE.into();
            let _ = cmd_tx.send(UiCommand::Run {
                seq,
                label,
                data_path: state.cfg.dataset_path(),
            });
        }
    }
}

fn apply_event(state: &mut UiState, ev: AppEvent) {
    match ev {
        AppEvent::ArtifactFetched { artifact, outcome } => {
            let ok = !outcome.is_failed();
            match artifact {
                Artifact::Template => state.template_ready = ok,
                Artifact::Indicator => state.indicator_ready = ok,
                Artifact::Model => {}
            }
            if ok {
                if artifact == Artifact::Template {
                    state.info = format!(
                        "📥 Template ready: {}",
                        state.cfg.artifact_path(Artifact::Template).display()
                    );
                }
            } else {
                state.info = outcome.to_message();
            }
        }
        AppEvent::Info(info) => {
            state.info = info.to_message();
        }
        AppEvent::RunCompleted { record } => {
            state.run_active = false;
            state.active_label = None;
            state.info = match record.outcome {
                RunOutcome::Success => {
                    format!("✅ {} completed! Check results on the right.", record.label)
                }
                RunOutcome::Failed => {
                    format!("❌ {} failed. See the results log.", record.label)
                }
            };
            state.session.push_record(*record);
            state.follow_tail = true;
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let title = Paragraph::new(Line::from(Span::styled(
        "🍷 Calcium Tartrate Precipitation Predictor",
        Style::default().fg(Color::Magenta),
    )));
    f.render_widget(title, rows[0]);

    if state.show_help {
        help::draw_help(rows[1], f);
    } else {
        draw_dashboard(rows[1], f, state);
    }

    let hints = if state.input.is_some() {
        "enter load  esc cancel"
    } else {
        "q quit  t template  l load data  r run  c cancel run  x clear  f refresh  ? help  ↑/↓ scroll"
    };
    let footer = Paragraph::new(Line::from(Span::styled(
        hints,
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(footer, rows[2]);
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    draw_workflow(cols[0], f, state);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(10)])
        .split(cols[1]);
    draw_results(right[0], f, state);
    draw_interpretation(right[1], f, state);
}

fn info_style(info: &str) -> Style {
    if info.starts_with('❌') {
        Style::default().fg(Color::Red)
    } else if info.starts_with('⚠') {
        Style::default().fg(Color::Yellow)
    } else if info.starts_with('✅') {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Gray)
    }
}

fn draw_workflow(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        "Step 1: Download the data format and enter your wine information.",
        Style::default().fg(Color::Cyan),
    )));
    let template_path = state.cfg.artifact_path(Artifact::Template);
    lines.push(Line::from(if state.template_ready {
        format!("  📥 Template: {}", template_path.display())
    } else {
        "  Template not downloaded yet (press t).".to_string()
    }));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Step 2: Upload your modified wine data (Excel).",
        Style::default().fg(Color::Cyan),
    )));
    lines.push(Line::from(match state.session.dataset() {
        Some(ds) => format!("  📤 Loaded: {}", ds.name),
        None => "  No dataset loaded yet (press l).".to_string(),
    }));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Step 3: Run the model.",
        Style::default().fg(Color::Cyan),
    )));
    lines.push(Line::from(match &state.active_label {
        Some(label) => format!("  ⏳ {label} is running… (press c to cancel)"),
        None => "  Press r to run the model against the loaded data.".to_string(),
    }));
    lines.push(Line::from(""));

    if let Some(buf) = &state.input {
        lines.push(Line::from(vec![
            Span::styled("Dataset path: ", Style::default().fg(Color::Gray)),
            Span::raw(buf.clone()),
            Span::styled("▏", Style::default().fg(Color::Magenta)),
        ]));
        lines.push(Line::from(""));
    }

    if !state.info.is_empty() {
        lines.push(Line::from(Span::styled(
            state.info.clone(),
            info_style(&state.info),
        )));
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Workflow"));
    f.render_widget(p, area);
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let records = state.session.run_records();
    let lines: Vec<Line> = transcript::render_log(records)
        .into_iter()
        .map(|l| {
            if l.starts_with("###") {
                Line::from(Span::styled(l, Style::default().fg(Color::Cyan)))
            } else {
                Line::from(l)
            }
        })
        .collect();

    let visible = area.height.saturating_sub(2) as usize;
    let max_scroll = lines.len().saturating_sub(visible);
    let scroll = if state.follow_tail {
        max_scroll
    } else {
        state.log_scroll.min(max_scroll)
    };

    let title = format!("📊 Simulation Results ({})", records.len());
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_interpretation(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let indicator_line = if state.indicator_ready {
        format!(
            "Indicator image: {}",
            state.cfg.artifact_path(Artifact::Indicator).display()
        )
    } else {
        "Indicator image not downloaded yet (press f).".to_string()
    };
    let p = Paragraph::new(vec![
        Line::from(INTERPRETATION),
        Line::from(""),
        Line::from(Span::styled(
            indicator_line,
            Style::default().fg(Color::Gray),
        )),
        Line::from(""),
        Line::from(Span::styled(
            OUT_OF_RANGE_WARNING,
            Style::default().fg(Color::Yellow),
        )),
    ])
    .wrap(Wrap { trim: false })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("📌 Interpretation"),
    );
    f.render_widget(p, area);
}
