use crate::engine::{EngineControl, SimEngine};
use crate::fetcher;
use crate::model::{AppEvent, Artifact, RunConfig, RunOutcome, UploadedDataset};
use crate::session::SessionState;
use crate::transcript;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "catar-predict",
    version,
    about = "Calcium tartrate precipitation predictor front-end with optional TUI"
)]
pub struct Cli {
    /// Base URL of the artifact repository (template, model script, indicator image)
    #[arg(
        long,
        default_value = "https://github.com/GOUFANG2021/CalTarPrecip/raw/main"
    )]
    pub base_url: String,

    /// Directory for downloaded artifacts and the persisted dataset
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Interpreter used to execute the model script (overrides CATAR_PYTHON)
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Kill a run that exceeds this deadline (e.g. "10m")
    #[arg(long)]
    pub run_timeout: Option<humantime::Duration>,

    /// Run once against --data and print the transcript (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Dataset spreadsheet for --text mode
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Fetch the spreadsheet template into the workdir and exit (no TUI)
    #[arg(long)]
    pub fetch_template: bool,

    /// Export the session's run records as JSON
    #[arg(long)]
    pub transcripts_json: Option<PathBuf>,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.fetch_template {
        return fetch_template(&args).await;
    }
    if args.text {
        return run_text(args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        run_text(args).await
    }
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<RunConfig> {
    let workdir = match &args.workdir {
        Some(p) => p.clone(),
        None => dirs::data_local_dir()
            .context("no local data directory on this platform; pass --workdir")?
            .join("catar-predict"),
    };
    Ok(RunConfig {
        base_url: args.base_url.clone(),
        workdir,
        interpreter: args.interpreter.clone(),
        run_timeout: args.run_timeout.map(Duration::from),
        user_agent: format!("catar-predict/{}", env!("CARGO_PKG_VERSION")),
    })
}

/// `--fetch-template`: download the template and report where it landed.
async fn fetch_template(args: &Cli) -> Result<()> {
    let cfg = build_config(args)?;
    let client = fetcher::build_client(&cfg.user_agent)?;
    let outcome = fetcher::fetch(
        &client,
        &cfg.artifact_url(Artifact::Template),
        &cfg.artifact_path(Artifact::Template),
    )
    .await;
    println!("{}", outcome.to_message());
    if outcome.is_failed() {
        std::process::exit(1);
    }
    println!(
        "Template saved to {}",
        cfg.artifact_path(Artifact::Template).display()
    );
    Ok(())
}

/// One-shot mode: load the dataset, run a single simulation, print the
/// transcript on stdout. Progress and fetch messages go to stderr. Exits with
/// code 1 when the run fails.
async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let data = args
        .data
        .clone()
        .context("--text mode requires --data <spreadsheet>")?;

    let bytes = std::fs::read(&data).with_context(|| format!("read {}", data.display()))?;
    let name = data
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| data.display().to_string());

    let mut session = SessionState::new();
    session.set_dataset(UploadedDataset { name, bytes });

    // Session-start artifact refresh. The template lands first so the
    // persisted dataset can overwrite it at the shared fixed path.
    let client = fetcher::build_client(&cfg.user_agent)?;
    for artifact in [Artifact::Template, Artifact::Indicator] {
        let outcome = fetcher::fetch(
            &client,
            &cfg.artifact_url(artifact),
            &cfg.artifact_path(artifact),
        )
        .await;
        eprintln!("{}", outcome.to_message());
    }

    let (seq, label) = session
        .begin_run()
        .context("no dataset stored in the session")?;
    session.persist_dataset(&cfg.dataset_path())?;

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    let engine = SimEngine::new(cfg.clone());
    let data_path = cfg.dataset_path();
    let handle =
        tokio::spawn(async move { engine.run(seq, label, data_path, evt_tx, ctrl_rx).await });

    // Drain engine messages until it finishes; Ctrl-C cancels the run.
    loop {
        tokio::select! {
            ev = evt_rx.recv() => match ev {
                Some(AppEvent::Info(info)) => eprintln!("{}", info.to_message()),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Cancelling the current simulation…");
                let _ = ctrl_tx.send(EngineControl::Cancel);
            }
        }
    }

    let record = handle.await.context("simulation task failed")?;
    for line in transcript::render_record(&record) {
        println!("{line}");
    }
    if let Some(p) = args.transcripts_json.as_deref() {
        transcript::export_json(p, std::slice::from_ref(&record))?;
        eprintln!("Saved: {}", p.display());
    }
    if record.outcome == RunOutcome::Failed {
        std::process::exit(1);
    }
    Ok(())
}
