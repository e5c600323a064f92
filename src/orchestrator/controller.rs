//! Run lifecycle controller.
//!
//! Owns start/cancel orchestration and artifact refreshes, and emits events
//! for presentation layers. Runs are serialized: a trigger while a simulation
//! is active is refused, so records always complete in trigger order.

use crate::engine::{EngineControl, SimEngine};
use crate::fetcher;
use crate::model::{AppEvent, Artifact, InfoEvent, RunConfig, RunRecord};
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI/CLI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Run {
        seq: u64,
        label: String,
        data_path: PathBuf,
    },
    Cancel,
    FetchTemplate,
    RefreshArtifacts,
    Quit,
}

/// Internal handle for a running simulation task.
struct RunCtx {
    ctrl_tx: UnboundedSender<EngineControl>,
    handle: Option<tokio::task::JoinHandle<RunRecord>>,
}

fn start_run(
    cfg: &RunConfig,
    seq: u64,
    label: String,
    data_path: PathBuf,
    event_tx: UnboundedSender<AppEvent>,
) -> RunCtx {
    let (ctrl_tx, ctrl_rx) = tokio::sync::mpsc::unbounded_channel::<EngineControl>();
    let engine = SimEngine::new(cfg.clone());
    let handle = tokio::spawn(async move { engine.run(seq, label, data_path, event_tx, ctrl_rx).await });
    RunCtx {
        ctrl_tx,
        handle: Some(handle),
    }
}

async fn fetch_artifact(
    client: &reqwest::Client,
    cfg: &RunConfig,
    artifact: Artifact,
    event_tx: &UnboundedSender<AppEvent>,
) {
    let outcome = fetcher::fetch(
        client,
        &cfg.artifact_url(artifact),
        &cfg.artifact_path(artifact),
    )
    .await;
    let _ = event_tx.send(AppEvent::ArtifactFetched { artifact, outcome });
}

/// Drive simulations and artifact refreshes from UI commands, emitting events
/// back to presentation layers.
pub(crate) async fn run_controller(
    cfg: &RunConfig,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let client = fetcher::build_client(&cfg.user_agent)?;
    let mut run_ctx: Option<RunCtx> = None;
    let mut quit_pending = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Run { seq, label, data_path }) => {
                        if run_ctx.is_some() {
                            let _ = event_tx.send(AppEvent::Info(InfoEvent::RunInProgress));
                        } else {
                            run_ctx = Some(start_run(cfg, seq, label, data_path, event_tx.clone()));
                        }
                    }
                    Some(UiCommand::Cancel) => {
                        if let Some(ctx) = &run_ctx {
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                            let _ = event_tx.send(AppEvent::Info(InfoEvent::Cancelling));
                        }
                    }
                    Some(UiCommand::FetchTemplate) => {
                        fetch_artifact(&client, cfg, Artifact::Template, &event_tx).await;
                    }
                    Some(UiCommand::RefreshArtifacts) => {
                        fetch_artifact(&client, cfg, Artifact::Template, &event_tx).await;
                        fetch_artifact(&client, cfg, Artifact::Indicator, &event_tx).await;
                    }
                    // Quit waits for the active run to finish so the final
                    // record is still delivered.
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        if let Some(ctx) = &run_ctx {
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                        } else {
                            break;
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it
            // can be dropped when another branch is chosen and completion is
            // never observed.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    if let Some(ctx) = &mut run_ctx {
                        ctx.handle.take();
                    }
                    match join_res {
                        Ok(record) => {
                            let _ = event_tx.send(AppEvent::RunCompleted { record: Box::new(record) });
                        }
                        Err(e) => {
                            let _ = event_tx.send(AppEvent::Info(InfoEvent::Message(format!(
                                "Run join failed: {e}"
                            ))));
                        }
                    }
                    run_ctx = None;
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunOutcome;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(dir: &tempfile::TempDir, script: &str) -> RunConfig {
        let cfg = RunConfig {
            base_url: "http://127.0.0.1:9".into(),
            workdir: dir.path().to_path_buf(),
            interpreter: Some("/bin/sh".into()),
            run_timeout: None,
            user_agent: "test".into(),
        };
        std::fs::write(cfg.artifact_path(Artifact::Model), script).unwrap();
        std::fs::write(cfg.dataset_path(), b"rows").unwrap();
        cfg
    }

    #[tokio::test]
    async fn sequential_runs_complete_in_trigger_order() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg(&dir, "echo done\n");
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = {
            let cfg = cfg.clone();
            tokio::spawn(async move { run_controller(&cfg, evt_tx, cmd_rx).await })
        };

        let mut seen = Vec::new();
        for seq in 1..=3u64 {
            cmd_tx
                .send(UiCommand::Run {
                    seq,
                    label: format!("Simulation {seq} for wine.xlsx"),
                    data_path: cfg.dataset_path(),
                })
                .unwrap();
            // Wait for this run's completion before triggering the next.
            loop {
                match evt_rx.recv().await.expect("controller stopped early") {
                    AppEvent::RunCompleted { record } => {
                        assert_eq!(record.outcome, RunOutcome::Success);
                        seen.push(record.seq);
                        break;
                    }
                    _ => continue,
                }
            }
        }
        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn artifact_refresh_fetches_template_and_indicator_without_a_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Wine%20Data.xlsx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"template".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indicator.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            base_url: server.uri(),
            workdir: dir.path().to_path_buf(),
            interpreter: Some("/bin/sh".into()),
            run_timeout: None,
            user_agent: "test".into(),
        };
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = {
            let cfg = cfg.clone();
            tokio::spawn(async move { run_controller(&cfg, evt_tx, cmd_rx).await })
        };

        cmd_tx.send(UiCommand::RefreshArtifacts).unwrap();
        let mut fetched = Vec::new();
        while fetched.len() < 2 {
            if let AppEvent::ArtifactFetched { artifact, outcome } =
                evt_rx.recv().await.expect("controller stopped early")
            {
                assert!(!outcome.is_failed(), "fetch failed: {}", outcome.to_message());
                fetched.push(artifact);
            }
        }
        assert_eq!(fetched, vec![Artifact::Template, Artifact::Indicator]);
        assert_eq!(
            std::fs::read(cfg.artifact_path(Artifact::Template)).unwrap(),
            b"template"
        );
        assert!(cfg.artifact_path(Artifact::Indicator).exists());

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn overlapping_trigger_is_refused_while_a_run_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg(&dir, "sleep 30\n");
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = {
            let cfg = cfg.clone();
            tokio::spawn(async move { run_controller(&cfg, evt_tx, cmd_rx).await })
        };

        let run = |seq: u64| UiCommand::Run {
            seq,
            label: format!("Simulation {seq} for wine.xlsx"),
            data_path: cfg.dataset_path(),
        };
        cmd_tx.send(run(1)).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cmd_tx.send(run(2)).unwrap();

        // The second trigger must be refused, not queued.
        loop {
            match evt_rx.recv().await.expect("controller stopped early") {
                AppEvent::Info(InfoEvent::RunInProgress) => break,
                AppEvent::RunCompleted { .. } => panic!("sleeping run completed unexpectedly"),
                _ => continue,
            }
        }

        // Quit cancels the active run and still delivers its record.
        cmd_tx.send(UiCommand::Quit).unwrap();
        let mut cancelled_record = None;
        while let Some(ev) = evt_rx.recv().await {
            if let AppEvent::RunCompleted { record } = ev {
                cancelled_record = Some(record);
            }
        }
        ctl.await.unwrap().unwrap();
        let record = cancelled_record.expect("cancelled run should still produce a record");
        assert_eq!(record.seq, 1);
        assert_eq!(record.outcome, RunOutcome::Failed);
    }
}
