//! Simulation engine.
//!
//! One `SimEngine::run` call is one simulation: refresh the model script from
//! the remote repository, resolve the interpreter, execute the script against
//! the persisted dataset, and classify the captured output into a transcript.
//! Model-side problems never surface as `Err`; every path produces a
//! `RunRecord`.

use crate::fetcher;
use crate::model::{
    AppEvent, Artifact, InfoEvent, RunConfig, RunOutcome, RunRecord, INTERPRETER_ENV,
    INTERPRETER_FALLBACK,
};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Stop the run; the child process is killed.
    Cancel,
}

pub struct SimEngine {
    cfg: RunConfig,
}

enum Ended {
    Output(std::io::Result<std::process::Output>),
    Cancelled,
    TimedOut,
}

impl SimEngine {
    pub fn new(cfg: RunConfig) -> Self {
        Self { cfg }
    }

    pub async fn run(
        self,
        seq: u64,
        label: String,
        data_path: PathBuf,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        mut ctrl_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> RunRecord {
        // Refresh the model script first. A failed fetch is reported but does
        // not abort the run; whatever is on disk (stale or absent) is used.
        match fetcher::build_client(&self.cfg.user_agent) {
            Ok(client) => {
                let outcome = fetcher::fetch(
                    &client,
                    &self.cfg.artifact_url(Artifact::Model),
                    &self.cfg.artifact_path(Artifact::Model),
                )
                .await;
                if outcome.is_failed() {
                    let _ = event_tx.send(AppEvent::Info(InfoEvent::Message(outcome.to_message())));
                }
            }
            Err(e) => {
                let _ = event_tx.send(AppEvent::Info(InfoEvent::Message(format!(
                    "❌ Failed to refresh the model: {e:#}"
                ))));
            }
        }

        let interpreter = resolve_interpreter(self.cfg.interpreter.as_deref());
        let model_path = self.cfg.artifact_path(Artifact::Model);

        let mut cmd = Command::new(&interpreter);
        cmd.arg(&model_path)
            .arg(&data_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return self.record(
                    seq,
                    label,
                    RunOutcome::Failed,
                    format!("❌ Error running model: {e}"),
                )
            }
        };

        let wait = child.wait_with_output();
        tokio::pin!(wait);
        let deadline = async {
            match self.cfg.run_timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => futures::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        let cancelled = async {
            loop {
                match ctrl_rx.recv().await {
                    Some(EngineControl::Cancel) => break,
                    // A closed control channel is not a cancellation request.
                    None => futures::future::pending::<()>().await,
                }
            }
        };
        tokio::pin!(cancelled);

        // On the cancel and deadline paths the wait future is dropped, which
        // kills the child via kill_on_drop.
        let ended = tokio::select! {
            out = &mut wait => Ended::Output(out),
            _ = &mut deadline => Ended::TimedOut,
            _ = &mut cancelled => Ended::Cancelled,
        };

        let (outcome, transcript) = match ended {
            Ended::Output(Ok(out)) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                if !stderr.is_empty() {
                    // Any stderr content fails the run, whatever stdout says.
                    (
                        RunOutcome::Failed,
                        format!("❌ Model execution failed: {stderr}"),
                    )
                } else {
                    let stdout = String::from_utf8_lossy(&out.stdout);
                    (
                        RunOutcome::Success,
                        format!("✅ {label} completed successfully!\n\n{stdout}"),
                    )
                }
            }
            Ended::Output(Err(e)) => (
                RunOutcome::Failed,
                format!("❌ Error running model: {e}"),
            ),
            Ended::TimedOut => {
                let limit = humantime::format_duration(self.cfg.run_timeout.unwrap_or_default());
                (
                    RunOutcome::Failed,
                    format!("❌ Model execution failed: run exceeded the {limit} deadline and was stopped"),
                )
            }
            Ended::Cancelled => (
                RunOutcome::Failed,
                format!("❌ {label} was cancelled before completion"),
            ),
        };

        self.record(seq, label, outcome, transcript)
    }

    fn record(&self, seq: u64, label: String, outcome: RunOutcome, transcript: String) -> RunRecord {
        RunRecord {
            seq,
            label,
            outcome,
            transcript,
            timestamp_utc: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

/// Interpreter precedence: explicit config, then `CATAR_PYTHON`, then the
/// fixed fallback.
pub(crate) fn resolve_interpreter(config_override: Option<&str>) -> String {
    interpreter_from(config_override, std::env::var(INTERPRETER_ENV).ok().as_deref())
}

fn interpreter_from(flag: Option<&str>, env: Option<&str>) -> String {
    flag.or(env)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(INTERPRETER_FALLBACK)
        .to_string()
}
