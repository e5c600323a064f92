use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted for the model interpreter when no
/// `--interpreter` flag is given.
pub const INTERPRETER_ENV: &str = "CATAR_PYTHON";
/// Fixed fallback interpreter when neither flag nor environment is set.
pub const INTERPRETER_FALLBACK: &str = "python3";

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Base URL of the artifact repository (template, model script, image).
    pub base_url: String,
    /// Directory holding all downloaded artifacts and the persisted dataset.
    pub workdir: PathBuf,
    /// Explicit interpreter override; takes precedence over `CATAR_PYTHON`.
    pub interpreter: Option<String>,
    /// Kill a run that exceeds this deadline. None means no deadline.
    pub run_timeout: Option<Duration>,
    pub user_agent: String,
}

/// The three fixed remote artifacts this front-end works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Spreadsheet template the user fills in.
    Template,
    /// The external model script, executed as a child process.
    Model,
    /// Static risk-indicator image referenced by the interpretation note.
    Indicator,
}

impl Artifact {
    /// Path component under the repository base URL.
    pub fn remote_name(self) -> &'static str {
        match self {
            Artifact::Template => "Wine%20Data.xlsx",
            Artifact::Model => "CaTar_Model.py",
            Artifact::Indicator => "indicator.png",
        }
    }

    /// File name under the workdir. The persisted dataset deliberately shares
    /// the template's name; each run overwrites it.
    pub fn local_name(self) -> &'static str {
        match self {
            Artifact::Template => "Wine Data.xlsx",
            Artifact::Model => "CaTar_Model.py",
            Artifact::Indicator => "indicator.png",
        }
    }
}

impl RunConfig {
    pub fn artifact_url(&self, artifact: Artifact) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            artifact.remote_name()
        )
    }

    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        self.workdir.join(artifact.local_name())
    }

    /// Fixed path the uploaded dataset is persisted to before each run.
    pub fn dataset_path(&self) -> PathBuf {
        self.artifact_path(Artifact::Template)
    }
}

/// Result of one artifact download. Transport problems are an outcome, not an
/// error: callers decide whether to proceed with whatever is on disk.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Done,
    Failed { file: String, error: String },
}

impl FetchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed { .. })
    }

    pub fn to_message(&self) -> String {
        match self {
            FetchOutcome::Done => "✅ The data has been downloaded successfully!".to_string(),
            FetchOutcome::Failed { file, error } => {
                format!("❌ Failed to download {file}: {error}")
            }
        }
    }
}

/// A dataset supplied by the user. Owned by the session until replaced.
#[derive(Debug, Clone)]
pub struct UploadedDataset {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    Failed,
}

/// One completed simulation. Immutable once created; appended to the session
/// log in completion order and never evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Monotonic per-session sequence number, starting at 1.
    pub seq: u64,
    /// "Simulation N for <dataset file>".
    pub label: String,
    pub outcome: RunOutcome,
    pub transcript: String,
    #[serde(default)]
    pub timestamp_utc: String,
}

#[derive(Debug)]
pub enum AppEvent {
    ArtifactFetched {
        artifact: Artifact,
        outcome: FetchOutcome,
    },
    Info(InfoEvent),
    RunCompleted {
        // Box to keep AppEvent small; transcripts can be large.
        record: Box<RunRecord>,
    },
}

/// Structured info events emitted by the controller/engine and rendered by
/// the presentation layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    RunInProgress,
    Cancelling,
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::RunInProgress => {
                "⏳ A simulation is already running. Please wait for it to finish.".to_string()
            }
            InfoEvent::Cancelling => "Cancelling the current simulation…".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(base_url: &str) -> RunConfig {
        RunConfig {
            base_url: base_url.to_string(),
            workdir: PathBuf::from("/tmp/catar"),
            interpreter: None,
            run_timeout: None,
            user_agent: "test".into(),
        }
    }

    #[test]
    fn artifact_urls_join_base_without_double_slash() {
        let c = cfg("https://example.com/repo/");
        assert_eq!(
            c.artifact_url(Artifact::Model),
            "https://example.com/repo/CaTar_Model.py"
        );
        let c = cfg("https://example.com/repo");
        assert_eq!(
            c.artifact_url(Artifact::Template),
            "https://example.com/repo/Wine%20Data.xlsx"
        );
    }

    #[test]
    fn dataset_persists_over_the_template_path() {
        let c = cfg("https://example.com");
        assert_eq!(c.dataset_path(), c.artifact_path(Artifact::Template));
        assert!(c.dataset_path().ends_with("Wine Data.xlsx"));
    }

    #[test]
    fn fetch_failure_message_names_the_file() {
        let out = FetchOutcome::Failed {
            file: "indicator.png".into(),
            error: "connection refused".into(),
        };
        assert!(out.is_failed());
        let msg = out.to_message();
        assert!(msg.contains("indicator.png"));
        assert!(msg.contains("connection refused"));
    }
}
