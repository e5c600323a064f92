//! Per-session mutable state.
//!
//! Owned by the presentation layer's thread and passed explicitly to the
//! handlers that need it; nothing here is shared across threads. Records are
//! append-only for the life of the session.

use crate::model::{RunRecord, UploadedDataset};
use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Default)]
pub struct SessionState {
    uploaded: Option<UploadedDataset>,
    run_records: Vec<RunRecord>,
    run_counter: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a dataset, replacing any previous upload. Returns the
    /// confirmation message shown to the user.
    pub fn set_dataset(&mut self, dataset: UploadedDataset) -> String {
        let msg = format!("✅ Uploaded: {}", dataset.name);
        self.uploaded = Some(dataset);
        msg
    }

    pub fn dataset(&self) -> Option<&UploadedDataset> {
        self.uploaded.as_ref()
    }

    /// Claim the next sequence number and derive the run label. Returns None
    /// without touching the counter when no dataset is stored; the caller
    /// surfaces the validation error.
    pub fn begin_run(&mut self) -> Option<(u64, String)> {
        let name = self.uploaded.as_ref()?.name.clone();
        self.run_counter += 1;
        let label = format!("Simulation {} for {}", self.run_counter, name);
        Some((self.run_counter, label))
    }

    pub fn push_record(&mut self, record: RunRecord) {
        self.run_records.push(record);
    }

    pub fn run_records(&self) -> &[RunRecord] {
        &self.run_records
    }

    pub fn run_counter(&self) -> u64 {
        self.run_counter
    }

    /// Write the stored dataset to the fixed path the model reads from,
    /// overwriting the previous run's copy.
    pub fn persist_dataset(&self, path: &Path) -> Result<()> {
        let dataset = self
            .uploaded
            .as_ref()
            .context("no dataset stored in the session")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(path, &dataset.bytes).with_context(|| format!("write {}", path.display()))
    }

    /// Explicit clear-session action: drops the dataset, the log, and the
    /// counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunOutcome;

    fn dataset(name: &str, bytes: &[u8]) -> UploadedDataset {
        UploadedDataset {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    fn record(seq: u64, label: String) -> RunRecord {
        RunRecord {
            seq,
            label,
            outcome: RunOutcome::Success,
            transcript: String::new(),
            timestamp_utc: String::new(),
        }
    }

    #[test]
    fn sequence_numbers_are_monotonic_from_one() {
        let mut s = SessionState::new();
        s.set_dataset(dataset("my wine.xlsx", b"data"));
        for expected in 1..=5u64 {
            let (seq, label) = s.begin_run().unwrap();
            assert_eq!(seq, expected);
            assert_eq!(label, format!("Simulation {expected} for my wine.xlsx"));
            s.push_record(record(seq, label));
        }
        let seqs: Vec<u64> = s.run_records().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn run_without_upload_is_rejected_with_no_side_effects() {
        let mut s = SessionState::new();
        assert!(s.begin_run().is_none());
        assert_eq!(s.run_counter(), 0);
        assert!(s.run_records().is_empty());
    }

    #[test]
    fn reupload_replaces_the_stored_dataset() {
        let mut s = SessionState::new();
        s.set_dataset(dataset("first.xlsx", b"first"));
        let msg = s.set_dataset(dataset("second.xlsx", b"second"));
        assert!(msg.contains("second.xlsx"));
        assert_eq!(s.dataset().unwrap().name, "second.xlsx");
        assert_eq!(s.dataset().unwrap().bytes, b"second");
        let (_, label) = s.begin_run().unwrap();
        assert!(label.ends_with("for second.xlsx"));
    }

    #[test]
    fn persist_writes_only_the_latest_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Wine Data.xlsx");
        let mut s = SessionState::new();
        s.set_dataset(dataset("a.xlsx", b"old"));
        s.persist_dataset(&path).unwrap();
        s.set_dataset(dataset("b.xlsx", b"new"));
        s.persist_dataset(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn persist_without_dataset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = SessionState::new();
        assert!(s.persist_dataset(&dir.path().join("x")).is_err());
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = SessionState::new();
        s.set_dataset(dataset("a.xlsx", b"x"));
        let (seq, label) = s.begin_run().unwrap();
        s.push_record(record(seq, label));
        s.reset();
        assert!(s.dataset().is_none());
        assert!(s.run_records().is_empty());
        assert_eq!(s.run_counter(), 0);
        // A fresh session numbers from 1 again.
        s.set_dataset(dataset("b.xlsx", b"y"));
        assert_eq!(s.begin_run().unwrap().0, 1);
    }
}
