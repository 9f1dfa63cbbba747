//! Persisted undo log: a JSON array of batches, each an object mapping the
//! original absolute path to the new one.
//!
//! The whole file is read, modified and rewritten on every batch and every
//! undo without locking, so only one invocation may touch a given log at a
//! time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRecord {
    pub original: PathBuf,
    pub renamed: PathBuf,
}

/// Successful renames of one invocation, keyed by original path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenameBatch {
    entries: BTreeMap<PathBuf, PathBuf>,
}

impl RenameBatch {
    pub fn insert(&mut self, record: RenameRecord) {
        self.entries.insert(record.original, record.renamed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, original: &Path) -> Option<&Path> {
        self.entries.get(original).map(PathBuf::as_path)
    }

    pub fn records(&self) -> impl DoubleEndedIterator<Item = RenameRecord> + '_ {
        self.entries.iter().map(|(original, renamed)| RenameRecord {
            original: original.clone(),
            renamed: renamed.clone(),
        })
    }
}

impl FromIterator<RenameRecord> for RenameBatch {
    fn from_iter<I: IntoIterator<Item = RenameRecord>>(iter: I) -> Self {
        let mut batch = RenameBatch::default();
        for record in iter {
            batch.insert(record);
        }
        batch
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UndoLog {
    batches: Vec<RenameBatch>,
}

impl UndoLog {
    pub fn push(&mut self, batch: RenameBatch) {
        self.batches.push(batch);
    }

    pub fn pop(&mut self) -> Option<RenameBatch> {
        self.batches.pop()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn batches(&self) -> &[RenameBatch] {
        &self.batches
    }
}

/// A missing or blank file is an empty log.
pub fn load_history(path: &Path) -> Result<UndoLog> {
    if !path.exists() {
        return Ok(UndoLog::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read undo log: {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(UndoLog::default());
    }

    serde_json::from_str::<UndoLog>(&raw)
        .with_context(|| format!("undo log is corrupt: {}", path.display()))
}

pub fn save_history(path: &Path, log: &UndoLog) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("could not create undo log directory: {}", parent.display())
        })?;
    }

    let body = serde_json::to_string_pretty(log).context("could not serialize undo log")?;
    fs::write(path, body)
        .with_context(|| format!("could not write undo log: {}", path.display()))?;
    debug!("wrote {} batches to {}", log.len(), path.display());
    Ok(())
}

/// Returns the number of batches now in the log.
pub fn append_batch(path: &Path, batch: RenameBatch) -> Result<usize> {
    let mut log = load_history(path)?;
    log.push(batch);
    save_history(path, &log)?;
    Ok(log.len())
}

#[cfg(test)]
mod tests {
    use super::{append_batch, load_history, RenameBatch, RenameRecord};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn record(original: &str, renamed: &str) -> RenameRecord {
        RenameRecord {
            original: PathBuf::from(original),
            renamed: PathBuf::from(renamed),
        }
    }

    #[test]
    fn missing_and_blank_logs_are_empty() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("rename_history.json");
        assert!(load_history(&path).expect("missing").is_empty());

        fs::write(&path, "  \n").expect("write");
        assert!(load_history(&path).expect("blank").is_empty());
    }

    #[test]
    fn log_is_a_json_array_of_path_maps() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("rename_history.json");
        let batch: RenameBatch = [record("/d/a.png", "/d/x.png")].into_iter().collect();

        assert_eq!(append_batch(&path, batch).expect("append"), 1);
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value, serde_json::json!([{ "/d/a.png": "/d/x.png" }]));
    }

    #[test]
    fn append_keeps_earlier_batches() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("rename_history.json");
        let first: RenameBatch = [record("/d/a.png", "/d/1.png")].into_iter().collect();
        let second: RenameBatch = [record("/d/b.png", "/d/2.png")].into_iter().collect();

        append_batch(&path, first.clone()).expect("first");
        assert_eq!(append_batch(&path, second.clone()).expect("second"), 2);

        let log = load_history(&path).expect("load");
        assert_eq!(log.batches(), &[first, second]);
    }

    #[test]
    fn corrupt_log_is_reported() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("rename_history.json");
        fs::write(&path, "{not json").expect("write");
        let err = load_history(&path).expect_err("corrupt");
        assert!(err.to_string().contains("undo log is corrupt"));
    }
}
