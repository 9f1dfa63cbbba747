use crate::history::{load_history, save_history, RenameBatch, RenameRecord};
use crate::planner::path_is_occupied;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("nothing to undo in {}", .0.display())]
    NothingToUndo(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UndoFailure {
    pub original: PathBuf,
    pub renamed: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoResult {
    pub restored: usize,
    pub failures: Vec<UndoFailure>,
    pub remaining_batches: usize,
}

/// Reverses the most recent batch and drops it from the log. Reversal is best
/// effort: a pair that cannot be restored is reported and the rest continue.
pub fn undo_last(history_path: &Path) -> Result<UndoResult> {
    let mut log = load_history(history_path)?;
    let Some(batch) = log.pop() else {
        return Err(UndoError::NothingToUndo(history_path.to_path_buf()).into());
    };

    let (restored, failures) = restore_batch(&batch);
    save_history(history_path, &log)?;
    info!(
        "undo restored {} of {} files, {} batches remain",
        restored,
        batch.len(),
        log.len()
    );

    Ok(UndoResult {
        restored,
        failures,
        remaining_batches: log.len(),
    })
}

fn restore_batch(batch: &RenameBatch) -> (usize, Vec<UndoFailure>) {
    let mut restored = 0usize;
    let mut failures = Vec::new();
    for record in batch.records().rev() {
        match restore_record(&record) {
            Ok(()) => {
                info!(
                    "reverted rename: {} back to {}",
                    record.renamed.display(),
                    record.original.display()
                );
                restored += 1;
            }
            Err(reason) => {
                error!(
                    "could not revert {} to {}: {}",
                    record.renamed.display(),
                    record.original.display(),
                    reason
                );
                failures.push(UndoFailure {
                    original: record.original,
                    renamed: record.renamed,
                    reason,
                });
            }
        }
    }
    (restored, failures)
}

fn restore_record(record: &RenameRecord) -> Result<(), String> {
    if !path_is_occupied(&record.renamed) {
        return Err("renamed file no longer exists".to_string());
    }
    if path_is_occupied(&record.original) {
        return Err("original path is occupied".to_string());
    }
    fs::rename(&record.renamed, &record.original).map_err(|err| err.to_string())
}
