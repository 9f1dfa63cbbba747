use crate::config::AppConfig;
use crate::hasher::{compute_hash, HashMethod};
use crate::naming::{resolve_target, select_marker, CandidateName};
use crate::timestamp::estimate_oldest_time;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct RenameOptions {
    pub root: PathBuf,
    pub extension: String,
    pub hash_method: HashMethod,
    pub markers: Vec<String>,
    pub workers: usize,
}

impl RenameOptions {
    pub fn from_config(
        root: impl Into<PathBuf>,
        extension: impl Into<String>,
        config: &AppConfig,
    ) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            hash_method: config.hash_method,
            markers: config.markers.clone(),
            workers: config.workers,
        }
    }
}

/// One matched file, handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTask {
    pub directory: PathBuf,
    pub file_name: String,
    pub extension: String,
    pub markers: Vec<String>,
    pub hash_method: HashMethod,
}

impl FileTask {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameCandidate {
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    pub hash: String,
    pub timestamp: DateTime<Local>,
    pub marker: Option<String>,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RenameStats {
    pub scanned_files: usize,
    pub matched_files: usize,
    pub planned: usize,
    pub unchanged: usize,
    /// Filled in once the plan has been applied.
    pub renamed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePlan {
    pub root: PathBuf,
    pub extension: String,
    pub hash_method: HashMethod,
    pub candidates: Vec<RenameCandidate>,
    pub failures: Vec<TaskFailure>,
    pub stats: RenameStats,
}

struct Analysis {
    name: CandidateName,
    time: DateTime<Local>,
}

pub fn generate_plan(options: &RenameOptions) -> Result<RenamePlan> {
    let root = fs::canonicalize(&options.root)
        .with_context(|| format!("directory does not exist: {}", options.root.display()))?;
    if !root.is_dir() {
        anyhow::bail!("not a directory: {}", root.display());
    }

    let extension = normalize_extension(&options.extension)?;
    let mut stats = RenameStats::default();
    let tasks = collect_tasks(&root, &extension, options, &mut stats);
    info!(
        "found {} {} files under {} (hash method: {})",
        tasks.len(),
        extension,
        root.display(),
        options.hash_method
    );

    let pool = build_pool(options.workers)?;
    let analyzed: Vec<Result<Analysis, TaskFailure>> =
        pool.install(|| tasks.par_iter().map(analyze_task).collect());

    let mut candidates = Vec::with_capacity(tasks.len());
    let mut failures = Vec::new();
    let mut claimed = HashSet::<PathBuf>::new();

    for (task, analysis) in tasks.iter().zip(analyzed) {
        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(failure) => {
                stats.failed += 1;
                failures.push(failure);
                continue;
            }
        };

        let original = task.path();
        let target = resolve_target(&original, &analysis.name, |candidate| {
            claimed.contains(candidate) || path_is_occupied(candidate)
        });

        let (target_path, changed) = match target {
            Some(target) => {
                claimed.insert(target.clone());
                (target, true)
            }
            None => {
                info!(
                    "skipped {} as it already has the correct name",
                    original.display()
                );
                stats.unchanged += 1;
                (original.clone(), false)
            }
        };

        stats.planned += 1;
        candidates.push(RenameCandidate {
            original_path: original,
            target_path,
            hash: analysis.name.hash,
            timestamp: analysis.time,
            marker: analysis.name.marker,
            changed,
        });
    }

    Ok(RenamePlan {
        root,
        extension,
        hash_method: options.hash_method,
        candidates,
        failures,
        stats,
    })
}

/// `png` and `.png` both mean files ending in `.png`; the dot is always
/// implied, so `png` never matches `x.apng` or `imagepng`.
pub fn normalize_extension(extension: &str) -> Result<String> {
    let trimmed = extension.trim();
    let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if bare.is_empty() {
        anyhow::bail!("file extension must not be empty");
    }
    Ok(format!(".{bare}"))
}

pub(crate) fn build_pool(workers: usize) -> Result<ThreadPool> {
    // rayon treats 0 as "one thread per logical CPU"
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("could not start worker pool")
}

pub(crate) fn path_is_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn collect_tasks(
    root: &Path,
    extension: &str,
    options: &RenameOptions,
    stats: &mut RenameStats,
) -> Vec<FileTask> {
    let mut out = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        stats.scanned_files += 1;

        let Some(file_name) = entry.file_name().to_str() else {
            warn!("skipping non UTF-8 file name: {}", entry.path().display());
            continue;
        };
        if !file_name.ends_with(extension) {
            continue;
        }
        let Some(directory) = entry.path().parent() else {
            continue;
        };

        stats.matched_files += 1;
        out.push(FileTask {
            directory: directory.to_path_buf(),
            file_name: file_name.to_string(),
            extension: extension.to_string(),
            markers: options.markers.clone(),
            hash_method: options.hash_method,
        });
    }

    out
}

fn analyze_task(task: &FileTask) -> Result<Analysis, TaskFailure> {
    let path = task.path();
    let failure = |reason: String| {
        warn!("could not process {}: {}", path.display(), reason);
        TaskFailure {
            path: path.clone(),
            reason,
        }
    };

    let time = estimate_oldest_time(&path).map_err(|err| failure(err.to_string()))?;
    let hash = compute_hash(&path, task.hash_method).map_err(|err| failure(err.to_string()))?;
    info!("{} hash for {}: {}", task.hash_method, path.display(), hash);

    let marker = select_marker(&task.file_name, &task.markers);
    Ok(Analysis {
        name: CandidateName::new(task.hash_method, hash, time, marker, task.extension.as_str()),
        time,
    })
}
