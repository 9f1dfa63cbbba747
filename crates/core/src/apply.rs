use crate::history::{append_batch, RenameBatch, RenameRecord};
use crate::planner::{
    build_pool, path_is_occupied, RenameCandidate, RenamePlan, RenameStats, TaskFailure,
};
use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub history_path: PathBuf,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    pub batch: RenameBatch,
    pub applied: usize,
    pub unchanged: usize,
    pub failures: Vec<TaskFailure>,
}

/// Everything one invocation produced: the plan, and the apply outcome unless
/// it was a dry run. `plan.stats` already includes the apply-phase counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameReport {
    pub dry_run: bool,
    pub plan: RenamePlan,
    pub result: Option<ApplyResult>,
}

impl RenameReport {
    pub fn planned(plan: RenamePlan) -> Self {
        Self {
            dry_run: true,
            plan,
            result: None,
        }
    }

    pub fn applied(mut plan: RenamePlan, result: ApplyResult) -> Self {
        plan.stats.renamed = result.applied;
        plan.stats.failed += result.failures.len();
        Self {
            dry_run: false,
            plan,
            result: Some(result),
        }
    }

    pub fn stats(&self) -> &RenameStats {
        &self.plan.stats
    }

    /// Analysis failures first, then rename failures.
    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.plan.failures.iter().chain(
            self.result
                .iter()
                .flat_map(|result| result.failures.iter()),
        )
    }
}

/// Performs every changed rename in `plan` and appends the successful ones to
/// the undo log as a single batch. Individual failures are collected, not
/// returned as errors.
pub fn apply_plan(plan: &RenamePlan, options: &ApplyOptions) -> Result<ApplyResult> {
    let candidates: Vec<&RenameCandidate> = plan.candidates.iter().filter(|c| c.changed).collect();
    let unchanged = plan.candidates.len() - candidates.len();
    if candidates.is_empty() {
        return Ok(ApplyResult {
            batch: RenameBatch::default(),
            applied: 0,
            unchanged,
            failures: Vec::new(),
        });
    }

    let pool = build_pool(options.workers)?;
    let outcomes: Vec<Result<RenameRecord, TaskFailure>> =
        pool.install(|| candidates.par_iter().map(|c| rename_candidate(c)).collect());

    let mut batch = RenameBatch::default();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(record) => batch.insert(record),
            Err(failure) => failures.push(failure),
        }
    }

    if !batch.is_empty() {
        let batches = append_batch(&options.history_path, batch.clone())?;
        info!(
            "recorded {} renames as batch {} in {}",
            batch.len(),
            batches,
            options.history_path.display()
        );
    }

    Ok(ApplyResult {
        applied: batch.len(),
        batch,
        unchanged,
        failures,
    })
}

fn rename_candidate(candidate: &RenameCandidate) -> Result<RenameRecord, TaskFailure> {
    let from = &candidate.original_path;
    let to = &candidate.target_path;
    let fail = |reason: String| {
        error!(
            "could not rename {} to {}: {}",
            from.display(),
            to.display(),
            reason
        );
        TaskFailure {
            path: from.clone(),
            reason,
        }
    };

    // The directory may have changed since planning; never clobber.
    if path_is_occupied(to) {
        return Err(fail("target already exists".to_string()));
    }
    fs::rename(from, to).map_err(|err| fail(err.to_string()))?;

    info!("renamed file {} to {}", from.display(), to.display());
    Ok(RenameRecord {
        original: from.clone(),
        renamed: to.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::{apply_plan, ApplyOptions, RenameReport};
    use crate::config::AppConfig;
    use crate::hasher::HashMethod;
    use crate::history::load_history;
    use crate::planner::{generate_plan, RenameCandidate, RenamePlan, RenameOptions, RenameStats};
    use chrono::{Local, TimeZone};
    use filetime::FileTime;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn options(root: &Path, method: HashMethod) -> RenameOptions {
        let mut options = RenameOptions::from_config(root, "png", &AppConfig::default());
        options.hash_method = method;
        options
    }

    fn apply_options(history: &Path) -> ApplyOptions {
        ApplyOptions {
            history_path: history.to_path_buf(),
            workers: 2,
        }
    }

    #[test]
    fn renames_to_timestamp_then_hash() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("pics");
        fs::create_dir(&root).expect("mkdir");
        let history = temp.path().join("rename_history.json");

        let photo = root.join("photo.png");
        fs::write(&photo, b"hello").expect("write");
        let time = Local.with_ymd_and_hms(2023, 6, 1, 10, 0, 0).unwrap();
        filetime::set_file_mtime(&photo, FileTime::from_unix_time(time.timestamp(), 0))
            .expect("mtime");

        let plan = generate_plan(&options(&root, HashMethod::Sha256)).expect("plan");
        let result = apply_plan(&plan, &apply_options(&history)).expect("apply");

        let expected = plan.root.join(
            "20230601.100000-2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824.png",
        );
        assert_eq!(result.applied, 1);
        assert!(expected.exists());
        assert!(!photo.exists());
        assert_eq!(
            result.batch.get(&plan.root.join("photo.png")),
            Some(expected.as_path())
        );
        assert_eq!(load_history(&history).expect("history").len(), 1);
    }

    #[test]
    fn second_pass_over_renamed_files_is_a_no_op() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("pics");
        fs::create_dir(&root).expect("mkdir");
        let history = temp.path().join("rename_history.json");

        let time = Local.with_ymd_and_hms(2019, 3, 4, 5, 6, 7).unwrap();
        for (name, body) in [
            ("a.png", b"one".as_slice()),
            ("b-mask.png", b"two".as_slice()),
            ("dup1.png", b"same".as_slice()),
            ("dup2.png", b"same".as_slice()),
        ] {
            let path = root.join(name);
            fs::write(&path, body).expect("write");
            filetime::set_file_mtime(&path, FileTime::from_unix_time(time.timestamp(), 0))
                .expect("mtime");
        }

        for method in [HashMethod::Sha256, HashMethod::Sha1, HashMethod::Md5] {
            let first = generate_plan(&options(&root, method)).expect("first plan");
            apply_plan(&first, &apply_options(&history)).expect("first apply");

            let second = generate_plan(&options(&root, method)).expect("second plan");
            assert_eq!(second.candidates.len(), 4);
            assert!(
                second.candidates.iter().all(|c| !c.changed),
                "{method} pass should be stable"
            );
            let result = apply_plan(&second, &apply_options(&history)).expect("second apply");
            assert_eq!(result.applied, 0);
            assert_eq!(result.unchanged, 4);
        }

        // One batch per method; the stable passes record nothing.
        assert_eq!(load_history(&history).expect("history").len(), 3);
    }

    #[test]
    fn empty_batch_does_not_create_history() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("pics");
        fs::create_dir(&root).expect("mkdir");
        let history = temp.path().join("rename_history.json");

        let plan = generate_plan(&options(&root, HashMethod::Sha256)).expect("plan");
        let result = apply_plan(&plan, &apply_options(&history)).expect("apply");
        assert_eq!(result.applied, 0);
        assert!(!history.exists());
    }

    #[test]
    fn target_created_after_planning_is_not_overwritten() {
        let temp = tempdir().expect("tempdir");
        let history = temp.path().join("rename_history.json");
        let original_a = temp.path().join("a.png");
        let original_b = temp.path().join("b.png");
        fs::write(&original_a, b"A").expect("write A");
        fs::write(&original_b, b"B").expect("write B");

        let target_a = temp.path().join("renamed-a.png");
        let target_b = temp.path().join("renamed-b.png");
        let candidate = |original: &Path, target: &Path| RenameCandidate {
            original_path: original.to_path_buf(),
            target_path: target.to_path_buf(),
            hash: "00".to_string(),
            timestamp: Local::now(),
            marker: None,
            changed: true,
        };
        let plan = RenamePlan {
            root: temp.path().to_path_buf(),
            extension: ".png".to_string(),
            hash_method: HashMethod::Sha256,
            candidates: vec![
                candidate(&original_a, &target_a),
                candidate(&original_b, &target_b),
            ],
            failures: Vec::new(),
            stats: RenameStats::default(),
        };
        fs::write(&target_b, b"intruder").expect("write intruder");

        let result = apply_plan(&plan, &apply_options(&history)).expect("apply");
        assert_eq!(result.applied, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].path, original_b);
        assert!(target_a.exists());
        assert!(original_b.exists());
        assert_eq!(fs::read(&target_b).expect("read"), b"intruder");

        let log = load_history(&history).expect("history");
        assert_eq!(log.batches()[0].len(), 1);
    }

    #[test]
    fn report_counts_renames_and_lists_every_failure() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("pics");
        fs::create_dir(&root).expect("mkdir");
        let history = temp.path().join("rename_history.json");
        fs::write(root.join("broken.png"), b"garbage").expect("write");
        image::RgbImage::new(4, 4)
            .save(root.join("good.png"))
            .expect("save");
        image::RgbImage::from_fn(4, 4, |x, _| image::Rgb([if x < 2 { 255 } else { 0 }; 3]))
            .save(root.join("late.png"))
            .expect("save");

        let plan = generate_plan(&options(&root, HashMethod::ImageHash)).expect("plan");
        assert_eq!(plan.failures.len(), 1);
        let late = plan
            .candidates
            .iter()
            .find(|c| c.original_path.ends_with("late.png"))
            .expect("late candidate");
        fs::write(&late.target_path, b"intruder").expect("write intruder");

        let dry = RenameReport::planned(plan.clone());
        assert!(dry.dry_run);
        assert_eq!(dry.stats().renamed, 0);
        assert_eq!(dry.failures().count(), 1);

        let result = apply_plan(&plan, &apply_options(&history)).expect("apply");
        let report = RenameReport::applied(plan, result);
        assert!(!report.dry_run);
        assert_eq!(report.stats().renamed, 1);
        assert_eq!(report.stats().failed, 2);
        let failed: Vec<&Path> = report.failures().map(|f| f.path.as_path()).collect();
        assert_eq!(failed.len(), 2);
        assert!(failed[0].ends_with("broken.png"));
        assert!(failed[1].ends_with("late.png"));

        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["plan"]["stats"]["renamed"], 1);
        assert_eq!(json["result"]["applied"], 1);
    }
}
