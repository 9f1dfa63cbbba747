mod apply;
mod config;
mod hasher;
mod history;
mod naming;
mod planner;
mod timestamp;
mod undo;

pub use apply::{apply_plan, ApplyOptions, ApplyResult, RenameReport};
pub use config::{AppConfig, AppPaths, DEFAULT_MARKERS};
pub use hasher::{average_hash, compute_hash, HashError, HashMethod};
pub use history::{
    append_batch, load_history, save_history, RenameBatch, RenameRecord, UndoLog,
};
pub use naming::{format_timestamp, resolve_target, select_marker, CandidateName};
pub use planner::{
    generate_plan, normalize_extension, FileTask, RenameCandidate, RenameOptions, RenamePlan,
    RenameStats, TaskFailure,
};
pub use timestamp::{estimate_oldest_time, read_time_candidates, TimeCandidates};
pub use undo::{undo_last, UndoError, UndoFailure, UndoResult};
