use chrono::{DateTime, Local};
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Times reported by the filesystem for one file. Absent candidates are
/// `None`, never a stand-in value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCandidates {
    pub modified: DateTime<Local>,
    pub changed: Option<DateTime<Local>>,
    pub born: Option<DateTime<Local>>,
}

impl TimeCandidates {
    pub fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        Ok(Self {
            modified: DateTime::from(meta.modified()?),
            changed: changed_time(meta),
            born: meta.created().ok().and_then(accept_birth_time),
        })
    }

    pub fn oldest(&self) -> DateTime<Local> {
        [self.changed, self.born]
            .into_iter()
            .flatten()
            .fold(self.modified, |oldest, t| oldest.min(t))
    }
}

pub fn read_time_candidates(path: &Path) -> io::Result<TimeCandidates> {
    let meta = fs::metadata(path)?;
    TimeCandidates::from_metadata(&meta)
}

/// Earliest of modification, metadata-change and birth time.
pub fn estimate_oldest_time(path: &Path) -> io::Result<DateTime<Local>> {
    let candidates = read_time_candidates(path)?;
    match candidates.born {
        Some(born) => info!("birth time for {}: {}", path.display(), born),
        None => info!(
            "no birth time for {}, using earliest of mtime/ctime",
            path.display()
        ),
    }
    debug!(
        "time candidates for {}: modified={} changed={:?}",
        path.display(),
        candidates.modified,
        candidates.changed
    );

    let oldest = candidates.oldest();
    info!("oldest time used for {}: {}", path.display(), oldest);
    Ok(oldest)
}

fn accept_birth_time(time: SystemTime) -> Option<DateTime<Local>> {
    // Some filesystems report 0 instead of failing.
    (time > UNIX_EPOCH).then(|| DateTime::from(time))
}

#[cfg(unix)]
fn changed_time(meta: &Metadata) -> Option<DateTime<Local>> {
    use std::os::unix::fs::MetadataExt;

    let nanos = u32::try_from(meta.ctime_nsec()).ok()?;
    DateTime::from_timestamp(meta.ctime(), nanos).map(|t| t.with_timezone(&Local))
}

#[cfg(not(unix))]
fn changed_time(_meta: &Metadata) -> Option<DateTime<Local>> {
    None
}
