use crate::hasher::HashMethod;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d.%H%M%S";

/// The pieces a canonical filename is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateName {
    pub method: HashMethod,
    pub hash: String,
    pub timestamp: String,
    pub marker: Option<String>,
    /// Includes the leading dot.
    pub extension: String,
}

impl CandidateName {
    pub fn new(
        method: HashMethod,
        hash: impl Into<String>,
        time: DateTime<Local>,
        marker: Option<&str>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            method,
            hash: hash.into(),
            timestamp: format_timestamp(time),
            marker: marker.map(str::to_string),
            extension: extension.into(),
        }
    }

    /// Name without counter or extension.
    pub fn stem(&self) -> String {
        let mut stem = if self.method.is_perceptual() {
            format!("{}-{}", self.hash, self.timestamp)
        } else {
            format!("{}-{}", self.timestamp, self.hash)
        };
        if let Some(marker) = &self.marker {
            stem.push('-');
            stem.push_str(marker);
        }
        stem
    }

    pub fn file_name(&self, counter: Option<usize>) -> String {
        match counter {
            Some(n) => format!("{}-{}{}", self.stem(), n, self.extension),
            None => format!("{}{}", self.stem(), self.extension),
        }
    }
}

pub fn format_timestamp(time: DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// First marker, in configuration order, contained in `file_name`.
pub fn select_marker<'a>(file_name: &str, markers: &'a [String]) -> Option<&'a str> {
    markers
        .iter()
        .map(String::as_str)
        .find(|marker| !marker.is_empty() && file_name.contains(marker))
}

/// Picks the first free path for `name` next to `original`, adding `-1`,
/// `-2`, ... on collision. Returns `None` when the file already carries its
/// canonical name.
pub fn resolve_target<F>(original: &Path, name: &CandidateName, is_taken: F) -> Option<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    let dir = original.parent().unwrap_or_else(|| Path::new(""));
    let mut counter = None;
    loop {
        let candidate = dir.join(name.file_name(counter));
        if candidate == original {
            return None;
        }
        if !is_taken(&candidate) {
            return Some(candidate);
        }
        counter = Some(counter.map_or(1, |n| n + 1));
    }
}
