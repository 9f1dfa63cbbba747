use crate::hasher::HashMethod;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_MARKERS: &[&str] = &[
    "before-color-correction",
    "before-highres-fix",
    "mask",
    "before-refiner",
    "mask-composite",
    "censored",
    "before-hires",
    "before-face-restore",
    "init-image",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub hash_method: HashMethod,
    /// Checked in order; the first one found in a filename wins.
    pub markers: Vec<String>,
    /// 0 means one worker per logical CPU.
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hash_method: HashMethod::default(),
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            workers: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub history_path: PathBuf,
    pub log_path: PathBuf,
}

impl AppPaths {
    /// Platform locations; the undo log sits next to the config file.
    pub fn discover() -> Result<Self> {
        let proj = ProjectDirs::from("org", "birthname", "birthname")
            .context("could not determine the platform config directory")?;
        Ok(Self::rooted(proj.config_dir(), proj.data_local_dir()))
    }

    pub fn rooted(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_path: config_dir.join("config.toml"),
            history_path: config_dir.join("rename_history.json"),
            log_path: data_dir.join("birthname.log"),
            config_dir: config_dir.to_path_buf(),
        }
    }
}

impl AppConfig {
    /// A missing file yields the defaults; a present but malformed one is an
    /// error naming the file.
    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => toml::from_str::<AppConfig>(&raw)
                .with_context(|| format!("could not parse config file: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(AppConfig::default()),
            Err(err) => Err(anyhow::Error::from(err)
                .context(format!("could not read config file: {}", path.display()))),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| {
                format!("could not create config directory: {}", dir.display())
            })?;
        }
        let body = toml::to_string_pretty(self).context("could not serialize config")?;
        fs::write(path, body)
            .with_context(|| format!("could not write config file: {}", path.display()))
    }
}
