use super::Platform;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Everything the conversion core needs to know about a run.
///
/// Loaded from `autochd.yaml`, then overridden by `AUTOCHD_*` environment
/// variables and finally by command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Tree to scan for archives and disc images
    pub source_root: Utf8PathBuf,

    /// Alternate output tree; outputs land beside their sources when unset
    pub dest_root: Option<Utf8PathBuf>,

    /// Directory for per-job log files
    pub log_dir: Option<Utf8PathBuf>,

    /// Scan the whole tree instead of only the top level
    pub recursive: bool,

    /// Maximum number of jobs running at once (0 = number of CPUs)
    pub jobs: usize,

    pub dry_run: bool,

    /// Overwrite existing CHD files
    pub force: bool,

    pub platform: Option<Platform>,

    /// Keep the archive after a successful conversion
    pub keep_archive: bool,

    /// Archive extraction tool (7-Zip compatible command line)
    pub extractor: String,

    /// Disc image codec (chdman compatible command line)
    pub chdman: String,

    /// Per-invocation limit for the extractor and the codec, in seconds
    pub tool_timeout_secs: Option<u64>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            source_root: Utf8PathBuf::from("."),
            dest_root: None,
            log_dir: None,
            recursive: false,
            jobs: default_jobs(),
            dry_run: false,
            force: false,
            platform: None,
            keep_archive: false,
            extractor: "7z".to_string(),
            chdman: "chdman".to_string(),
            tool_timeout_secs: None,
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Source directory not found: {0}")]
    SourceNotFound(Utf8PathBuf),

    #[error("Source is not a directory: {0}")]
    SourceNotADirectory(Utf8PathBuf),

    #[error("{0} tool name is empty")]
    EmptyToolName(&'static str),
}

impl ConvertConfig {
    /// Check the settings that would otherwise fail every job the same way
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_root.exists() {
            return Err(ConfigError::SourceNotFound(self.source_root.clone()));
        }
        if !self.source_root.is_dir() {
            return Err(ConfigError::SourceNotADirectory(self.source_root.clone()));
        }
        if self.extractor.trim().is_empty() {
            return Err(ConfigError::EmptyToolName("Extractor"));
        }
        if self.chdman.trim().is_empty() {
            return Err(ConfigError::EmptyToolName("Codec"));
        }
        Ok(())
    }

    /// Concurrency limit with 0 resolved to the CPU count
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            default_jobs()
        } else {
            self.jobs
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
