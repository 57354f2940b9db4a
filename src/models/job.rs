use super::Platform;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What the scanner found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// A single-file archive that must be extracted first
    Archive,
    /// A loose CD descriptor (`.cue`, `.gdi`, `.toc`) with track files beside it
    LooseDescriptorImage,
    /// A loose single-file image (`.iso`, or a recognized container the codec rejects)
    LooseContainerImage,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Archive => f.write_str("archive"),
            JobKind::LooseDescriptorImage => f.write_str("descriptor"),
            JobKind::LooseContainerImage => f.write_str("image"),
        }
    }
}

/// One unit of conversion work: one archive or one loose image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub title: String,
    pub kind: JobKind,
    pub source_root: Utf8PathBuf,
    /// The discovered file first; never empty
    pub source_paths: Vec<Utf8PathBuf>,
    pub platform: Option<Platform>,
}

impl Job {
    /// Build a job for a discovered file. The title is the file stem.
    pub fn new(kind: JobKind, source_root: &Utf8Path, path: Utf8PathBuf) -> Self {
        let title = path
            .file_stem()
            .map(str::to_string)
            .unwrap_or_else(|| path.to_string());
        let platform = path.extension().and_then(Platform::for_extension);

        Self {
            title,
            kind,
            source_root: source_root.to_path_buf(),
            source_paths: vec![path],
            platform,
        }
    }

    pub fn primary_path(&self) -> &Utf8Path {
        &self.source_paths[0]
    }

    /// Directory holding the discovered file
    pub fn source_dir(&self) -> &Utf8Path {
        self.primary_path()
            .parent()
            .unwrap_or_else(|| self.source_root.as_path())
    }
}

/// chdman sub-command used for a source set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    Cd,
    Dvd,
}

impl CodecMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            CodecMode::Cd => "createcd",
            CodecMode::Dvd => "createdvd",
        }
    }
}

impl fmt::Display for CodecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// The files that together make up one convertible disc.
///
/// Dependents are only ever present for CD descriptors and only contain files
/// that existed when the set was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    pub primary: Utf8PathBuf,
    pub dependents: Vec<Utf8PathBuf>,
    pub mode: CodecMode,
}

impl SourceSet {
    pub fn single(primary: Utf8PathBuf, mode: CodecMode) -> Self {
        Self {
            primary,
            dependents: Vec::new(),
            mode,
        }
    }

    /// Primary first, then dependents in descriptor order
    pub fn all_paths(&self) -> Vec<Utf8PathBuf> {
        std::iter::once(self.primary.clone())
            .chain(self.dependents.iter().cloned())
            .collect()
    }
}

/// Terminal classification of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "SKIP")]
    Skip,
    #[serde(rename = "EXIST")]
    Exist,
    #[serde(rename = "WARN_UNSUPPORTED")]
    WarnUnsupported,
    #[serde(rename = "WOULD")]
    Would,
}

impl Outcome {
    pub const ALL: [Outcome; 6] = [
        Outcome::Ok,
        Outcome::Fail,
        Outcome::Skip,
        Outcome::Exist,
        Outcome::WarnUnsupported,
        Outcome::Would,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "OK",
            Outcome::Fail => "FAIL",
            Outcome::Skip => "SKIP",
            Outcome::Exist => "EXIST",
            Outcome::WarnUnsupported => "WARN_UNSUPPORTED",
            Outcome::Would => "WOULD",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded once per job and never changed afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub title: String,
    pub source: Utf8PathBuf,
    pub outcome: Outcome,
    pub output: Option<Utf8PathBuf>,
    pub message: String,
    pub duration: Duration,
}

impl ConversionResult {
    pub fn new(job: &Job, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            title: job.title.clone(),
            source: job.primary_path().to_path_buf(),
            outcome,
            output: None,
            message: message.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn with_output(mut self, output: impl Into<Utf8PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Pipeline states a job moves through; used for log lines only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Discovered,
    Extracting,
    Extracted,
    Resolving,
    Resolved,
    Converting,
    Converted,
    CleaningUp,
    Completed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Discovered => "discovered",
            JobState::Extracting => "extracting",
            JobState::Extracted => "extracted",
            JobState::Resolving => "resolving",
            JobState::Resolved => "resolved",
            JobState::Converting => "converting",
            JobState::Converted => "converted",
            JobState::CleaningUp => "cleaning up",
            JobState::Completed => "completed",
        };
        f.write_str(name)
    }
}
