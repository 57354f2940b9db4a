//! Shared fixtures for the integration tests.
//!
//! [`FakeTools`] stands in for 7-Zip and chdman: archives are "extracted" from
//! an in-memory manifest and the codec writes a small file (or misbehaves on
//! request) without spawning anything.

#![allow(dead_code)]

use autochd::services::{CodecRequest, DiscTools, Invocation, ToolError, ToolOutput};
use autochd::{ConvertConfig, Metrics, ResultAggregator, RunSummary, convert_tree};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

pub const CHD_BYTES: &[u8] = b"MComprHD fake";

/// How the fake codec behaves for an output title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecBehavior {
    Succeed,
    /// Writes a partial file, then exits 1
    FailWithPartial,
    /// Exits 0 but leaves an empty output
    EmptyOutput,
    Panic,
    /// Never finishes
    Hang,
    /// Writes a partial file, then reports the time limit as exceeded
    Timeout,
    /// The program cannot be started
    Missing,
}

/// How the fake extractor fails for an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractFailure {
    ExitCode(i32),
    Timeout,
    Missing,
}

/// Time limit reported by the fake tools when they "time out"
pub const FAKE_TIMEOUT: Duration = Duration::from_secs(1);

fn not_found(program: &str) -> ToolError {
    ToolError::Spawn {
        program: program.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
    }
}

#[derive(Default)]
struct FakeState {
    archives: Mutex<HashMap<String, Vec<(String, Vec<u8>)>>>,
    extract_failures: Mutex<HashMap<String, ExtractFailure>>,
    behaviors: Mutex<HashMap<String, CodecBehavior>>,
    requests: Mutex<Vec<CodecRequest>>,
    extract_calls: AtomicUsize,
    codec_calls: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    codec_delay: Mutex<Option<Duration>>,
}

/// Scripted stand-in for the external programs; clones share state
#[derive(Clone, Default)]
pub struct FakeTools {
    state: Arc<FakeState>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the files the extractor produces for the archive named `name`
    pub fn with_archive(self, name: &str, entries: &[(&str, &[u8])]) -> Self {
        let entries = entries
            .iter()
            .map(|(path, data)| (path.to_string(), data.to_vec()))
            .collect();
        self.state
            .archives
            .lock()
            .unwrap()
            .insert(name.to_string(), entries);
        self
    }

    /// Make extraction of `name` exit with code 2
    pub fn with_failing_archive(self, name: &str) -> Self {
        self.with_extract_failure(name, ExtractFailure::ExitCode(2))
    }

    pub fn with_extract_failure(self, name: &str, failure: ExtractFailure) -> Self {
        self.state
            .extract_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), failure);
        self
    }

    /// Set the codec behavior for the output named `<title>.chd`
    pub fn with_codec(self, title: &str, behavior: CodecBehavior) -> Self {
        self.state
            .behaviors
            .lock()
            .unwrap()
            .insert(title.to_string(), behavior);
        self
    }

    /// Make every successful codec run take `delay`
    pub fn with_codec_delay(self, delay: Duration) -> Self {
        *self.state.codec_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn extract_calls(&self) -> usize {
        self.state.extract_calls.load(Ordering::SeqCst)
    }

    pub fn codec_calls(&self) -> usize {
        self.state.codec_calls.load(Ordering::SeqCst)
    }

    pub fn peak_running(&self) -> usize {
        self.state.peak_running.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CodecRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    fn behavior_for(&self, output: &Utf8Path) -> CodecBehavior {
        let title = output.file_stem().unwrap_or_default();
        self.state
            .behaviors
            .lock()
            .unwrap()
            .get(title)
            .copied()
            .unwrap_or(CodecBehavior::Succeed)
    }

    fn output(exit_code: i32) -> ToolOutput {
        ToolOutput {
            exit_code,
            stdout: "fake output".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        }
    }
}

impl DiscTools for FakeTools {
    async fn extract(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<ToolOutput, ToolError> {
        self.state.extract_calls.fetch_add(1, Ordering::SeqCst);
        let name = archive.file_name().unwrap_or_default().to_string();

        let failure = self.state.extract_failures.lock().unwrap().get(&name).copied();
        match failure {
            Some(ExtractFailure::ExitCode(code)) => return Ok(Self::output(code)),
            Some(ExtractFailure::Timeout) => {
                fs::write(dest.join("partial.bin"), b"half").unwrap();
                return Err(ToolError::Timeout(FAKE_TIMEOUT));
            }
            Some(ExtractFailure::Missing) => return Err(not_found("7z")),
            None => {}
        }

        let entries = self
            .state
            .archives
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_default();

        for (path, data) in entries {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(target, data).unwrap();
        }
        Ok(Self::output(0))
    }

    async fn create(&self, request: &CodecRequest) -> Result<ToolOutput, ToolError> {
        self.state.codec_calls.fetch_add(1, Ordering::SeqCst);
        self.state.requests.lock().unwrap().push(request.clone());

        let running = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_running.fetch_max(running, Ordering::SeqCst);

        let delay = *self.state.codec_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.behavior_for(&request.output) {
            CodecBehavior::Succeed => {
                fs::write(&request.output, CHD_BYTES).unwrap();
                Self::output(0)
            }
            CodecBehavior::FailWithPartial => {
                fs::write(&request.output, b"MCo").unwrap();
                Self::output(1)
            }
            CodecBehavior::EmptyOutput => {
                fs::write(&request.output, b"").unwrap();
                Self::output(0)
            }
            CodecBehavior::Panic => {
                self.state.running.fetch_sub(1, Ordering::SeqCst);
                panic!("codec exploded");
            }
            CodecBehavior::Hang => std::future::pending().await,
            CodecBehavior::Timeout => {
                fs::write(&request.output, b"MCo").unwrap();
                self.state.running.fetch_sub(1, Ordering::SeqCst);
                return Err(ToolError::Timeout(FAKE_TIMEOUT));
            }
            CodecBehavior::Missing => {
                self.state.running.fetch_sub(1, Ordering::SeqCst);
                return Err(not_found("chdman"));
            }
        };

        self.state.running.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }

    fn extract_invocation(&self, archive: &Utf8Path, dest: &Utf8Path) -> Invocation {
        Invocation::extract("7z", archive, dest)
    }

    fn codec_invocation(&self, request: &CodecRequest) -> Invocation {
        Invocation::codec("chdman", request)
    }
}

/// A temporary source tree
pub struct Fixture {
    _temp_dir: TempDir,
    pub root: Utf8PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::create_dir(root.join("src")).unwrap();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Source tree root
    pub fn source(&self) -> Utf8PathBuf {
        self.root.join("src")
    }

    pub fn logs(&self) -> Utf8PathBuf {
        self.root.join("logs")
    }

    /// Write a file under the source tree, creating parent directories
    pub fn write(&self, relative: &str, data: &[u8]) -> Utf8PathBuf {
        let path = self.source().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, data).unwrap();
        path
    }

    pub fn config(&self) -> ConvertConfig {
        ConvertConfig {
            source_root: self.source(),
            log_dir: Some(self.logs()),
            jobs: 2,
            ..Default::default()
        }
    }

    /// Read a per-job log
    pub fn job_log(&self, title: &str) -> String {
        fs::read_to_string(self.logs().join(format!("{}.log", title))).unwrap()
    }

    /// Every file under the source tree, relative and sorted
    pub fn source_files(&self) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(self.source())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(self.source())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }
}

/// Run a whole conversion with `tools` and no cancellation
pub async fn run(config: ConvertConfig, tools: &FakeTools) -> (RunSummary, Arc<ResultAggregator>) {
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let aggregator = Arc::new(ResultAggregator::new());
    let summary = convert_tree(
        config,
        tools.clone(),
        Arc::new(Metrics::new()),
        aggregator.clone(),
        cancel_rx,
    )
    .await
    .unwrap();
    (summary, aggregator)
}
