//! Drives one job from discovery to its terminal outcome.
//!
//! ```text
//! Discovered ─┬─ output exists ─────────────────────────────────────────▶ EXIST
//!             ├─ (archive) Extracting ─┬─ non-zero exit ─────────────────▶ FAIL
//!             │                        └─ Extracted ─┐
//!             └──────────────────────────────────────┴─ Resolving ─┬─ nothing usable ─▶ SKIP
//!                                                                  ├─ unsupported ────▶ WARN_UNSUPPORTED
//!                                                                  └─ Resolved ─ Converting ─┬─ failure ─▶ FAIL
//!                                                                                            └─ CleaningUp ─▶ OK
//! ```
//!
//! Dry runs stop right before the first action that would touch the
//! filesystem and report WOULD. Every error is caught here and turned into the
//! job's [`ConversionResult`]; nothing escapes to sibling jobs.

use super::cleanup::{confine_to, output_is_valid, remove_sources};
use super::descriptor::{DescriptorParser, Selection, select_primary};
use super::job_log::JobLog;
use super::mirror::{PathMirror, ensure_dir};
use super::platform::accepts;
use super::tools::{CodecRequest, DiscTools, ToolError, ToolOutput};
use crate::metrics::Metrics;
use crate::models::{ConversionResult, ConvertConfig, Job, JobKind, JobState, Outcome, SourceSet};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

/// Prefix of the private directories archives are extracted into
pub const EXTRACT_DIR_PREFIX: &str = ".autochd-";

/// Reasons a job ends without producing a new CHD
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("No convertible source found")]
    NoConvertibleSource,

    #[error("Filtered out by platform filter: {0}")]
    FilteredOut(Utf8PathBuf),

    #[error("Recognized but unsupported format: {0}")]
    RecognizedUnsupportedFormat(Utf8PathBuf),

    #[error("Conversion failed: {0}")]
    ConversionToolFailure(String),

    #[error("Output already exists: {0}")]
    OutputAlreadyExists(Utf8PathBuf),

    #[error("{tool} timed out after {limit:?}")]
    ToolTimeout { tool: &'static str, limit: Duration },

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl ConversionError {
    /// The terminal outcome this error is reported as
    pub fn outcome(&self) -> Outcome {
        match self {
            ConversionError::NoConvertibleSource | ConversionError::FilteredOut(_) => Outcome::Skip,
            ConversionError::RecognizedUnsupportedFormat(_) => Outcome::WarnUnsupported,
            ConversionError::OutputAlreadyExists(_) => Outcome::Exist,
            ConversionError::ExtractionFailure(_)
            | ConversionError::ConversionToolFailure(_)
            | ConversionError::ToolTimeout { .. }
            | ConversionError::Cancelled
            | ConversionError::Io(_) => Outcome::Fail,
        }
    }
}

/// Successful end of a job: a new CHD, or the dry-run promise of one
struct Completion {
    outcome: Outcome,
    output: Utf8PathBuf,
    message: String,
}

/// Resolve once `cancel` flips to `true`; never resolves if the sender is gone
pub(crate) async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Race `work` against cancellation; dropping `work` kills any child process
async fn cancellable<F: Future>(
    work: F,
    cancel: &mut watch::Receiver<bool>,
) -> Result<F::Output, ConversionError> {
    if *cancel.borrow() {
        return Err(ConversionError::Cancelled);
    }

    tokio::select! {
        output = work => Ok(output),
        _ = wait_cancelled(cancel) => Err(ConversionError::Cancelled),
    }
}

/// Everything a worker needs to process jobs; shared by all workers of a run.
pub struct ConversionPipeline<T: DiscTools> {
    config: Arc<ConvertConfig>,
    tools: Arc<T>,
    mirror: PathMirror,
    parser: DescriptorParser,
    metrics: Arc<Metrics>,
}

impl<T: DiscTools> ConversionPipeline<T> {
    pub fn new(config: Arc<ConvertConfig>, tools: Arc<T>, metrics: Arc<Metrics>) -> Self {
        let mirror = PathMirror::new(config.source_root.clone(), config.dest_root.clone());
        Self {
            config,
            tools,
            mirror,
            parser: DescriptorParser::new(),
            metrics,
        }
    }

    /// Where the CHD for `job` is written
    pub fn output_path(&self, job: &Job) -> Utf8PathBuf {
        self.mirror.output_path(job.source_dir(), &job.title)
    }

    /// Process one job end to end. Always returns exactly one result.
    pub async fn process(&self, job: &Job, cancel: watch::Receiver<bool>) -> ConversionResult {
        let start = Instant::now();

        let log_dir = self.config.log_dir.as_deref();
        let mut log = match JobLog::open(log_dir, &job.title, job.primary_path()) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("Job log unavailable for {}: {:#}", job.title, e);
                JobLog::detached(&job.title)
            }
        };

        let result = match self.execute(job, &mut log, cancel).await {
            Ok(done) => {
                ConversionResult::new(job, done.outcome, done.message).with_output(done.output)
            }
            Err(err) => {
                let outcome = err.outcome();
                let message = format!("{:#}", err);
                match outcome {
                    Outcome::Fail => log.error(&message),
                    Outcome::WarnUnsupported => log.warn(&message),
                    _ => log.info(&message),
                }

                let result = ConversionResult::new(job, outcome, message);
                match err {
                    ConversionError::OutputAlreadyExists(path) => result.with_output(path),
                    _ => result,
                }
            }
        };

        let result = result.with_duration(start.elapsed());
        log.info(format!(
            "Finished with {} in {:.2}s",
            result.outcome,
            result.duration.as_secs_f32()
        ));
        result
    }

    async fn execute(
        &self,
        job: &Job,
        log: &mut JobLog,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Completion, ConversionError> {
        log.info(format!("{}: {} {}", JobState::Discovered, job.kind, job.primary_path()));

        let output = self.output_path(job);
        if output_is_valid(&output) {
            if !self.config.force {
                return Err(ConversionError::OutputAlreadyExists(output));
            }
            log.warn(format!("Overwriting existing {}", output));
        }

        match job.kind {
            JobKind::Archive => self.execute_archive(job, output, log, &mut cancel).await,
            JobKind::LooseDescriptorImage | JobKind::LooseContainerImage => {
                let selection = Selection::for_file(job.primary_path());
                let scope = job.source_dir();
                self.convert(selection, output, scope, Vec::new(), log, &mut cancel).await
            }
        }
    }

    async fn execute_archive(
        &self,
        job: &Job,
        output: Utf8PathBuf,
        log: &mut JobLog,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Completion, ConversionError> {
        let archive = job.primary_path();

        if self.config.dry_run {
            let placeholder = job.source_dir().join(format!("{}<tmp>", EXTRACT_DIR_PREFIX));
            log.would(format!(
                "run {}",
                self.tools.extract_invocation(archive, &placeholder)
            ));
            log.would(format!("convert extracted disc to {}", output));
            if !self.config.keep_archive {
                log.would(format!("delete {}", archive));
            }
            return Ok(Completion {
                outcome: Outcome::Would,
                output,
                message: format!("Would extract and convert {}", archive),
            });
        }

        // Dropped on every exit path, taking the extracted files with it
        let extract_dir = tempfile::Builder::new()
            .prefix(EXTRACT_DIR_PREFIX)
            .tempdir_in(job.source_dir())
            .with_context(|| {
                format!("Failed to create extraction directory in {}", job.source_dir())
            })?;
        let extract_path = Utf8PathBuf::try_from(extract_dir.path().to_path_buf())
            .context("Extraction directory is not valid UTF-8")?;

        log.info(format!("{}: {}", JobState::Extracting, extract_path));
        log.run(self.tools.extract_invocation(archive, &extract_path).to_string());
        self.metrics.record_extraction();

        let extracted = cancellable(self.tools.extract(archive, &extract_path), cancel).await?;
        let extracted = self.check_tool("extractor", extracted, log).map_err(|e| match e {
            ConversionError::ConversionToolFailure(msg) => ConversionError::ExtractionFailure(msg),
            other => other,
        })?;
        if !extracted.success() {
            return Err(ConversionError::ExtractionFailure(format!(
                "extractor exited with code {}",
                extracted.exit_code
            )));
        }
        log.info(format!("{}: {}", JobState::Extracted, extract_path));

        let selection = select_primary(&extract_path)?;

        let mut extra = Vec::new();
        if !self.config.keep_archive {
            extra.push(archive.to_path_buf());
        }

        self.convert(selection, output, &extract_path, extra, log, cancel).await
    }

    /// Resolve, convert and clean up. Source files outside `scope` are never
    /// deleted; `extra_candidates` are deleted alongside the source set once
    /// the output is verified.
    async fn convert(
        &self,
        selection: Selection,
        output: Utf8PathBuf,
        scope: &Utf8Path,
        extra_candidates: Vec<Utf8PathBuf>,
        log: &mut JobLog,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Completion, ConversionError> {
        log.info(format!("{}", JobState::Resolving));

        let primary = match &selection {
            Selection::NotFound => return Err(ConversionError::NoConvertibleSource),
            Selection::Unsupported(path) => {
                return Err(ConversionError::RecognizedUnsupportedFormat(path.clone()));
            }
            Selection::Descriptor(path) | Selection::Image(path) => path.clone(),
        };

        if !accepts(&primary, self.config.platform) {
            return Err(ConversionError::FilteredOut(primary));
        }

        let source_set = self
            .parser
            .resolve(&selection)?
            .ok_or(ConversionError::NoConvertibleSource)?;
        self.log_resolved(&source_set, log);

        let request = CodecRequest {
            mode: source_set.mode,
            input: source_set.primary.clone(),
            output: output.clone(),
            force: self.config.force,
        };

        let mut candidates = confine_to(scope, source_set.all_paths(), log);
        candidates.extend(extra_candidates);

        if self.config.dry_run {
            log.would(format!("run {}", self.tools.codec_invocation(&request)));
            remove_sources(&output, &candidates, true, log);
            return Ok(Completion {
                outcome: Outcome::Would,
                output,
                message: format!("Would convert {}", source_set.primary),
            });
        }

        if let Some(parent) = output.parent() {
            ensure_dir(parent)?;
        }
        let existed_before = output.exists();

        log.info(format!("{}: {}", JobState::Converting, source_set.mode));
        log.run(self.tools.codec_invocation(&request).to_string());

        let converted = cancellable(self.tools.create(&request), cancel).await;
        let converted = match converted {
            Ok(result) => self.check_tool("chdman", result, log),
            Err(e) => Err(e),
        };

        let converted = match converted {
            Ok(out) if out.success() => {
                self.metrics.record_conversion(out.duration);
                out
            }
            Ok(out) => {
                self.discard_partial(&output, existed_before, log);
                return Err(ConversionError::ConversionToolFailure(format!(
                    "chdman exited with code {}",
                    out.exit_code
                )));
            }
            Err(e) => {
                self.discard_partial(&output, existed_before, log);
                return Err(e);
            }
        };

        if !output_is_valid(&output) {
            self.metrics.record_tool_failure();
            self.discard_partial(&output, existed_before, log);
            return Err(ConversionError::ConversionToolFailure(format!(
                "chdman exited with code {} but {} is missing or empty",
                converted.exit_code, output
            )));
        }
        log.info(format!("{}: {}", JobState::Converted, output));

        if let Ok(meta) = fs::metadata(&output) {
            self.metrics.record_bytes_written(meta.len());
        }

        log.info(format!("{}", JobState::CleaningUp));
        let report = remove_sources(&output, &candidates, false, log);
        self.metrics.record_bytes_deleted(report.bytes_freed);

        let mut message = format!("Created {}", output);
        if !report.failed.is_empty() {
            message.push_str(&format!(
                " ({} source file(s) could not be deleted)",
                report.failed.len()
            ));
        }

        log.success(&message);
        log.info(format!("{}", JobState::Completed));

        Ok(Completion {
            outcome: Outcome::Ok,
            output,
            message,
        })
    }

    fn log_resolved(&self, source_set: &SourceSet, log: &mut JobLog) {
        log.info(format!(
            "{}: {} ({} track file(s))",
            JobState::Resolved,
            source_set.primary,
            source_set.dependents.len()
        ));
        for track in &source_set.dependents {
            log.info(format!("  track {}", track));
        }
    }

    /// Log captured output and map launch errors. A non-zero exit stays `Ok`.
    fn check_tool(
        &self,
        tool: &'static str,
        result: Result<ToolOutput, ToolError>,
        log: &mut JobLog,
    ) -> Result<ToolOutput, ConversionError> {
        match result {
            Ok(out) => {
                log.append_output("stdout", &out.stdout);
                log.append_output("stderr", &out.stderr);
                if !out.success() {
                    self.metrics.record_tool_failure();
                }
                Ok(out)
            }
            Err(ToolError::Timeout(limit)) => {
                self.metrics.record_tool_failure();
                Err(ConversionError::ToolTimeout { tool, limit })
            }
            Err(e @ ToolError::Spawn { .. }) => {
                self.metrics.record_tool_failure();
                Err(ConversionError::ConversionToolFailure(e.to_string()))
            }
        }
    }

    /// Remove a partial CHD left by a failed run, unless the file predates the job
    fn discard_partial(&self, output: &Utf8Path, existed_before: bool, log: &mut JobLog) {
        if existed_before || !output.exists() {
            return;
        }
        match fs::remove_file(output) {
            Ok(()) => log.warn(format!("Removed partial output {}", output)),
            Err(e) => log.warn(format!("Failed to remove partial output {}: {}", output, e)),
        }
    }
}
