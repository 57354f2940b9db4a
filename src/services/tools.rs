//! Invocation contract of the two external programs.
//!
//! - Extractor (7-Zip command line): `7z x -y -o<dest> <archive>`
//! - Codec (chdman command line): `chdman createcd|createdvd -i <input> -o <output> [-f]`
//!
//! [`DiscTools`] is the seam the pipeline talks to. [`CommandTools`] runs the real
//! programs as child processes; tests substitute an in-process fake.

use crate::models::CodecMode;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// What one tool run produced
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

/// Arguments for one chdman run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecRequest {
    pub mode: CodecMode,
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub force: bool,
}

/// A program and its arguments, printable as a shell-like command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn extract(program: &str, archive: &Utf8Path, dest: &Utf8Path) -> Self {
        Self {
            program: program.to_string(),
            args: vec![
                "x".to_string(),
                "-y".to_string(),
                format!("-o{}", dest),
                archive.to_string(),
            ],
        }
    }

    pub fn codec(program: &str, request: &CodecRequest) -> Self {
        let mut args = vec![
            request.mode.as_arg().to_string(),
            "-i".to_string(),
            request.input.to_string(),
            "-o".to_string(),
            request.output.to_string(),
        ];
        if request.force {
            args.push("-f".to_string());
        }

        Self {
            program: program.to_string(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

/// The two external programs the pipeline drives.
///
/// Both calls resolve once the program has exited; a non-zero exit code is a
/// normal [`ToolOutput`], only failing to run at all is an error.
pub trait DiscTools: Send + Sync + 'static {
    /// Unpack `archive` into `dest`
    fn extract(
        &self,
        archive: &Utf8Path,
        dest: &Utf8Path,
    ) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send;

    /// Produce a CHD from a descriptor or image
    fn create(
        &self,
        request: &CodecRequest,
    ) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send;

    /// Command line for [`extract`](Self::extract), for logs and dry runs
    fn extract_invocation(&self, archive: &Utf8Path, dest: &Utf8Path) -> Invocation;

    /// Command line for [`create`](Self::create), for logs and dry runs
    fn codec_invocation(&self, request: &CodecRequest) -> Invocation;
}

/// Runs the configured extractor and chdman as child processes.
///
/// Children are killed when their future is dropped, which is how both the
/// per-tool timeout and run cancellation stop a hung program.
#[derive(Debug, Clone)]
pub struct CommandTools {
    extractor: String,
    chdman: String,
    timeout: Option<Duration>,
}

impl CommandTools {
    pub fn new(
        extractor: impl Into<String>,
        chdman: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            extractor: extractor.into(),
            chdman: chdman.into(),
            timeout,
        }
    }

    async fn execute(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        tracing::debug!("Executing: {}", invocation);

        let start = Instant::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let spawn_error = |source: std::io::Error| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        let output = match self.timeout {
            Some(limit) => timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    tracing::warn!("{} timed out after {:?}", invocation.program, limit);
                    ToolError::Timeout(limit)
                })?
                .map_err(spawn_error)?,
            None => cmd.output().await.map_err(spawn_error)?,
        };

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::debug!(
            "{} completed in {:.2}s with exit code {}",
            invocation.program,
            duration.as_secs_f32(),
            exit_code
        );

        Ok(ToolOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        })
    }
}

impl DiscTools for CommandTools {
    async fn extract(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<ToolOutput, ToolError> {
        self.execute(&self.extract_invocation(archive, dest)).await
    }

    async fn create(&self, request: &CodecRequest) -> Result<ToolOutput, ToolError> {
        self.execute(&self.codec_invocation(request)).await
    }

    fn extract_invocation(&self, archive: &Utf8Path, dest: &Utf8Path) -> Invocation {
        Invocation::extract(&self.extractor, archive, dest)
    }

    fn codec_invocation(&self, request: &CodecRequest) -> Invocation {
        Invocation::codec(&self.chdman, request)
    }
}
