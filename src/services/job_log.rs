//! Per-job log sink.
//!
//! Every job gets its own append-only log, `<log dir>/<title>.log`:
//!
//! ```text
//! Title: Foo (USA)
//! Source: /roms/psx/Foo (USA).7z
//! [2024-05-01 12:00:00] RUN: 7z x -y -o/roms/psx/.autochd-x1 /roms/psx/Foo (USA).7z
//! [2024-05-01 12:00:09] DELETE: /roms/psx/Foo (USA).7z
//! [2024-05-01 12:00:09] SUCCESS: Created /roms/psx/Foo (USA).chd
//! ```
//!
//! The sink is handed to the components working on the job instead of being
//! global state. Lines are mirrored to `tracing` inside a span carrying the job
//! title, so the run log shows them too; without a log directory that is the
//! only destination.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Run,
    Delete,
    Warn,
    Error,
    Success,
    /// Dry-run: an action that would have been taken
    Would,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Run => "RUN",
            LogLevel::Delete => "DELETE",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
            LogLevel::Would => "WOULD",
        };
        f.write_str(label)
    }
}

pub struct JobLog {
    title: String,
    path: Option<Utf8PathBuf>,
    file: Option<File>,
    span: tracing::Span,
}

impl JobLog {
    /// Open (or append to) the log for `title` and write the header.
    ///
    /// With `log_dir` unset the sink only forwards to `tracing`.
    pub fn open(log_dir: Option<&Utf8Path>, title: &str, source: &Utf8Path) -> Result<Self> {
        let span = tracing::info_span!("job", title = %title);

        let Some(log_dir) = log_dir else {
            return Ok(Self {
                title: title.to_string(),
                path: None,
                file: None,
                span,
            });
        };

        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;

        let path = log_dir.join(format!("{}.log", sanitize_file_name(title)));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open job log: {}", path))?;

        writeln!(file, "Title: {}", title)
            .and_then(|_| writeln!(file, "Source: {}", source))
            .with_context(|| format!("Failed to write job log header: {}", path))?;

        Ok(Self {
            title: title.to_string(),
            path: Some(path),
            file: Some(file),
            span,
        })
    }

    /// A sink that only forwards to `tracing`
    pub fn detached(title: &str) -> Self {
        Self {
            title: title.to_string(),
            path: None,
            file: None,
            span: tracing::info_span!("job", title = %title),
        }
    }

    /// Location of the log file, if one is being written
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn record(&mut self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();

        {
            let _enter = self.span.enter();
            match level {
                LogLevel::Error => tracing::error!("{}: {}", level, message),
                LogLevel::Warn => tracing::warn!("{}: {}", level, message),
                _ => tracing::info!("{}: {}", level, message),
            }
        }

        if let Some(file) = self.file.as_mut() {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            if let Err(e) = writeln!(file, "[{}] {}: {}", timestamp, level, message) {
                tracing::warn!("Failed to write job log for {}: {}", self.title, e);
            }
        }
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Info, message);
    }

    pub fn run(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Run, message);
    }

    pub fn delete(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Delete, message);
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Error, message);
    }

    pub fn success(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Success, message);
    }

    pub fn would(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Would, message);
    }

    /// Append captured tool output verbatim, indented under the last line
    pub fn append_output(&mut self, stream: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        {
            let _enter = self.span.enter();
            tracing::debug!("{}:\n{}", stream, text.trim_end());
        }

        if let Some(file) = self.file.as_mut() {
            let mut block = format!("    --- {} ---\n", stream);
            for line in text.lines() {
                block.push_str("    ");
                block.push_str(line);
                block.push('\n');
            }
            if let Err(e) = file.write_all(block.as_bytes()) {
                tracing::warn!("Failed to write job log for {}: {}", self.title, e);
            }
        }
    }
}

/// Replace characters that are not valid in file names on common platforms
pub fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.trim().is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}
