use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix of the daily run log
pub const RUN_LOG_PREFIX: &str = "autochd";

/// Setup the run log with optional console output.
///
/// With a log directory the run log is written there with daily rotation.
/// Per-job logs are separate files managed by [`JobLog`](crate::services::JobLog).
///
/// # Arguments
/// * `log_dir` - Directory for log files; no run log file is written when `None`
/// * `log_prefix` - Prefix for log files
/// * `debug_mode` - If true, use debug level; otherwise use info level
/// * `console_output` - If true, also log to stderr
///
/// # Returns
/// A guard that must be held for the duration of the program to keep the file writer active
pub fn setup_logging_with_console(
    log_dir: Option<&Utf8Path>,
    log_prefix: &str,
    debug_mode: bool,
    console_output: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let mut guard = None;
    let file_layer = match log_dir {
        Some(dir) => {
            ensure_log_dir(dir)?;

            // Create daily rotating file appender
            let file_appender = rolling::daily(dir, log_prefix);
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    // stdout is reserved for the summary
    let console_layer = console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter(debug_mode))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        log_dir.map(Utf8Path::as_str).unwrap_or("-"),
        log_prefix,
        debug_mode,
        console_output
    );

    Ok(guard)
}

/// `RUST_LOG` when set, otherwise `debug` or `info`
fn env_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    #[allow(unused_variables)]
    fn test_setup_logging() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();

        // Fails if another test already installed a global subscriber,
        // but the directory is created either way
        let result = setup_logging_with_console(Some(&log_dir), "test", false, false);

        assert!(log_dir.exists());
    }

    #[test]
    fn test_log_directory_created() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("a/b/logs")).unwrap();

        ensure_log_dir(&log_dir).unwrap();
        assert!(log_dir.is_dir());

        // Second call is a no-op
        ensure_log_dir(&log_dir).unwrap();
    }
}
