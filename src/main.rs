//! AutoCHD - Batch conversion of disc images and archived ROM dumps to CHD
//!
//! Main entry point for the command-line application.
//!
//! # Execution Flow
//!
//! 1. Parse the command line
//! 2. Load `autochd.yaml` (or `--config`), apply `AUTOCHD_*` overrides, then flags
//! 3. Initialize logging → stderr plus `<log dir>/autochd.<date>` when a log dir is set
//! 4. Create the tokio runtime and install the Ctrl-C handler
//! 5. Scan the source tree and run the archive phase, then the loose-image phase
//! 6. Print the summary; exit with status 1 if any job failed
//!
//! The external programs default to `7z` and `chdman` on `PATH`.

use anyhow::{Context, Result, bail};
use autochd::config::DEFAULT_CONFIG_FILE;
use autochd::logging::{RUN_LOG_PREFIX, setup_logging_with_console};
use autochd::models::platform::parse_filter;
use autochd::{
    APP_NAME, CommandTools, ConfigManager, ConvertConfig, Metrics, ResultAggregator, VERSION,
    convert_tree,
};
use camino::Utf8PathBuf;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Convert disc images and archived dumps to CHD
#[derive(Parser, Debug)]
#[command(name = "autochd", version, about)]
struct Cli {
    /// Directory to scan for archives and disc images
    source: Option<Utf8PathBuf>,

    /// Write CHD files into this tree instead of beside their sources
    #[arg(short, long, value_name = "DIR")]
    dest: Option<Utf8PathBuf>,

    /// Directory for the run log and per-job logs
    #[arg(long, value_name = "DIR")]
    log_dir: Option<Utf8PathBuf>,

    /// Scan subdirectories too
    #[arg(short, long)]
    recursive: bool,

    /// Maximum concurrent jobs (0 = number of CPUs)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Report what would happen without touching any file
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Overwrite existing CHD files
    #[arg(short, long)]
    force: bool,

    /// Only convert images for one platform (psx, ps2, dreamcast, psp or none)
    #[arg(short, long, value_name = "TAG")]
    platform: Option<String>,

    /// Keep archives after a successful conversion
    #[arg(long)]
    keep_archive: bool,

    /// Archive extraction program
    #[arg(long, value_name = "PROGRAM")]
    extractor: Option<String>,

    /// CHD codec program
    #[arg(long, value_name = "PROGRAM")]
    chdman: Option<String>,

    /// Kill the extractor or codec after this many seconds (0 = no limit)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<Utf8PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Layer the flags over the loaded configuration. Switches only ever turn settings on.
    fn apply(&self, config: &mut ConvertConfig) -> Result<()> {
        if let Some(source) = &self.source {
            config.source_root = source.clone();
        }
        if let Some(dest) = &self.dest {
            config.dest_root = Some(dest.clone());
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = Some(log_dir.clone());
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(tag) = &self.platform {
            config.platform = parse_filter(tag)?;
        }
        if let Some(extractor) = &self.extractor {
            config.extractor = extractor.clone();
        }
        if let Some(chdman) = &self.chdman {
            config.chdman = chdman.clone();
        }
        if let Some(secs) = self.timeout {
            config.tool_timeout_secs = Some(secs);
        }

        config.recursive |= self.recursive;
        config.dry_run |= self.dry_run;
        config.force |= self.force;
        config.keep_archive |= self.keep_archive;
        Ok(())
    }

    fn load_config(&self) -> Result<ConvertConfig> {
        let manager = match &self.config {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file not found: {}", path);
                }
                ConfigManager::new(path)
            }
            None => ConfigManager::new(DEFAULT_CONFIG_FILE),
        };

        let mut config = manager.load()?;
        self.apply(&mut config)?;
        Ok(config)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Held until exit so the file writer flushes
    let _log_guard =
        setup_logging_with_console(config.log_dir.as_deref(), RUN_LOG_PREFIX, cli.debug, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::debug!("Configuration: {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("autochd-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let aggregator = Arc::new(ResultAggregator::new());
    let tools = CommandTools::new(&config.extractor, &config.chdman, config.tool_timeout());

    let summary = runtime.block_on(async {
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received - cancelling remaining jobs...");
                let _ = cancel_tx.send(true);
            }
        });

        convert_tree(config, tools, metrics.clone(), aggregator, cancel_rx).await
    })?;

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    print!("{}", summary);
    tracing::info!("Run complete");

    if summary.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autochd::Platform;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "autochd",
            "/roms",
            "--dest",
            "/chd",
            "-r",
            "-j",
            "3",
            "--dry-run",
            "--platform",
            "PS1",
            "--timeout",
            "60",
        ])
        .unwrap();

        let mut config = ConvertConfig::default();
        cli.apply(&mut config).unwrap();

        assert_eq!(config.source_root, "/roms");
        assert_eq!(config.dest_root, Some(Utf8PathBuf::from("/chd")));
        assert!(config.recursive);
        assert!(config.dry_run);
        assert!(!config.force);
        assert_eq!(config.jobs, 3);
        assert_eq!(config.platform, Some(Platform::Psx));
        assert_eq!(config.tool_timeout_secs, Some(60));
    }

    #[test]
    fn test_platform_none_clears_file_setting() {
        let cli = Cli::try_parse_from(["autochd", "--platform", "none"]).unwrap();
        let mut config = ConvertConfig {
            platform: Some(Platform::Ps2),
            ..Default::default()
        };

        cli.apply(&mut config).unwrap();
        assert_eq!(config.platform, None);
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let cli = Cli::try_parse_from(["autochd", "--platform", "n64"]).unwrap();
        assert!(cli.apply(&mut ConvertConfig::default()).is_err());
    }
}
