//! Services module - the conversion core.
//!
//! Everything here is independent of the command-line front end, so it can be
//! driven from tests with a fake [`DiscTools`] in place of 7-Zip and chdman.
//!
//! # Components
//!
//! - [`Scanner`]: walks the source tree and produces a [`ScanPlan`] of archive
//!   jobs and loose-image jobs
//! - [`ConversionPipeline`]: drives one job to its terminal outcome:
//!   - extraction into a private `.autochd-*` directory for archives
//!   - descriptor selection ([`select_primary`]) and track resolution ([`DescriptorParser`])
//!   - codec invocation through [`DiscTools`]
//!   - verified cleanup of the sources ([`remove_sources`])
//! - [`Scheduler`]: runs the archive phase and then the loose phase with a
//!   bounded number of concurrent jobs
//! - [`JobLog`]: the per-job append-only log file
//! - [`PathMirror`]: maps source directories onto the destination tree
//!
//! # Usage Example
//!
//! ```ignore
//! use autochd::services::{convert_tree, CommandTools};
//!
//! let tools = CommandTools::new(&config.extractor, &config.chdman, config.tool_timeout());
//! let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//!
//! let summary = convert_tree(config, tools, metrics, aggregator, cancel_rx).await?;
//! println!("{}", summary);
//! ```

pub mod cleanup;
pub mod descriptor;
pub mod job_log;
pub mod mirror;
pub mod pipeline;
pub mod platform;
pub mod scan;
pub mod scheduler;
pub mod tools;

pub use cleanup::{CleanupReport, confine_to, output_is_valid, remove_sources};
pub use descriptor::{DescriptorParser, Selection, select_primary};
pub use job_log::{JobLog, LogLevel};
pub use mirror::{PathMirror, ensure_dir};
pub use pipeline::{ConversionError, ConversionPipeline, EXTRACT_DIR_PREFIX};
pub use platform::{FormatBucket, accepts, classify};
pub use scan::{ScanPlan, Scanner, Shadowed};
pub use scheduler::{Scheduler, convert_tree};
pub use tools::{CodecRequest, CommandTools, DiscTools, Invocation, ToolError, ToolOutput};
