// AutoCHD - Batch conversion of disc images and archived ROM dumps to CHD
//
// This is the library crate containing the conversion core and data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{ConversionResult, ConvertConfig, Job, JobKind, Outcome, Platform};
pub use services::{CommandTools, DiscTools, Scanner, Scheduler, convert_tree};
pub use state::{ResultAggregator, RunEvent, RunSummary};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
