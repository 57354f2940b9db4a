//! Data models for AutoCHD.
//!
//! - [`Job`]: one archive or loose image discovered by the scanner
//! - [`SourceSet`]: the primary descriptor/image plus the track files it references
//! - [`ConversionResult`] and [`Outcome`]: the terminal record of a job
//! - [`ConvertConfig`]: the settings consumed by the conversion core
//! - [`Platform`]: the closed set of platform filter tags

pub mod config;
pub mod job;
pub mod platform;

pub use config::{ConfigError, ConvertConfig};
pub use job::{CodecMode, ConversionResult, Job, JobKind, JobState, Outcome, SourceSet};
pub use platform::{Platform, UnknownPlatform};
