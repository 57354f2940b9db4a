// Run metrics
//
// Lightweight counters for the external tools and the bytes moved by a run

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every job of a run.
///
/// Uses atomic operations so jobs can record without locks. Logged once when
/// the run finishes.
#[derive(Debug)]
pub struct Metrics {
    /// Extractor invocations
    pub extractions: AtomicUsize,

    /// Codec invocations
    pub conversions: AtomicUsize,

    /// Extractor or codec runs that exited non-zero, timed out or failed to start
    pub tool_failures: AtomicUsize,

    /// Total time spent inside the codec in milliseconds
    pub total_codec_time_ms: AtomicU64,

    /// Size of the CHD files produced
    pub bytes_written: AtomicU64,

    /// Size of the source files removed after conversion
    pub bytes_deleted: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            extractions: AtomicUsize::new(0),
            conversions: AtomicUsize::new(0),
            tool_failures: AtomicUsize::new(0),
            total_codec_time_ms: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_deleted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_extraction(&self) {
        self.extractions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one codec run and how long it took
    pub fn record_conversion(&self, duration: Duration) {
        self.conversions.fetch_add(1, Ordering::Relaxed);
        self.total_codec_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_tool_failure(&self) {
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_deleted(&self, bytes: u64) {
        self.bytes_deleted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average codec time per conversion in milliseconds
    pub fn avg_conversion_time_ms(&self) -> f64 {
        let total = self.total_codec_time_ms.load(Ordering::Relaxed);
        let count = self.conversions.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Run Metrics ===");
        tracing::info!("Elapsed: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tools: {} extractions, {} conversions, {} failures",
            self.extractions.load(Ordering::Relaxed),
            self.conversions.load(Ordering::Relaxed),
            self.tool_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Codec time: {:.2}s (avg: {:.2}ms per conversion)",
            self.total_codec_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_conversion_time_ms()
        );
        tracing::info!(
            "Bytes: {} written, {} deleted",
            self.bytes_written.load(Ordering::Relaxed),
            self.bytes_deleted.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
