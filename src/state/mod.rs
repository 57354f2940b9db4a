// Run state
//
// The ResultAggregator collects one ConversionResult per job from concurrent
// workers and emits RunEvents so a front end can follow progress.

use crate::models::{ConversionResult, Outcome};
use indexmap::IndexMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// The two scheduling phases of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Archives,
    LooseImages,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Archives => f.write_str("archives"),
            Phase::LooseImages => f.write_str("loose images"),
        }
    }
}

/// Progress events emitted while a run is in flight
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    PhaseStarted { phase: Phase, jobs: usize },

    JobFinished {
        title: String,
        outcome: Outcome,
        message: String,
        completed: usize,
    },

    RunFinished(RunSummary),
}

/// Outcome counts for a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per outcome category, in [`Outcome::ALL`] order
    pub counts: IndexMap<Outcome, usize>,
    pub total: usize,
    pub failed_titles: Vec<String>,
}

impl RunSummary {
    pub fn from_results(results: &[ConversionResult]) -> Self {
        let mut counts: IndexMap<Outcome, usize> =
            Outcome::ALL.iter().map(|outcome| (*outcome, 0)).collect();
        let mut failed_titles = Vec::new();

        for result in results {
            *counts.entry(result.outcome).or_insert(0) += 1;
            if result.outcome == Outcome::Fail {
                failed_titles.push(result.title.clone());
            }
        }
        failed_titles.sort();

        Self {
            counts,
            total: results.len(),
            failed_titles,
        }
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn has_failures(&self) -> bool {
        self.count(Outcome::Fail) > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary: {} job(s)", self.total)?;
        for (outcome, count) in &self.counts {
            writeln!(f, "  {:<17} {}", outcome.as_str(), count)?;
        }
        if !self.failed_titles.is_empty() {
            writeln!(f, "Failed:")?;
            for title in &self.failed_titles {
                writeln!(f, "  {}", title)?;
            }
        }
        Ok(())
    }
}

/// Collects job results from concurrent workers.
///
/// The only state shared between jobs. Writes go through a lock so no result
/// is lost, and a poisoned lock is recovered rather than dropping the tally.
pub struct ResultAggregator {
    results: RwLock<Vec<ConversionResult>>,

    /// Broadcast channel for progress events; sending without subscribers is fine
    events_tx: broadcast::Sender<RunEvent>,
}

impl ResultAggregator {
    /// Create an empty aggregator with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(100);
        Self {
            results: RwLock::new(Vec::new()),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events_tx.subscribe()
    }

    pub fn phase_started(&self, phase: Phase, jobs: usize) {
        tracing::info!("Starting phase: {} ({} jobs)", phase, jobs);
        let _ = self.events_tx.send(RunEvent::PhaseStarted { phase, jobs });
    }

    /// Record the terminal result of a job
    pub fn record(&self, result: ConversionResult) {
        tracing::info!("[{}] {}: {}", result.outcome, result.title, result.message);

        let title = result.title.clone();
        let outcome = result.outcome;
        let message = result.message.clone();

        let completed = {
            let mut results = self.results.write().unwrap_or_else(PoisonError::into_inner);
            results.push(result);
            results.len()
        };

        let event = RunEvent::JobFinished {
            title,
            outcome,
            message,
            completed,
        };
        let _ = self.events_tx.send(event);
    }

    /// Snapshot of all results recorded so far
    pub fn results(&self) -> Vec<ConversionResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> RunSummary {
        let results = self.results.read().unwrap_or_else(PoisonError::into_inner);
        RunSummary::from_results(&results)
    }

    /// Build the final summary and announce the end of the run
    pub fn finish(&self) -> RunSummary {
        let summary = self.summary();
        let _ = self.events_tx.send(RunEvent::RunFinished(summary.clone()));
        summary
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}
