use super::pipeline::{ConversionPipeline, wait_cancelled};
use super::scan::{ScanPlan, Scanner, Shadowed};
use super::tools::DiscTools;
use crate::metrics::Metrics;
use crate::models::{ConversionResult, ConvertConfig, Job, JobKind, Outcome};
use crate::state::{Phase, ResultAggregator, RunSummary};
use anyhow::{Context, Result};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::{Id, JoinSet};

/// Runs jobs with bounded concurrency, archives first.
///
/// Every job of a phase is spawned up front and queues on a semaphore with
/// `limit` permits; a permit is held for the whole job. The loose-image phase
/// only starts once every archive job has recorded its result, because
/// extraction writes into the source tree.
pub struct Scheduler<T: DiscTools> {
    pipeline: Arc<ConversionPipeline<T>>,
    aggregator: Arc<ResultAggregator>,
    limit: usize,
    cancel_rx: watch::Receiver<bool>,
}

impl<T: DiscTools> Scheduler<T> {
    pub fn new(
        pipeline: Arc<ConversionPipeline<T>>,
        aggregator: Arc<ResultAggregator>,
        limit: usize,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pipeline,
            aggregator,
            limit: limit.max(1),
            cancel_rx,
        }
    }

    /// Run both phases and return the summary
    pub async fn run(&self, plan: ScanPlan) -> RunSummary {
        let total = plan.total();
        tracing::info!(
            "Starting {} jobs (max concurrent: {})",
            total,
            self.limit
        );

        let (shadowed_archives, shadowed_loose): (Vec<_>, Vec<_>) = plan
            .shadowed
            .into_iter()
            .partition(|s| s.job.kind == JobKind::Archive);

        self.run_phase(Phase::Archives, plan.archives, shadowed_archives).await;
        self.run_phase(Phase::LooseImages, plan.loose, shadowed_loose).await;

        let summary = self.aggregator.finish();
        if summary.total != total {
            tracing::error!(
                "Recorded {} results for {} jobs",
                summary.total,
                total
            );
        }
        summary
    }

    /// Run one phase to completion. `shadowed` jobs are reported as SKIP
    /// without touching their sources.
    pub async fn run_phase(&self, phase: Phase, jobs: Vec<Job>, shadowed: Vec<Shadowed>) {
        self.aggregator.phase_started(phase, jobs.len() + shadowed.len());

        for Shadowed { job, winner } in shadowed {
            let message = format!("Output is claimed by {}", winner);
            self.aggregator.record(ConversionResult::new(&job, Outcome::Skip, message));
        }

        if jobs.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<Id, Job> = HashMap::new();

        for job in jobs {
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            let cancel_rx = self.cancel_rx.clone();
            let task_job = job.clone();

            let handle = tasks.spawn(async move {
                let mut cancel_for_permit = cancel_rx.clone();

                // Queued jobs stop here when the run is cancelled
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            return ConversionResult::new(&task_job, Outcome::Fail, "Worker pool closed");
                        }
                    },
                    _ = wait_cancelled(&mut cancel_for_permit) => {
                        tracing::warn!("Cancelled before starting: {}", task_job.title);
                        return ConversionResult::new(&task_job, Outcome::Fail, "Cancelled before start");
                    }
                };

                pipeline.process(&task_job, cancel_rx).await
            });

            in_flight.insert(handle.id(), job);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    in_flight.remove(&id);
                    self.aggregator.record(result);
                }
                Err(err) => {
                    let Some(job) = in_flight.remove(&err.id()) else {
                        tracing::error!("Task join error for unknown job: {}", err);
                        continue;
                    };

                    let message = if err.is_panic() {
                        format!("Job panicked: {}", panic_message(err.into_panic()))
                    } else {
                        "Job task was aborted".to_string()
                    };
                    tracing::error!("{}: {}", job.title, message);
                    self.aggregator
                        .record(ConversionResult::new(&job, Outcome::Fail, message));
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Scan `config.source_root` and convert everything found.
///
/// Fails only for run-level problems (invalid configuration, unreadable source
/// root); per-job failures end up in the summary.
pub async fn convert_tree<T: DiscTools>(
    config: ConvertConfig,
    tools: T,
    metrics: Arc<Metrics>,
    aggregator: Arc<ResultAggregator>,
    cancel_rx: watch::Receiver<bool>,
) -> Result<RunSummary> {
    config.validate().context("Invalid configuration")?;

    let plan = Scanner::new(config.recursive, config.platform)
        .scan(&config.source_root)
        .context("Failed to scan source directory")?;

    let limit = config.effective_jobs();
    let pipeline = Arc::new(ConversionPipeline::new(
        Arc::new(config),
        Arc::new(tools),
        metrics,
    ));

    let scheduler = Scheduler::new(pipeline, aggregator, limit, cancel_rx);
    Ok(scheduler.run(plan).await)
}
