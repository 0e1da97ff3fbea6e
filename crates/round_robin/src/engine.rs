//! Execution engine
//!
//! Dispatches match jobs onto at most `concurrency` executors at a time and
//! streams each outcome to the caller as soon as it is known. Completion order
//! is not submission order; the outcome log makes ordering irrelevant.
//!
//! On interrupt the engine stops dispatching at once. Executors observe the
//! same shutdown signal and kill their workers; whatever has not settled
//! within the grace period is aborted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::executor::{wait_for_shutdown, Execution, MatchExecutor, MatchJob};
use crate::outcome::MatchOutcome;

/// What a call to [`ExecutionEngine::run_all`] achieved
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Completed matches in completion order
    pub outcomes: Vec<(MatchJob, MatchOutcome)>,
    /// In-flight matches killed or aborted by an interrupt
    pub abandoned: usize,
    /// Jobs never dispatched because of an interrupt
    pub not_started: usize,
    pub interrupted: bool,
}

pub struct ExecutionEngine<E> {
    executor: Arc<E>,
    concurrency: usize,
    grace: Duration,
}

impl<E: MatchExecutor> ExecutionEngine<E> {
    /// A `concurrency` of zero is treated as one
    pub fn new(executor: E, concurrency: usize) -> Self {
        Self {
            executor: Arc::new(executor),
            concurrency: concurrency.max(1),
            grace: Duration::from_secs(5),
        }
    }

    /// How long an interrupted run waits for in-flight matches to settle
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run every job, calling `on_result` for each completed match
    pub async fn run_all<F>(
        &self,
        jobs: Vec<MatchJob>,
        mut shutdown: watch::Receiver<bool>,
        mut on_result: F,
    ) -> RunSummary
    where
        F: FnMut(&MatchJob, &MatchOutcome),
    {
        let total = jobs.len();
        info!(matches = total, concurrency = self.concurrency, "starting matches");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(MatchJob, Execution)> = JoinSet::new();
        let mut pending = jobs.into_iter().peekable();
        let mut summary = RunSummary::default();

        loop {
            let has_next = pending.peek().is_some();
            if !has_next && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    summary.interrupted = true;
                    break;
                }
                Some(joined) = tasks.join_next() => {
                    settle(&mut summary, &mut on_result, joined);
                }
                permit = semaphore.clone().acquire_owned(), if has_next => {
                    let (Ok(permit), Some(job)) = (permit, pending.next()) else {
                        break;
                    };
                    debug!(a = %job.a, b = %job.b, "dispatching match");
                    let executor = Arc::clone(&self.executor);
                    let signal = shutdown.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        let execution = executor.execute(job.clone(), signal).await;
                        (job, execution)
                    });
                }
            }
        }

        if summary.interrupted {
            summary.not_started = pending.count();
            warn!(
                in_flight = tasks.len(),
                not_started = summary.not_started,
                "interrupted, stopping in-flight matches"
            );

            let drain = async {
                while let Some(joined) = tasks.join_next().await {
                    settle(&mut summary, &mut on_result, joined);
                }
            };
            if tokio::time::timeout(self.grace, drain).await.is_err() {
                warn!(stuck = tasks.len(), "matches did not stop within grace period, aborting");
                summary.abandoned += tasks.len();
                tasks.abort_all();
            }
        }

        info!(
            completed = summary.outcomes.len(),
            abandoned = summary.abandoned,
            "matches finished"
        );
        summary
    }
}

fn settle<F>(
    summary: &mut RunSummary,
    on_result: &mut F,
    joined: Result<(MatchJob, Execution), JoinError>,
) where
    F: FnMut(&MatchJob, &MatchOutcome),
{
    match joined {
        Ok((job, Execution::Finished(outcome))) => {
            on_result(&job, &outcome);
            summary.outcomes.push((job, outcome));
        }
        Ok((job, Execution::Abandoned)) => {
            debug!(a = %job.a, b = %job.b, "match abandoned");
            summary.abandoned += 1;
        }
        Err(e) => {
            warn!(error = %e, "match task failed");
            summary.abandoned += 1;
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
