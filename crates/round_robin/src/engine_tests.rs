use super::*;
use crate::competitor::Competitor;
use crate::config::MatchLimits;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn competitor(id: usize) -> Competitor {
    Competitor {
        id,
        name: format!("bot{id}"),
        entry_point: None,
        source: None,
        is_builtin: false,
    }
}

fn jobs(n: usize) -> Vec<MatchJob> {
    (0..n)
        .map(|i| MatchJob::new(competitor(2 * i), competitor(2 * i + 1), MatchLimits::default()))
        .collect()
}

/// Finishes every match as a draw after `delay`, tracking concurrency
#[derive(Default)]
struct CountingExecutor {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

#[async_trait]
impl MatchExecutor for CountingExecutor {
    async fn execute(&self, _job: MatchJob, _shutdown: watch::Receiver<bool>) -> Execution {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Execution::Finished(MatchOutcome::turn_limit_draw(json!([])))
    }
}

/// Plays until interrupted, like a worker that is killed on shutdown
struct CooperativeExecutor;

#[async_trait]
impl MatchExecutor for CooperativeExecutor {
    async fn execute(&self, _job: MatchJob, mut shutdown: watch::Receiver<bool>) -> Execution {
        wait_for_shutdown(&mut shutdown).await;
        Execution::Abandoned
    }
}

/// Ignores shutdown entirely
struct WedgedExecutor;

#[async_trait]
impl MatchExecutor for WedgedExecutor {
    async fn execute(&self, _job: MatchJob, _shutdown: watch::Receiver<bool>) -> Execution {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Execution::Abandoned
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let engine = ExecutionEngine::new(
        CountingExecutor {
            delay: Duration::from_millis(20),
            ..Default::default()
        },
        3,
    );
    let (_tx, rx) = watch::channel(false);

    let summary = engine.run_all(jobs(10), rx, |_, _| {}).await;

    assert_eq!(summary.outcomes.len(), 10);
    assert_eq!(summary.abandoned, 0);
    assert!(!summary.interrupted);
    let peak = engine.executor.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    assert!(peak >= 2, "matches never overlapped");
}

#[tokio::test]
async fn test_results_are_streamed_once_each() {
    let engine = ExecutionEngine::new(CountingExecutor::default(), 4);
    let (_tx, rx) = watch::channel(false);
    let seen = Mutex::new(Vec::new());

    let summary = engine
        .run_all(jobs(6), rx, |job, outcome| {
            seen.lock().unwrap().push((job.a.id, outcome.reason()));
        })
        .await;

    let mut seen = seen.into_inner().unwrap();
    seen.sort_by_key(|(id, _)| *id);
    assert_eq!(seen.len(), 6);
    assert_eq!(
        seen.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![0, 2, 4, 6, 8, 10]
    );
    assert_eq!(summary.outcomes.len(), 6);
}

#[tokio::test]
async fn test_zero_concurrency_still_runs() {
    let engine = ExecutionEngine::new(CountingExecutor::default(), 0);
    let (_tx, rx) = watch::channel(false);
    let summary = engine.run_all(jobs(2), rx, |_, _| {}).await;
    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(engine.executor.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_job_list() {
    let engine = ExecutionEngine::new(CountingExecutor::default(), 2);
    let (_tx, rx) = watch::channel(false);
    let summary = engine.run_all(Vec::new(), rx, |_, _| {}).await;
    assert!(summary.outcomes.is_empty());
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn test_interrupt_stops_dispatch() {
    let engine = ExecutionEngine::new(CooperativeExecutor, 2);
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
    });
    let summary = engine.run_all(jobs(5), rx, |_, _| {}).await;

    assert!(summary.interrupted);
    assert!(summary.outcomes.is_empty());
    assert_eq!(summary.abandoned, 2);
    assert_eq!(summary.not_started, 3);
}

#[tokio::test]
async fn test_wedged_matches_are_aborted_after_grace() {
    let engine = ExecutionEngine::new(WedgedExecutor, 2).with_grace(Duration::from_millis(50));
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(true);
    });
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        engine.run_all(jobs(3), rx, |_, _| {}),
    )
    .await
    .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.abandoned, 2);
    assert_eq!(summary.not_started, 1);
}

#[tokio::test]
async fn test_interrupt_before_start() {
    let engine = ExecutionEngine::new(CountingExecutor::default(), 2);
    let (_tx, rx) = watch::channel(true);
    let summary = engine.run_all(jobs(4), rx, |_, _| {}).await;
    assert!(summary.interrupted);
    assert_eq!(summary.not_started, 4);
    assert_eq!(engine.executor.started.load(Ordering::SeqCst), 0);
}
