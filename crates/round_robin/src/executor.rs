//! Process-per-match execution
//!
//! Every match runs in a fresh worker process (the binary's own hidden
//! `worker` subcommand) that is discarded afterwards. A competitor that leaks
//! memory, corrupts interpreter state or hangs can only take down its own
//! worker. The supervisor side never trusts the worker to cooperate: it
//! enforces a wall-clock deadline and kills the process on expiry or
//! interrupt.
//!
//! Protocol: the supervisor writes a [`WorkerRequest`] as JSON to the worker's
//! stdin and reads a [`MatchOutcome`] as JSON from its stdout. The worker
//! records the outcome in the log itself, so a result survives even if the
//! supervisor dies first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::competitor::{Competitor, Registry};
use crate::config::{MatchLimits, RefereeConfig};
use crate::error::{Result, TournamentError};
use crate::match_runner::MatchRunner;
use crate::outcome::MatchOutcome;
use crate::outcome_log::{OutcomeLog, OutcomeRecord};
use crate::referee::{ExternalReferee, FileLoader};
use crate::schedule::Pairing;

/// Signal number a terminal interrupt delivers to the whole process group
#[cfg(unix)]
const SIGINT: i32 = 2;

// =============================================================================
// Jobs
// =============================================================================

/// One pairing, self-contained so it can cross a process boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchJob {
    /// Moves first
    pub a: Competitor,
    pub b: Competitor,
    pub limits: MatchLimits,
}

impl MatchJob {
    pub fn new(a: Competitor, b: Competitor, limits: MatchLimits) -> Self {
        Self { a, b, limits }
    }

    pub fn from_pairing(registry: &Registry, pairing: &Pairing, limits: MatchLimits) -> Option<Self> {
        let a = registry.get(pairing.a)?.clone();
        let b = registry.get(pairing.b)?.clone();
        Some(Self::new(a, b, limits))
    }
}

/// What the worker process receives on stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job: MatchJob,
    pub log_dir: PathBuf,
    pub referee: RefereeConfig,
}

/// How an execution ended from the supervisor's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Finished(MatchOutcome),
    /// Interrupted before an outcome existed; nothing was recorded
    Abandoned,
}

/// Runs one match to completion in isolation
#[async_trait]
pub trait MatchExecutor: Send + Sync + 'static {
    async fn execute(&self, job: MatchJob, shutdown: watch::Receiver<bool>) -> Execution;
}

// =============================================================================
// Worker side
// =============================================================================

/// Play the requested match in this process and record it.
///
/// An unusable log directory only costs the record: the match is still
/// played and its outcome returned.
pub fn run_worker(request: &WorkerRequest) -> Result<MatchOutcome> {
    let runner = MatchRunner::new(
        FileLoader::new(&request.referee),
        ExternalReferee::new(&request.referee),
        request.job.limits,
    );
    let runner = match OutcomeLog::open(&request.log_dir) {
        Ok(log) => runner.with_log(log),
        Err(e) => {
            warn!(error = %e, "outcome log unavailable, match will not be recorded");
            runner
        }
    };

    let report = runner.run(&request.job.a, &request.job.b);
    debug!(trail = ?report.trail, "worker finished");
    Ok(report.outcome)
}

/// Worker protocol: one request in, one outcome out
pub fn serve_worker(mut input: impl Read, mut output: impl Write) -> Result<()> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .map_err(|e| TournamentError::Worker(format!("failed to read request: {e}")))?;
    let request: WorkerRequest = serde_json::from_str(&raw)?;

    let outcome = run_worker(&request)?;
    serde_json::to_writer(&mut output, &outcome)?;
    output
        .flush()
        .map_err(|e| TournamentError::Worker(format!("failed to write outcome: {e}")))
}

// =============================================================================
// Supervisor side
// =============================================================================

/// Record of the pair as it was before the worker started
type Snapshot = Option<(PathBuf, Option<SystemTime>)>;

enum Ending {
    Exited(std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)>),
    DeadlineExpired,
    Interrupted,
}

/// Executes each job in a freshly spawned worker process
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
    log: OutcomeLog,
    referee: RefereeConfig,
    deadline: Duration,
}

impl ProcessExecutor {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        log: OutcomeLog,
        referee: RefereeConfig,
        deadline: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            log,
            referee,
            deadline,
        }
    }

    /// Workers are this very binary invoked with `worker`
    pub fn current_exe(log: OutcomeLog, referee: RefereeConfig, deadline: Duration) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| TournamentError::Worker(format!("cannot locate own executable: {e}")))?;
        Ok(Self::new(program, vec!["worker".to_string()], log, referee, deadline))
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    fn existing_record(&self, job: &MatchJob) -> Option<OutcomeRecord> {
        match self.log.find_pair(&job.a.name, &job.b.name) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "could not scan outcome log");
                None
            }
        }
    }

    /// The record for this pair if the worker wrote one after `before`
    fn fresh_record(&self, job: &MatchJob, before: &Snapshot) -> Option<OutcomeRecord> {
        let record = self.existing_record(job)?;
        let stamp = modified(&record);
        match before {
            Some((path, old)) if *path == record.path && *old == stamp => None,
            _ => Some(record),
        }
    }

    /// Worker left no usable outcome on stdout
    fn salvage(&self, job: &MatchJob, before: &Snapshot, diagnostic: String) -> Execution {
        if let Some(record) = self.fresh_record(job, before) {
            match record.recover_outcome() {
                Ok(outcome) => {
                    debug!(record = %record.file_name(), "recovered outcome from worker's record");
                    return Execution::Finished(outcome);
                }
                Err(e) => warn!(error = %e, "worker record unreadable"),
            }
        }

        warn!(a = %job.a, b = %job.b, "worker died without an outcome");
        let outcome = MatchOutcome::both_failed();
        if let Err(e) = self
            .log
            .record_diagnostic(&job.a.name, &job.b.name, &outcome, &diagnostic)
        {
            warn!(error = %e, "failed to record outcome, result is lost");
        }
        Execution::Finished(outcome)
    }

    fn expire(&self, job: &MatchJob, before: &Snapshot) -> Execution {
        if let Some(record) = self.fresh_record(job, before) {
            if let Ok(outcome) = record.recover_outcome() {
                return Execution::Finished(outcome);
            }
        }

        warn!(a = %job.a, b = %job.b, deadline = ?self.deadline, "worker exceeded match deadline, killed");
        let outcome = MatchOutcome::timeout(
            None,
            format!(
                "TIMEOUT: worker exceeded the {}s match deadline",
                self.deadline.as_secs()
            ),
        );
        if let Err(e) = self.log.record(&job.a.name, &job.b.name, &outcome) {
            warn!(error = %e, "failed to record outcome, result is lost");
        }
        Execution::Finished(outcome)
    }
}

#[async_trait]
impl MatchExecutor for ProcessExecutor {
    async fn execute(&self, job: MatchJob, mut shutdown: watch::Receiver<bool>) -> Execution {
        if *shutdown.borrow() {
            return Execution::Abandoned;
        }

        let before: Snapshot = self
            .existing_record(&job)
            .map(|r| (r.path.clone(), modified(&r)));
        let request = WorkerRequest {
            job: job.clone(),
            log_dir: self.log.dir().to_path_buf(),
            referee: self.referee.clone(),
        };
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(e) => return self.salvage(&job, &before, format!("could not encode job: {e}")),
        };

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => return self.salvage(&job, &before, format!("could not start worker: {e}")),
        };
        debug!(a = %job.a, b = %job.b, pid = ?child.id(), "worker started");

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload).await {
                warn!(error = %e, "failed to hand job to worker");
            }
        }

        let ending = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => Ending::Interrupted,
            _ = tokio::time::sleep(self.deadline) => Ending::DeadlineExpired,
            result = collect(&mut child) => Ending::Exited(result),
        };

        match ending {
            Ending::Interrupted => {
                let _ = child.kill().await;
                debug!(a = %job.a, b = %job.b, "worker killed on interrupt");
                Execution::Abandoned
            }
            Ending::DeadlineExpired => {
                let _ = child.kill().await;
                self.expire(&job, &before)
            }
            Ending::Exited(Err(e)) => self.salvage(&job, &before, format!("lost contact with worker: {e}")),
            Ending::Exited(Ok((status, stdout, stderr))) => {
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                match serde_json::from_slice::<MatchOutcome>(&stdout) {
                    Ok(outcome) if outcome.is_consistent() => Execution::Finished(outcome),
                    _ if *shutdown.borrow() || interrupted(&status) => Execution::Abandoned,
                    _ => self.salvage(&job, &before, format!("worker exited with {status}\n{stderr}")),
                }
            }
        }
    }
}

async fn collect(child: &mut Child) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let (stdout, stderr) = tokio::join!(read_pipe(child.stdout.take()), read_pipe(child.stderr.take()));
    let status = child.wait().await?;
    Ok((status, stdout?, stderr?))
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Resolves once shutdown is requested; never if the sender is gone
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn modified(record: &OutcomeRecord) -> Option<SystemTime> {
    std::fs::metadata(&record.path)
        .and_then(|m| m.modified())
        .ok()
}

#[cfg(unix)]
fn interrupted(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn interrupted(_status: &ExitStatus) -> bool {
    false
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod executor_tests;
