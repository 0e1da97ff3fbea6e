//! Round-robin tournament CLI
//!
//! Plays every competitor against every other one, each match in its own
//! worker process, and rebuilds the leaderboard from the outcome log.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use round_robin::{
    aggregate, patch_engine_paths, plan_pairings, reconcile, schedule, serve_worker, timeout_rerun_pairings,
    AliasPair, ExecutionEngine, Leaderboard, MatchJob, MatchOutcome, OutcomeLog, ProcessExecutor,
    Registry, TournamentConfig, Winner,
};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "tournament.toml";

#[derive(Parser, Debug)]
#[command(name = "round-robin", version)]
#[command(about = "Crash-isolated round-robin tournament runner", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./tournament.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the tournament
    Run {
        /// Directory holding one entry per submission
        #[arg(default_value = "submissions")]
        submissions: PathBuf,

        /// Only play matches involving this submission
        #[arg(long)]
        single_submission: Option<PathBuf>,

        /// Where outcome records are written
        #[arg(long)]
        replay_dir: Option<PathBuf>,

        /// Replay only the matches whose record timed out
        #[arg(long, value_name = "DIR", num_args = 0..=1)]
        rerun_timeouts: Option<Option<PathBuf>>,

        /// Maximum number of matches running at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Merge aliased identities and remove duplicate records
    Reconcile {
        replay_dir: Option<PathBuf>,

        /// Identity pair, e.g. `Phuti=Lesego` keeps Phuti's records
        #[arg(long = "alias", value_name = "PREFERRED=ALIAS", value_parser = parse_alias)]
        aliases: Vec<AliasPair>,
    },

    /// Rebuild the leaderboard from the outcome log
    Leaderboard {
        replay_dir: Option<PathBuf>,

        /// CSV export path
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Point every submission's engine launch at one binary
    PatchEnginePath {
        /// Directory holding one entry per submission
        submissions: PathBuf,

        /// Engine binary the submissions should start
        #[arg(long)]
        engine_path: String,
    },

    /// Play a single match (spawned by `run`)
    #[command(hide = true)]
    Worker,
}

fn parse_alias(spec: &str) -> std::result::Result<AliasPair, String> {
    AliasPair::parse(spec).ok_or_else(|| format!("expected PREFERRED=ALIAS, got `{spec}`"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => TournamentConfig::load(path)?,
        None => TournamentConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };

    match cli.command {
        Commands::Worker => {
            serve_worker(std::io::stdin().lock(), std::io::stdout().lock())
                .context("worker failed")?;
        }
        Commands::Run {
            submissions,
            single_submission,
            replay_dir,
            rerun_timeouts,
            concurrency,
        } => {
            let mut config = config;
            // `--rerun-timeouts DIR` names the log to read and rewrite
            if let Some(Some(dir)) = &rerun_timeouts {
                config.log.replay_dir = dir.clone();
            } else if let Some(dir) = replay_dir {
                config.log.replay_dir = dir;
            }
            if let Some(n) = concurrency {
                config.tournament.concurrency = n;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(run_tournament(
                config,
                &submissions,
                single_submission.as_deref(),
                rerun_timeouts.is_some(),
            ))?;
        }
        Commands::Reconcile {
            replay_dir,
            aliases,
        } => {
            let dir = replay_dir.unwrap_or(config.log.replay_dir);
            let mut pairs = config.aliases;
            pairs.extend(aliases);

            let log = OutcomeLog::existing(&dir)?;
            let report = reconcile(&log, &pairs)
                .with_context(|| format!("failed to reconcile {}", dir.display()))?;
            for name in &report.deleted {
                println!("deleted  {name}");
            }
            for (from, to) in &report.renamed {
                println!("renamed  {from} -> {to}");
            }
            if report.is_empty() {
                println!("Nothing to reconcile");
            }
        }
        Commands::Leaderboard { replay_dir, csv } => {
            let dir = replay_dir.unwrap_or(config.log.replay_dir.clone());
            let csv = csv.unwrap_or(config.leaderboard.csv_path.clone());
            publish_leaderboard(&OutcomeLog::existing(&dir)?, &config, None, &csv)?;
        }
        Commands::PatchEnginePath {
            submissions,
            engine_path,
        } => {
            let report =
                patch_engine_paths(&submissions, &engine_path, &config.registry.entry_extension)?;
            println!("Found {} files", report.files_scanned);
            println!("Changed {} lines", report.lines_changed);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_tournament(
    config: TournamentConfig,
    submissions: &Path,
    single: Option<&Path>,
    rerun_timeouts: bool,
) -> Result<()> {
    let log = OutcomeLog::open(&config.log.replay_dir)?;
    let registry = Registry::discover(submissions, &config.registry)
        .with_context(|| format!("failed to read submissions from {}", submissions.display()))?;
    info!(competitors = registry.len(), "registry loaded");

    let pairings = if rerun_timeouts {
        timeout_rerun_pairings(&log, &registry)?
    } else {
        let single = single.map(|path| locate_submission(&registry, submissions, path));
        if let Some(path) = &single {
            if registry.find_by_source(path).is_none() {
                bail!("{} is not a discovered submission", path.display());
            }
        }
        let rounds = schedule(&registry.ids())?;
        plan_pairings(&registry, &rounds, single.as_deref())
    };

    let limits = config.tournament.limits();
    let jobs: Vec<MatchJob> = pairings
        .iter()
        .filter_map(|pairing| MatchJob::from_pairing(&registry, pairing, limits))
        .collect();

    let executor = ProcessExecutor::current_exe(
        log.clone(),
        config.referee.clone(),
        config.tournament.match_deadline(),
    )?;
    let engine = ExecutionEngine::new(executor, config.tournament.concurrency)
        .with_grace(config.tournament.interrupt_grace());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping matches");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = engine.run_all(jobs, shutdown_rx, print_disposition).await;
    if summary.interrupted {
        println!(
            "Interrupted: {} matches abandoned, {} never started",
            summary.abandoned, summary.not_started
        );
    }
    info!(completed = summary.outcomes.len(), "matches finished");

    publish_leaderboard(&log, &config, Some(&registry), &config.leaderboard.csv_path)
}

/// Accept either the discovered path or anything naming the same entry
fn locate_submission(registry: &Registry, submissions: &Path, path: &Path) -> PathBuf {
    if registry.find_by_source(path).is_some() {
        return path.to_path_buf();
    }
    match path.file_name() {
        Some(name) => submissions.join(name),
        None => path.to_path_buf(),
    }
}

fn print_disposition(job: &MatchJob, outcome: &MatchOutcome) {
    let line = match outcome.winner() {
        Winner::A => format!("Winner: {}, Reason: {}", job.a.name, outcome.reason()),
        Winner::B => format!("Winner: {}, Reason: {}", job.b.name, outcome.reason()),
        Winner::Draw => format!("Draw, Reason: {}", outcome.reason()),
        Winner::Unknown => format!("!! INTERNAL ERROR, Reason: {}", outcome.reason()),
    };
    println!("{} vs {}: {}", job.a.name, job.b.name, line);
}

fn publish_leaderboard(
    log: &OutcomeLog,
    config: &TournamentConfig,
    registry: Option<&Registry>,
    csv: &Path,
) -> Result<()> {
    let records = log
        .scan()
        .with_context(|| format!("failed to scan {}", log.dir().display()))?;
    let standings = aggregate(&records, &config.leaderboard)?;
    let leaderboard = Leaderboard::new(&standings, registry);
    leaderboard.print();
    leaderboard.write_csv(csv)?;
    info!(path = %csv.display(), "leaderboard exported");
    Ok(())
}
