//! Match runner for playing one pairing between two competitors
//!
//! The runner never fails: every problem with a competitor (it does not load,
//! it crashes mid-game, it runs out of time) is classified into a
//! [`MatchOutcome`], and exactly one record is written to the outcome log
//! before the runner returns.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use tracing::{debug, trace, warn};

use crate::blame::{Blame, BlameResolver, NameMatchBlame};
use crate::competitor::Competitor;
use crate::config::MatchLimits;
use crate::outcome::{Fault, MatchOutcome, Side};
use crate::outcome_log::OutcomeLog;

// =============================================================================
// Collaborator interfaces
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Side `A` always plays white
    pub fn side(self) -> Side {
        match self {
            Color::White => Side::A,
            Color::Black => Side::B,
        }
    }
}

/// How the referee ended a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Played to a result (capture, resignation, ...)
    Decisive,
    /// Turn ceiling reached
    TurnLimit,
    /// A side exhausted its clock
    Timeout,
}

/// What the game-simulation collaborator returns for a finished game
#[derive(Debug, Clone, PartialEq)]
pub struct GameReport {
    pub winner: Option<Color>,
    pub termination: Termination,
    pub transcript: serde_json::Value,
}

/// Produces fresh player instances of a loaded competitor
pub trait PlayerFactory {
    type Player;

    fn create(&self) -> Result<Self::Player, Fault>;
}

/// Resolves a competitor's entry point into a player factory
pub trait Loader {
    type Factory: PlayerFactory;

    fn load(&self, competitor: &Competitor) -> Result<Self::Factory, Fault>;
}

/// Plays one game between two players under the given limits
pub trait Simulator<P> {
    fn simulate(&self, white: P, black: P, limits: &MatchLimits) -> Result<GameReport, Fault>;
}

type PlayerOf<L> = <<L as Loader>::Factory as PlayerFactory>::Player;

// =============================================================================
// Runner
// =============================================================================

/// Lifecycle of one match; phases only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    NotStarted,
    Loading,
    LoadFailed,
    InGame,
    Decided,
    Faulted,
    Recorded,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: MatchOutcome,
    /// Path of the written record (None if the log could not be written)
    pub record: Option<PathBuf>,
    pub trail: Vec<Phase>,
}

/// Runs single matches and classifies their result
pub struct MatchRunner<L, S, B = NameMatchBlame> {
    loader: L,
    simulator: S,
    blame: B,
    log: Option<OutcomeLog>,
    limits: MatchLimits,
}

impl<L, S> MatchRunner<L, S, NameMatchBlame>
where
    L: Loader,
    S: Simulator<PlayerOf<L>>,
{
    pub fn new(loader: L, simulator: S, limits: MatchLimits) -> Self {
        Self {
            loader,
            simulator,
            blame: NameMatchBlame,
            log: None,
            limits,
        }
    }
}

impl<L, S, B> MatchRunner<L, S, B>
where
    L: Loader,
    S: Simulator<PlayerOf<L>>,
    B: BlameResolver,
{
    /// Write every outcome to `log`
    pub fn with_log(mut self, log: OutcomeLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Replace the fault attribution strategy
    pub fn with_blame<B2: BlameResolver>(self, blame: B2) -> MatchRunner<L, S, B2> {
        MatchRunner {
            loader: self.loader,
            simulator: self.simulator,
            blame,
            log: self.log,
            limits: self.limits,
        }
    }

    /// Play `a` (white) against `b` (black)
    pub fn run(&self, a: &Competitor, b: &Competitor) -> RunReport {
        let mut trail = vec![Phase::NotStarted];
        let advance = |trail: &mut Vec<Phase>, phase: Phase| {
            trace!(a = %a, b = %b, ?phase, "match phase");
            trail.push(phase);
        };

        advance(&mut trail, Phase::Loading);
        let loaded_a = guarded(|| self.loader.load(a));
        let loaded_b = guarded(|| self.loader.load(b));

        let (outcome, diagnostic) = match (loaded_a, loaded_b) {
            (Err(fault_a), Err(fault_b)) => {
                advance(&mut trail, Phase::LoadFailed);
                let diagnostic = format!("{a}:\n{fault_a}\n\n{b}:\n{fault_b}");
                (MatchOutcome::both_failed(), Some(diagnostic))
            }
            (Err(fault), Ok(_)) => {
                advance(&mut trail, Phase::LoadFailed);
                (MatchOutcome::load_error(Side::B, fault.detail), None)
            }
            (Ok(_), Err(fault)) => {
                advance(&mut trail, Phase::LoadFailed);
                (MatchOutcome::load_error(Side::A, fault.detail), None)
            }
            (Ok(factory_a), Ok(factory_b)) => {
                advance(&mut trail, Phase::InGame);
                debug!("Playing {} vs {}", a, b);
                let played = guarded(|| {
                    let white = factory_a.create()?;
                    let black = factory_b.create()?;
                    self.simulator.simulate(white, black, &self.limits)
                });
                match played.and_then(|report| self.decide(a, b, report)) {
                    Ok(outcome) => {
                        advance(&mut trail, Phase::Decided);
                        (outcome, None)
                    }
                    Err(fault) => {
                        advance(&mut trail, Phase::Faulted);
                        self.attribute(a, b, fault)
                    }
                }
            }
        };

        let written = match (&self.log, &diagnostic) {
            (None, _) => None,
            (Some(log), Some(text)) => Some(log.record_diagnostic(&a.name, &b.name, &outcome, text)),
            (Some(log), None) => Some(log.record(&a.name, &b.name, &outcome)),
        };
        let record = match written {
            Some(Ok(path)) => {
                advance(&mut trail, Phase::Recorded);
                Some(path)
            }
            Some(Err(e)) => {
                warn!(a = %a, b = %b, error = %e, "failed to record outcome, result is lost");
                None
            }
            None => None,
        };

        RunReport {
            outcome,
            record,
            trail,
        }
    }

    /// Turn a finished game into an outcome
    fn decide(&self, a: &Competitor, b: &Competitor, report: GameReport) -> Result<MatchOutcome, Fault> {
        let winner = report.winner.map(Color::side);
        match report.termination {
            Termination::TurnLimit => Ok(MatchOutcome::turn_limit_draw(report.transcript)),
            Termination::Timeout => {
                let detail = match winner {
                    Some(side) => {
                        let loser = if side == Side::A { b } else { a };
                        format!(
                            "TIMEOUT: {loser} exhausted its {}s clock",
                            self.limits.seconds_per_player
                        )
                    }
                    None => "TIMEOUT: game ended on time without a winner".to_string(),
                };
                Ok(MatchOutcome::timeout(winner, detail))
            }
            Termination::Decisive => match winner {
                Some(side) => Ok(MatchOutcome::normal_win(side, report.transcript)),
                None => Err(Fault::new(
                    "referee reported a decisive result without a winner",
                )),
            },
        }
    }

    /// Decide a faulted game from its diagnostic text. The timeout sentinel
    /// takes precedence over runtime-error attribution.
    fn attribute(&self, a: &Competitor, b: &Competitor, fault: Fault) -> (MatchOutcome, Option<String>) {
        let blamed = match self.blame.resolve(a, b, &fault.detail) {
            Blame::Side(side) => Some(side),
            Blame::Unidentified | Blame::Ambiguous => None,
        };

        if fault.mentions_timeout() {
            let winner = blamed.map(Side::other);
            return (MatchOutcome::timeout(winner, fault.detail), None);
        }

        match blamed {
            Some(side) => (MatchOutcome::runtime_error(side.other(), fault.detail), None),
            None => {
                warn!(a = %a, b = %b, "runtime fault could not be attributed to either side");
                (MatchOutcome::both_failed(), Some(fault.detail))
            }
        }
    }
}

/// Run a collaborator call, converting a panic into a fault
fn guarded<T>(f: impl FnOnce() -> Result<T, Fault>) -> Result<T, Fault> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Fault::new(format!("panic: {message}")))
        }
    }
}

#[cfg(test)]
#[path = "match_runner_tests.rs"]
mod match_runner_tests;
