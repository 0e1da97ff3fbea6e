//! Adapters to the external referee program
//!
//! The referee owns the game rules and the clocks. It is invoked once per game
//! and prints a JSON verdict on stdout:
//!
//! ```json
//! {"winner": "white", "termination": "decisive", "transcript": {...}}
//! ```
//!
//! Anything it prints on stderr when it exits unsuccessfully is treated as the
//! game's diagnostic (typically a traceback naming the faulty submission).

use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::{debug, trace};

use crate::competitor::{Competitor, EntryPoint};
use crate::config::{MatchLimits, RefereeConfig};
use crate::match_runner::{Color, GameReport, Loader, PlayerFactory, Simulator, Termination};
use crate::outcome::Fault;

// =============================================================================
// Loading
// =============================================================================

/// A competitor ready to be seated at a game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub name: String,
    pub entry_point: EntryPoint,
}

impl PlayerFactory for Seat {
    type Player = Seat;

    fn create(&self) -> Result<Seat, Fault> {
        Ok(self.clone())
    }
}

/// Checks that a competitor's entry point can be used
///
/// Built-in bots always load. Source files must exist, and when a probe
/// command is configured it must accept the file.
#[derive(Debug, Clone)]
pub struct FileLoader {
    program: PathBuf,
    probe_args: Option<Vec<String>>,
}

impl FileLoader {
    pub fn new(config: &RefereeConfig) -> Self {
        Self {
            program: config.program.clone(),
            probe_args: config.probe_args.clone(),
        }
    }

    fn probe(&self, name: &str, entry: &EntryPoint) -> Result<(), Fault> {
        let Some(args) = &self.probe_args else {
            return Ok(());
        };
        debug!(competitor = name, "probing entry point");
        let output = Command::new(&self.program)
            .args(args)
            .arg(entry.as_arg())
            .output()
            .map_err(|e| Fault::new(format!("{name}: could not start probe: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Fault::new(format!(
                "{name} failed to load ({})\n{}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            )))
        }
    }
}

impl Loader for FileLoader {
    type Factory = Seat;

    fn load(&self, competitor: &Competitor) -> Result<Seat, Fault> {
        let name = &competitor.name;
        let entry = competitor
            .entry_point
            .clone()
            .ok_or_else(|| Fault::new(format!("{name}: no entry point")))?;

        if let EntryPoint::File(path) = &entry {
            if !path.is_file() {
                return Err(Fault::new(format!(
                    "{name}: entry point {} does not exist",
                    path.display()
                )));
            }
            self.probe(name, &entry)?;
        }

        Ok(Seat {
            name: name.clone(),
            entry_point: entry,
        })
    }
}

// =============================================================================
// Playing
// =============================================================================

#[derive(Debug, Deserialize)]
struct Verdict {
    winner: Option<Color>,
    termination: String,
    #[serde(default)]
    transcript: serde_json::Value,
}

impl Verdict {
    /// Any termination the runner does not treat specially is a played-out result
    fn termination(&self) -> Termination {
        match self.termination.as_str() {
            "turn_limit" => Termination::TurnLimit,
            "timeout" => Termination::Timeout,
            _ => Termination::Decisive,
        }
    }
}

/// Plays games by running the referee program as a child process
#[derive(Debug, Clone)]
pub struct ExternalReferee {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalReferee {
    pub fn new(config: &RefereeConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn command(&self, white: &Seat, black: &Seat, limits: &MatchLimits) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--white")
            .arg(white.entry_point.as_arg())
            .arg("--black")
            .arg(black.entry_point.as_arg())
            .arg("--seconds-per-player")
            .arg(limits.seconds_per_player.to_string())
            .arg("--turn-limit")
            .arg(limits.turn_limit.to_string());
        cmd
    }
}

impl Simulator<Seat> for ExternalReferee {
    fn simulate(&self, white: Seat, black: Seat, limits: &MatchLimits) -> Result<GameReport, Fault> {
        debug!(white = %white.name, black = %black.name, "starting referee");
        let output = self
            .command(&white, &black, limits)
            .output()
            .map_err(|e| Fault::new(format!("could not start referee {}: {e}", self.program.display())))?;
        parse_verdict(&output)
    }
}

fn parse_verdict(output: &Output) -> Result<GameReport, Fault> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(%stdout, %stderr, "referee finished");

    if !output.status.success() {
        return Err(Fault::new(format!(
            "referee exited with {}\n{}\n{}",
            output.status,
            stderr.trim_end(),
            stdout.trim_end()
        )));
    }

    let verdict: Verdict = serde_json::from_str(stdout.trim())
        .map_err(|e| Fault::new(format!("unreadable referee verdict: {e}\n{stdout}")))?;
    Ok(GameReport {
        termination: verdict.termination(),
        winner: verdict.winner,
        transcript: verdict.transcript,
    })
}

#[cfg(test)]
#[path = "referee_tests.rs"]
mod referee_tests;
