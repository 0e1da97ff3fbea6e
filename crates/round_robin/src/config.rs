//! Tournament configuration
//!
//! Loaded from an optional TOML file. Every field has a default, so a missing
//! file behaves exactly like an empty one and CLI flags can override the rest.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TournamentError};

/// Full configuration, one struct per TOML section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TournamentConfig {
    pub tournament: RunConfig,
    pub registry: RegistryConfig,
    pub referee: RefereeConfig,
    pub log: LogConfig,
    pub leaderboard: LeaderboardConfig,
    /// Identity pairs for reconciliation, preferred name first
    pub aliases: Vec<AliasPair>,
}

/// Execution limits for a tournament run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum number of matches running at once
    pub concurrency: usize,
    /// Clock budget given to each side by the referee
    pub seconds_per_player: u64,
    /// Full turns before the referee declares a draw
    pub turn_limit: u32,
    /// Wall-clock ceiling for one worker process (None = derived from the clock budget)
    pub match_deadline_secs: Option<u64>,
    /// How long an interrupted run waits for killed workers to be reaped
    pub interrupt_grace_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            seconds_per_player: 60 * 7,
            turn_limit: 50,
            match_deadline_secs: None,
            interrupt_grace_secs: 5,
        }
    }
}

impl RunConfig {
    /// Limits handed to the match runner
    pub fn limits(&self) -> MatchLimits {
        MatchLimits {
            seconds_per_player: self.seconds_per_player,
            turn_limit: self.turn_limit,
        }
    }

    /// Wall-clock deadline for one match, including both clocks and startup slack
    pub fn match_deadline(&self) -> Duration {
        let secs = self
            .match_deadline_secs
            .unwrap_or_else(|| self.seconds_per_player.saturating_mul(2).saturating_add(60));
        Duration::from_secs(secs)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.interrupt_grace_secs)
    }
}

/// Per-side time budget and turn ceiling, enforced by the referee
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchLimits {
    pub seconds_per_player: u64,
    pub turn_limit: u32,
}

impl Default for MatchLimits {
    fn default() -> Self {
        RunConfig::default().limits()
    }
}

/// How competitors are discovered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// File extension of a submission's entry point
    pub entry_extension: String,
    /// Dotted references to bots shipped with the referee
    pub builtins: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            entry_extension: "py".to_string(),
            builtins: vec![
                "reconchess.bots.random_bot".to_string(),
                "reconchess.bots.trout_bot".to_string(),
                "reconchess.bots.attacker_bot".to_string(),
            ],
        }
    }
}

/// The external game-simulation collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefereeConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// When set, the loader runs `program probe_args... <entry>` to check an entry point
    pub probe_args: Option<Vec<String>>,
}

impl Default for RefereeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("rc-referee"),
            args: Vec::new(),
            probe_args: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub replay_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            replay_dir: PathBuf::from("replays"),
        }
    }
}

/// Scoring policy used when folding the outcome log into standings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub win_points: u32,
    pub draw_points: u32,
    /// Credit wins decided by a load or runtime error
    pub count_error_wins: bool,
    pub csv_path: PathBuf,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            win_points: 1,
            draw_points: 0,
            count_error_wins: false,
            csv_path: PathBuf::from("leaderboard.csv"),
        }
    }
}

/// Two identities that belong to the same competitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasPair {
    /// Name whose records are kept
    pub preferred: String,
    /// Name whose records are merged away
    pub alias: String,
}

impl AliasPair {
    pub fn new(preferred: &str, alias: &str) -> Self {
        Self {
            preferred: preferred.to_string(),
            alias: alias.to_string(),
        }
    }

    /// Parse the CLI form `Preferred=Alias`
    pub fn parse(spec: &str) -> Option<Self> {
        let (preferred, alias) = spec.split_once('=')?;
        let (preferred, alias) = (preferred.trim(), alias.trim());
        if preferred.is_empty() || alias.is_empty() {
            return None;
        }
        Some(Self::new(preferred, alias))
    }
}

impl TournamentConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            TournamentError::ConfigRead {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_toml(&contents).map_err(|source| TournamentError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load config if the file exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
