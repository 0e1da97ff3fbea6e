//! Error types for the tournament runner
//!
//! Only conditions that must stop the whole tournament are errors. Anything
//! that goes wrong inside a single match is a [`Fault`](crate::Fault) and ends
//! up in a [`MatchOutcome`](crate::MatchOutcome) instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::competitor::CompetitorId;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, TournamentError>;

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read submissions directory {path}: {source}")]
    Registry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to patch submission file {path}: {source}")]
    Submission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("competitor id {0} appears more than once in the schedule input")]
    DuplicateCompetitor(CompetitorId),

    #[error("outcome log I/O failed at {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("outcome log directory {0} is not writable")]
    LogNotWritable(PathBuf),

    #[error("not an outcome record name: {0}")]
    RecordName(String),

    #[error("failed to export leaderboard to {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("worker protocol error: {0}")]
    Worker(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TournamentError {
    pub(crate) fn log(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Log {
            path: path.into(),
            source,
        }
    }
}
