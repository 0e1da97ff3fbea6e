//! Round-robin tournament runner for untrusted competitors
//!
//! This crate provides infrastructure for:
//! - Discovering competitors from a submissions directory plus built-in bots
//! - Scheduling a balanced all-play-all tournament (circle method)
//! - Running every match in its own worker process so a crashing or hanging
//!   competitor cannot take the tournament down
//! - Persisting one self-describing file per match and rebuilding standings,
//!   repairing duplicates and resolving timeouts from those files alone
//!
//! # Usage
//!
//! ```bash
//! # Play every submission against every other one
//! cargo run -p round_robin -- run ./subs --replay-dir ./replays
//!
//! # Replay only the matches that timed out last time
//! cargo run -p round_robin -- run ./subs --rerun-timeouts ./replays
//!
//! # Repair aliased identities, then rebuild the leaderboard from disk
//! cargo run -p round_robin -- reconcile ./replays --alias Phuti=Lesego
//! cargo run -p round_robin -- leaderboard ./replays
//!
//! # Point every submission at the local engine binary before playing
//! cargo run -p round_robin -- patch-engine-path ./subs --engine-path /usr/bin/stockfish
//! ```

mod blame;
mod competitor;
mod config;
mod engine;
mod engine_path;
mod error;
mod executor;
mod leaderboard;
mod match_runner;
mod outcome;
mod outcome_log;
mod reconcile;
mod referee;
mod schedule;

pub use blame::*;
pub use competitor::*;
pub use config::*;
pub use engine::*;
pub use engine_path::*;
pub use error::*;
pub use executor::*;
pub use leaderboard::*;
pub use match_runner::*;
pub use outcome::*;
pub use outcome_log::*;
pub use reconcile::*;
pub use referee::*;
pub use schedule::*;
