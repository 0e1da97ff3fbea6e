//! Match outcomes
//!
//! A [`MatchOutcome`] is the structured decision for one pairing. Its
//! constructors are the only way to build one, which keeps the relationship
//! between winner, reason, transcript and diagnostic consistent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token a diagnostic or transcript carries when a clock ran out
pub const TIMEOUT_TOKEN: &str = "TIMEOUT";

/// Side of a pairing; `A` moves first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Who won a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    A,
    B,
    Draw,
    /// Nobody could be credited (both sides unusable)
    Unknown,
}

impl From<Side> for Winner {
    fn from(side: Side) -> Self {
        match side {
            Side::A => Winner::A,
            Side::B => Winner::B,
        }
    }
}

impl Winner {
    pub fn side(self) -> Option<Side> {
        match self {
            Winner::A => Some(Side::A),
            Winner::B => Some(Side::B),
            Winner::Draw | Winner::Unknown => None,
        }
    }
}

/// Why a match ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    NormalWin,
    TurnLimitDraw,
    LoadError,
    RuntimeError,
    Timeout,
    BothFailed,
}

impl Reason {
    /// Reasons whose record carries diagnostic text and the `-ERROR` suffix
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Reason::LoadError | Reason::RuntimeError | Reason::BothFailed
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Reason::NormalWin => "Normal Win",
            Reason::TurnLimitDraw => "Turn Limit",
            Reason::LoadError => "Load Error",
            Reason::RuntimeError => "Runtime Error",
            Reason::Timeout => "Timeout",
            Reason::BothFailed => "Both Failed",
        };
        f.write_str(label)
    }
}

/// Diagnostic text of a failure inside a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub detail: String,
}

impl Fault {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    pub fn mentions_timeout(&self) -> bool {
        self.detail.contains(TIMEOUT_TOKEN)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// Final result of one pairing
///
/// - `winner == Unknown` only with `reason == BothFailed`
/// - `game_record` is present iff the game was played to a result
///   (`NormalWin`, `TurnLimitDraw`)
/// - `error_detail` is present iff `reason` is `LoadError`, `RuntimeError`
///   or `Timeout`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    winner: Winner,
    reason: Reason,
    game_record: Option<serde_json::Value>,
    error_detail: Option<String>,
}

impl MatchOutcome {
    pub fn normal_win(winner: Side, game_record: serde_json::Value) -> Self {
        Self {
            winner: winner.into(),
            reason: Reason::NormalWin,
            game_record: Some(game_record),
            error_detail: None,
        }
    }

    pub fn turn_limit_draw(game_record: serde_json::Value) -> Self {
        Self {
            winner: Winner::Draw,
            reason: Reason::TurnLimitDraw,
            game_record: Some(game_record),
            error_detail: None,
        }
    }

    /// `winner` is the side that did load
    pub fn load_error(winner: Side, detail: impl Into<String>) -> Self {
        Self {
            winner: winner.into(),
            reason: Reason::LoadError,
            game_record: None,
            error_detail: Some(detail.into()),
        }
    }

    /// `winner` is the side that was not blamed
    pub fn runtime_error(winner: Side, detail: impl Into<String>) -> Self {
        Self {
            winner: winner.into(),
            reason: Reason::RuntimeError,
            game_record: None,
            error_detail: Some(detail.into()),
        }
    }

    /// `winner` is None when neither side could be credited
    pub fn timeout(winner: Option<Side>, detail: impl Into<String>) -> Self {
        Self {
            winner: winner.map_or(Winner::Draw, Winner::from),
            reason: Reason::Timeout,
            game_record: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn both_failed() -> Self {
        Self {
            winner: Winner::Unknown,
            reason: Reason::BothFailed,
            game_record: None,
            error_detail: None,
        }
    }

    pub fn winner(&self) -> Winner {
        self.winner
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn game_record(&self) -> Option<&serde_json::Value> {
        self.game_record.as_ref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Check the field relationships; used on outcomes that crossed a process boundary
    pub fn is_consistent(&self) -> bool {
        let unknown_ok = self.winner != Winner::Unknown || self.reason == Reason::BothFailed;
        let record_ok = self.game_record.is_some()
            == matches!(self.reason, Reason::NormalWin | Reason::TurnLimitDraw);
        let detail_ok = self.error_detail.is_some()
            == matches!(
                self.reason,
                Reason::LoadError | Reason::RuntimeError | Reason::Timeout
            );
        let draw_ok = match self.reason {
            Reason::NormalWin | Reason::LoadError | Reason::RuntimeError => {
                self.winner.side().is_some()
            }
            Reason::TurnLimitDraw => self.winner == Winner::Draw,
            Reason::BothFailed => self.winner == Winner::Unknown,
            Reason::Timeout => self.winner != Winner::Unknown,
        };
        unknown_ok && record_ok && detail_ok && draw_ok
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod outcome_tests;
