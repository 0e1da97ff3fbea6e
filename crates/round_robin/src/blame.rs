//! Fault attribution
//!
//! When the referee crashes mid-game the only evidence is diagnostic text.
//! A [`BlameResolver`] decides which competitor caused it.

use crate::competitor::Competitor;
use crate::outcome::Side;

/// Result of attributing a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blame {
    /// This side caused the fault and loses
    Side(Side),
    /// Neither side could be identified
    Unidentified,
    /// Evidence points at both sides and the resolver declines to pick one
    Ambiguous,
}

pub trait BlameResolver: Send + Sync {
    fn resolve(&self, a: &Competitor, b: &Competitor, diagnostic: &str) -> Blame;
}

/// Best-effort attribution by searching the diagnostic for each display name.
///
/// Not sound: a name that is a substring of a path, a library module or the
/// other competitor's name can be matched by accident and blame the wrong
/// side. When both names appear, side `A` (white) is checked first and takes
/// the blame.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameMatchBlame;

impl BlameResolver for NameMatchBlame {
    fn resolve(&self, a: &Competitor, b: &Competitor, diagnostic: &str) -> Blame {
        let hit_a = !a.name.is_empty() && diagnostic.contains(&a.name);
        let hit_b = !b.name.is_empty() && diagnostic.contains(&b.name);
        match (hit_a, hit_b) {
            (true, _) => Blame::Side(Side::A),
            (false, true) => Blame::Side(Side::B),
            (false, false) => Blame::Unidentified,
        }
    }
}

#[cfg(test)]
#[path = "blame_tests.rs"]
mod blame_tests;
