//! Balanced round-robin scheduling (circle method)
//!
//! Every unordered pair of competitors meets exactly once. With an odd number
//! of competitors a bye is added, so each round leaves one competitor idle.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::competitor::{CompetitorId, Registry};
use crate::error::{Result, TournamentError};

/// One side of a scheduled pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Competitor(CompetitorId),
    Bye,
}

impl Slot {
    pub fn id(self) -> Option<CompetitorId> {
        match self {
            Slot::Competitor(id) => Some(id),
            Slot::Bye => None,
        }
    }
}

/// A set of pairs in which no competitor appears twice
pub type Round = Vec<(Slot, Slot)>;

/// One scheduled match; `a` moves first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pairing {
    pub a: CompetitorId,
    pub b: CompetitorId,
}

impl Pairing {
    pub fn new(a: CompetitorId, b: CompetitorId) -> Self {
        Self { a, b }
    }

    /// Order-independent identity of the pairing
    pub fn unordered(&self) -> (CompetitorId, CompetitorId) {
        (self.a.min(self.b), self.a.max(self.b))
    }
}

/// Generate `n - 1` rounds of `n / 2` pairs over `ids` (padded with a bye to
/// an even `n`).
///
/// The first pair of every odd round is flipped: it always involves the
/// element pinned at the end of the rotation, which would otherwise always
/// move second.
pub fn schedule(ids: &[CompetitorId]) -> Result<Vec<Round>> {
    let mut seen = HashSet::new();
    for &id in ids {
        if !seen.insert(id) {
            return Err(TournamentError::DuplicateCompetitor(id));
        }
    }

    let mut slots: Vec<Slot> = ids.iter().copied().map(Slot::Competitor).collect();
    if slots.len() % 2 == 1 {
        slots.push(Slot::Bye);
    }

    let n = slots.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    // Rotate indexes rather than the slots themselves
    let mut map: Vec<usize> = (0..n).collect();
    let mid = n / 2;
    let mut rounds = Vec::with_capacity(n - 1);

    for i in 0..n - 1 {
        let first = &map[..mid];
        let second: Vec<usize> = map[mid..].iter().rev().copied().collect();

        let round: Round = (0..mid)
            .map(|j| {
                let t1 = slots[first[j]];
                let t2 = slots[second[j]];
                if j == 0 && i % 2 == 1 {
                    (t2, t1)
                } else {
                    (t1, t2)
                }
            })
            .collect();
        rounds.push(round);

        // Rotate by n/2, keeping the last index pinned
        let mut next = Vec::with_capacity(n);
        next.extend_from_slice(&map[mid..n - 1]);
        next.extend_from_slice(&map[..mid]);
        next.push(map[n - 1]);
        map = next;
    }

    debug!(competitors = ids.len(), rounds = rounds.len(), "schedule generated");
    Ok(rounds)
}

/// Flatten rounds into playable pairings, in round order.
///
/// Byes and pairs involving an invalid competitor are dropped. With a
/// `single` filter only pairings involving the competitor discovered from
/// that path are kept.
pub fn plan_pairings(registry: &Registry, rounds: &[Round], single: Option<&Path>) -> Vec<Pairing> {
    let focus = single.map(|path| registry.find_by_source(path).map(|c| c.id));

    rounds
        .iter()
        .flatten()
        .filter_map(|&(a, b)| Some(Pairing::new(a.id()?, b.id()?)))
        .filter(|p| match focus {
            None => true,
            Some(None) => false,
            Some(Some(id)) => p.a == id || p.b == id,
        })
        .filter(|p| {
            let valid = |id| registry.get(id).is_some_and(|c| c.is_valid());
            valid(p.a) && valid(p.b)
        })
        .collect()
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod schedule_tests;
