//! Offline repair of the outcome log
//!
//! A competitor that submitted twice under different names plays the field
//! twice. Given `(preferred, alias)` identity pairs, reconciliation merges the
//! alias identity into the preferred one:
//!
//! 1. Timeout resolution: where the preferred and the alias identity both
//!    played the same opponent and exactly one of those games timed out, the
//!    timed-out game is dropped. If it was the preferred identity's game, the
//!    alias game takes its place under the preferred name.
//! 2. Deduplication: every remaining alias record is deleted, games between
//!    the two identities are deleted, and any pair with more than one record
//!    is collapsed to its canonical record.
//!
//! Both passes only look at the log directory and can be re-run at will.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::competitor::Registry;
use crate::config::AliasPair;
use crate::error::Result;
use crate::outcome_log::{OutcomeLog, OutcomeRecord};
use crate::schedule::Pairing;

/// Files touched by a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: Vec<String>,
    /// (old file name, new file name)
    pub renamed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.renamed.is_empty()
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.deleted.extend(other.deleted);
        self.renamed.extend(other.renamed);
    }
}

/// Timeout resolution followed by deduplication
pub fn reconcile(log: &OutcomeLog, aliases: &[AliasPair]) -> Result<ReconcileReport> {
    let mut report = resolve_timeouts(log, aliases)?;
    report.merge(deduplicate(log, aliases)?);
    info!(
        deleted = report.deleted.len(),
        renamed = report.renamed.len(),
        "reconciliation finished"
    );
    Ok(report)
}

fn distinct(alias: &AliasPair) -> Option<(String, String)> {
    let preferred = alias.preferred.to_lowercase();
    let other = alias.alias.to_lowercase();
    if preferred == other {
        None
    } else {
        Some((preferred, other))
    }
}

// =============================================================================
// Timeout resolution
// =============================================================================

/// Drop the timed-out game of every (preferred, alias) pair that shares an
/// opponent, keeping the other game under the preferred name.
pub fn resolve_timeouts(log: &OutcomeLog, aliases: &[AliasPair]) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for pair in aliases {
        let Some((preferred, alias)) = distinct(pair) else {
            continue;
        };
        let records = log.scan()?;
        let mut gone: HashSet<PathBuf> = HashSet::new();

        let mine: Vec<&OutcomeRecord> = records.iter().filter(|r| r.name.involves(&preferred)).collect();
        let theirs: Vec<&OutcomeRecord> = records
            .iter()
            .filter(|r| r.name.involves(&alias) && !r.name.involves(&preferred))
            .collect();

        for kept in mine {
            let Some(opponent) = kept.name.opponent_of(&preferred) else {
                continue;
            };
            if opponent == alias || opponent == preferred {
                debug!(file = %kept.file_name(), "game between the two identities");
                log.delete(kept)?;
                report.deleted.push(kept.file_name());
                gone.insert(kept.path.clone());
                continue;
            }

            for other in &theirs {
                if gone.contains(&other.path) || other.name.opponent_of(&alias) != Some(opponent) {
                    continue;
                }
                let (kept_timeout, other_timeout) = (kept.timed_out()?, other.timed_out()?);
                if kept_timeout == other_timeout {
                    continue;
                }

                if kept_timeout {
                    info!(file = %kept.file_name(), "timed out, replaced by the alias game");
                    log.delete(kept)?;
                    report.deleted.push(kept.file_name());
                    gone.insert(kept.path.clone());

                    let Some(target) = other.name.renamed(&alias, &preferred) else {
                        break;
                    };
                    match log.rename(other, target) {
                        Ok(moved) => {
                            report.renamed.push((other.file_name(), moved.file_name()));
                            gone.insert(other.path.clone());
                        }
                        Err(e) => warn!(file = %other.file_name(), error = %e, "could not take over record"),
                    }
                    break;
                }

                info!(file = %other.file_name(), "alias game timed out");
                log.delete(other)?;
                report.deleted.push(other.file_name());
                gone.insert(other.path.clone());
            }
        }
    }

    Ok(report)
}

// =============================================================================
// Deduplication
// =============================================================================

/// Delete alias and self-play records, then keep one record per pair
pub fn deduplicate(log: &OutcomeLog, aliases: &[AliasPair]) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for pair in aliases {
        let Some((_, alias)) = distinct(pair) else {
            continue;
        };
        for record in log.scan()? {
            if record.name.involves(&alias) {
                debug!(file = %record.file_name(), "alias record");
                log.delete(&record)?;
                report.deleted.push(record.file_name());
            }
        }
    }

    let mut records = Vec::new();
    for record in log.scan()? {
        if record.name.is_self_play() {
            debug!(file = %record.file_name(), "self-play record");
            log.delete(&record)?;
            report.deleted.push(record.file_name());
        } else {
            records.push(record);
        }
    }

    let kept: HashSet<PathBuf> = canonical_records(records.clone())?
        .into_iter()
        .map(|r| r.path)
        .collect();
    for record in records {
        if !kept.contains(&record.path) {
            debug!(file = %record.file_name(), "duplicate pair record");
            log.delete(&record)?;
            report.deleted.push(record.file_name());
        }
    }

    Ok(report)
}

/// One record per unordered pair: a played game beats an error record, a
/// finished game beats a timed-out one, then the smaller file name wins.
///
/// Output is sorted by file name.
pub fn canonical_records(records: Vec<OutcomeRecord>) -> Result<Vec<OutcomeRecord>> {
    let mut best: BTreeMap<(String, String), ((bool, bool, String), OutcomeRecord)> = BTreeMap::new();

    for record in records {
        let rank = (record.name.error, record.timed_out()?, record.file_name());
        let key = record.name.pair_key();
        match best.get(&key) {
            Some((current, _)) if *current <= rank => {}
            _ => {
                best.insert(key, (rank, record));
            }
        }
    }

    let mut kept: Vec<OutcomeRecord> = best.into_values().map(|(_, r)| r).collect();
    kept.sort_by_key(OutcomeRecord::file_name);
    Ok(kept)
}

// =============================================================================
// Reruns
// =============================================================================

/// Pairings whose recorded game timed out, in their recorded move order
pub fn timeout_rerun_pairings(log: &OutcomeLog, registry: &Registry) -> Result<Vec<Pairing>> {
    let mut pairings = Vec::new();
    for record in log.scan()? {
        if !record.timed_out()? {
            continue;
        }
        let a = registry.find_by_name(&record.name.a);
        let b = registry.find_by_name(&record.name.b);
        match (a, b) {
            (Some(a), Some(b)) if a.is_valid() && b.is_valid() => {
                pairings.push(Pairing::new(a.id, b.id));
            }
            _ => warn!(file = %record.file_name(), "timed-out record names an unknown competitor, skipping"),
        }
    }
    info!(count = pairings.len(), "timed-out matches to rerun");
    Ok(pairings)
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod reconcile_tests;
