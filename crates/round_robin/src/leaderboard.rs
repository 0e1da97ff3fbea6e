//! Standings rebuilt from the outcome log
//!
//! Everything here is derived from record names alone (plus the `TIMEOUT`
//! check used to pick a canonical record per pair), so standings can be
//! recomputed after a crash without any scheduler or engine state.

use serde::Serialize;
use std::path::Path;

use crate::competitor::Registry;
use crate::config::LeaderboardConfig;
use crate::error::{Result, TournamentError};
use crate::outcome::Side;
use crate::outcome_log::OutcomeRecord;
use crate::reconcile::canonical_records;

/// Tally of one participant, keyed by its lower-cased name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub name: String,
    pub points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
}

impl Standing {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            points: 0,
            wins: 0,
            draws: 0,
            losses: 0,
        }
    }
}

/// Every participant seen in the log, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Standings {
    entries: Vec<Standing>,
}

impl Standings {
    fn entry(&mut self, name: &str) -> &mut Standing {
        let index = match self.entries.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.entries.push(Standing::new(name));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    pub fn get(&self, name: &str) -> Option<&Standing> {
        let key = name.to_lowercase();
        self.entries.iter().find(|s| s.name == key)
    }

    pub fn points(&self, name: &str) -> Option<u32> {
        self.get(name).map(|s| s.points)
    }

    /// Sorted by points, ties kept in first-seen order
    pub fn ranked(&self) -> Vec<&Standing> {
        let mut ranked: Vec<&Standing> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.points.cmp(&a.points));
        ranked
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fold records into standings.
///
/// Only the canonical record of each pair counts. Error records credit
/// nobody unless `count_error_wins` is set, but their participants are still
/// listed.
pub fn aggregate(records: &[OutcomeRecord], policy: &LeaderboardConfig) -> Result<Standings> {
    let mut standings = Standings::default();
    for record in records {
        standings.entry(&record.name.a);
        standings.entry(&record.name.b);
    }

    for record in canonical_records(records.to_vec())? {
        if record.name.error && !policy.count_error_wins {
            continue;
        }
        match record.name.winner {
            Some(side) => {
                let winner = standings.entry(record.name.name_of(side));
                winner.points += policy.win_points;
                winner.wins += 1;
                standings.entry(record.name.name_of(side.other())).losses += 1;
            }
            None if record.name.error => {}
            None => {
                for side in [Side::A, Side::B] {
                    let entry = standings.entry(record.name.name_of(side));
                    entry.points += policy.draw_points;
                    entry.draws += 1;
                }
            }
        }
    }

    Ok(standings)
}

// =============================================================================
// Leaderboard table
// =============================================================================

/// One exported row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    #[serde(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Surname")]
    pub surname: String,
    #[serde(rename = "Points")]
    pub points: u32,
    #[serde(skip)]
    pub tally: (u32, u32, u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaderboard {
    rows: Vec<LeaderboardRow>,
}

impl Leaderboard {
    /// Rank `standings`, showing registry display names where known
    pub fn new(standings: &Standings, registry: Option<&Registry>) -> Self {
        let rows = standings
            .ranked()
            .into_iter()
            .enumerate()
            .map(|(i, standing)| {
                let display = registry
                    .and_then(|r| r.find_by_name(&standing.name))
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| standing.name.clone());
                let (name, surname) = match display.split_once(' ') {
                    Some((name, rest)) => (name.to_string(), rest.trim().to_string()),
                    None => (display, String::new()),
                };
                LeaderboardRow {
                    rank: i + 1,
                    name,
                    surname,
                    points: standing.points,
                    tally: (standing.wins, standing.draws, standing.losses),
                }
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[LeaderboardRow] {
        &self.rows
    }

    /// Generate the text table
    pub fn render(&self) -> String {
        let mut table = String::new();
        table.push_str(&"-".repeat(60));
        table.push_str("\nFinal Leaderboard\n");
        table.push_str(&"-".repeat(60));
        table.push('\n');
        table.push_str(&format!(
            "{:>3} {:<15} {:<15} {:>6} {:>4} {:>4} {:>4}\n\n",
            "#", "Name", "Surname", "Points", "W", "D", "L"
        ));
        for row in &self.rows {
            let (wins, draws, losses) = row.tally;
            table.push_str(&format!(
                "{:>3} {:<15} {:<15} {:>6} {:>4} {:>4} {:>4}\n",
                row.rank, row.name, row.surname, row.points, wins, draws, losses
            ));
        }
        table
    }

    /// Print the table to stdout
    pub fn print(&self) {
        println!();
        println!("{}", self.render());
    }

    /// Export as `Rank,Name,Surname,Points`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let export = |source| TournamentError::Export {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(export)?;
        if self.rows.is_empty() {
            writer
                .write_record(["Rank", "Name", "Surname", "Points"])
                .map_err(export)?;
        }
        for row in &self.rows {
            writer.serialize(row).map_err(export)?;
        }
        writer
            .flush()
            .map_err(|e| TournamentError::log(path, e))
    }
}

#[cfg(test)]
#[path = "leaderboard_tests.rs"]
mod leaderboard_tests;
