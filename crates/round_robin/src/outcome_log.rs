//! Durable outcome log
//!
//! One file per match in a single directory. The file name alone identifies
//! the pairing and its result:
//!
//! ```text
//! alice_BOB.json         alice (first to move) vs bob, bob won
//! alice_bob.json         draw
//! ALICE_bob-ERROR.json   bob failed to load or crashed, body is the diagnostic
//! ```
//!
//! The body is either the referee's transcript or diagnostic text; a body
//! containing `TIMEOUT` marks a clock-exhausted match. Nothing else is
//! stored, so the directory can be reconciled and re-aggregated after a crash
//! without any index.
//!
//! Letter case is only interpreted by [`RecordName`]; everything else works
//! with its typed fields.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{Result, TournamentError};
use crate::outcome::{MatchOutcome, Reason, Side, TIMEOUT_TOKEN};

const EXTENSION: &str = ".json";
const ERROR_SUFFIX: &str = "-ERROR";

/// Typed form of an outcome file name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordName {
    /// Lower-cased name of the side that moved first
    pub a: String,
    /// Lower-cased name of the other side
    pub b: String,
    pub winner: Option<Side>,
    /// Body is diagnostic text from a load or runtime failure
    pub error: bool,
}

impl RecordName {
    pub fn new(a: &str, b: &str, winner: Option<Side>, error: bool) -> Self {
        Self {
            a: a.to_lowercase(),
            b: b.to_lowercase(),
            winner,
            error,
        }
    }

    /// Name under which `outcome` between `a` and `b` is stored
    pub fn for_outcome(a: &str, b: &str, outcome: &MatchOutcome) -> Self {
        Self::new(a, b, outcome.winner().side(), outcome.reason().is_error())
    }

    pub fn name_of(&self, side: Side) -> &str {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    /// Which side `key` (any case) played, if any
    pub fn side_of(&self, key: &str) -> Option<Side> {
        let key = key.to_lowercase();
        if self.a == key {
            Some(Side::A)
        } else if self.b == key {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn involves(&self, key: &str) -> bool {
        self.side_of(key).is_some()
    }

    /// Name of the opponent of `key`
    pub fn opponent_of(&self, key: &str) -> Option<&str> {
        self.side_of(key).map(|side| self.name_of(side.other()))
    }

    pub fn winner_name(&self) -> Option<&str> {
        self.winner.map(|side| self.name_of(side))
    }

    /// Both participants are the same identity
    pub fn is_self_play(&self) -> bool {
        self.a == self.b
    }

    /// Order-independent pairing identity
    pub fn pair_key(&self) -> (String, String) {
        if self.a <= self.b {
            (self.a.clone(), self.b.clone())
        } else {
            (self.b.clone(), self.a.clone())
        }
    }

    /// Same name with `from` replaced by `to` on whichever side it played
    pub fn renamed(&self, from: &str, to: &str) -> Option<Self> {
        let side = self.side_of(from)?;
        let mut next = self.clone();
        match side {
            Side::A => next.a = to.to_lowercase(),
            Side::B => next.b = to.to_lowercase(),
        }
        Some(next)
    }

    fn segment(&self, side: Side) -> String {
        let name = self.name_of(side);
        if self.winner == Some(side) {
            name.to_uppercase()
        } else {
            name.to_string()
        }
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}{}{}",
            self.segment(Side::A),
            self.segment(Side::B),
            if self.error { ERROR_SUFFIX } else { "" },
            EXTENSION
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Case {
    Upper,
    Lower,
}

fn case_of(segment: &str) -> Option<Case> {
    if segment.is_empty() || !segment.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    if segment == segment.to_uppercase() {
        Some(Case::Upper)
    } else if segment == segment.to_lowercase() {
        Some(Case::Lower)
    } else {
        None
    }
}

impl FromStr for RecordName {
    type Err = TournamentError;

    fn from_str(file_name: &str) -> Result<Self> {
        let bad = || TournamentError::RecordName(file_name.to_string());

        let stem = file_name.strip_suffix(EXTENSION).ok_or_else(bad)?;
        let (stem, error) = match stem.strip_suffix(ERROR_SUFFIX) {
            Some(stem) => (stem, true),
            None => (stem, false),
        };
        let (a, b) = stem.split_once('_').ok_or_else(bad)?;
        if b.contains('_') {
            return Err(bad());
        }

        let winner = match (case_of(a).ok_or_else(bad)?, case_of(b).ok_or_else(bad)?) {
            (Case::Upper, Case::Lower) => Some(Side::A),
            (Case::Lower, Case::Upper) => Some(Side::B),
            (Case::Lower, Case::Lower) => None,
            (Case::Upper, Case::Upper) => return Err(bad()),
        };
        Ok(Self::new(a, b, winner, error))
    }
}

/// One file of the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub path: PathBuf,
    pub name: RecordName,
}

impl OutcomeRecord {
    pub fn file_name(&self) -> String {
        self.name.to_string()
    }

    pub fn body(&self) -> Result<String> {
        let bytes = fs::read(&self.path).map_err(|e| TournamentError::log(&self.path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The body carries the timeout sentinel
    pub fn timed_out(&self) -> Result<bool> {
        Ok(self.body()?.contains(TIMEOUT_TOKEN))
    }

    /// Best reconstruction of the outcome this record was written for.
    ///
    /// The file cannot tell a load error from a runtime error; error records
    /// with a winner come back as `RuntimeError`.
    pub fn recover_outcome(&self) -> Result<MatchOutcome> {
        let body = self.body()?;
        let winner = self.name.winner;
        let outcome = if self.name.error {
            match winner {
                Some(side) => MatchOutcome::runtime_error(side, body),
                None => MatchOutcome::both_failed(),
            }
        } else if body.contains(TIMEOUT_TOKEN) {
            MatchOutcome::timeout(winner, body)
        } else {
            let transcript = serde_json::from_str(&body)
                .unwrap_or_else(|_| serde_json::Value::String(body));
            match winner {
                Some(side) => MatchOutcome::normal_win(side, transcript),
                None => MatchOutcome::turn_limit_draw(transcript),
            }
        };
        Ok(outcome)
    }
}

/// Directory of outcome records
#[derive(Debug, Clone)]
pub struct OutcomeLog {
    dir: PathBuf,
}

impl OutcomeLog {
    /// Open for writing: create the directory and check that files can be
    /// created in it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| TournamentError::log(&dir, e))?;
        tempfile::NamedTempFile::new_in(&dir)
            .map_err(|_| TournamentError::LogNotWritable(dir.clone()))?;
        Ok(Self { dir })
    }

    /// Point at `dir` without touching the filesystem
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open a log that must already exist, for reading and repair
    pub fn existing(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let meta = fs::metadata(&dir).map_err(|e| TournamentError::log(&dir, e))?;
        if !meta.is_dir() {
            return Err(TournamentError::log(
                &dir,
                std::io::Error::other("not a directory"),
            ));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the record for `outcome` between `a` and `b`, replacing any
    /// earlier record of the same unordered pair.
    pub fn record(&self, a: &str, b: &str, outcome: &MatchOutcome) -> Result<PathBuf> {
        let body = match (outcome.game_record(), outcome.error_detail()) {
            (Some(transcript), _) => serde_json::to_string_pretty(transcript)?,
            (None, Some(detail)) => detail.to_string(),
            (None, None) => "BOTH FAILED".to_string(),
        };
        self.write_record(a, b, outcome, &body)
    }

    /// Like [`record`](Self::record) with an explicit diagnostic body, for
    /// outcomes that carry no detail of their own (`BothFailed`).
    pub fn record_diagnostic(
        &self,
        a: &str,
        b: &str,
        outcome: &MatchOutcome,
        diagnostic: &str,
    ) -> Result<PathBuf> {
        match outcome.reason() {
            Reason::NormalWin | Reason::TurnLimitDraw => self.record(a, b, outcome),
            _ => self.write_record(a, b, outcome, diagnostic),
        }
    }

    fn write_record(&self, a: &str, b: &str, outcome: &MatchOutcome, body: &str) -> Result<PathBuf> {
        let name = RecordName::for_outcome(a, b, outcome);
        let path = self.dir.join(name.to_string());

        // Earlier records of the pair only go once the new one is durable
        self.write_atomic(&path, body)?;
        for old in self.scan()? {
            if old.name.pair_key() == name.pair_key() && old.path != path {
                debug!(old = %old.path.display(), "replacing earlier record of the same pairing");
                self.delete(&old)?;
            }
        }

        debug!(path = %path.display(), reason = ?outcome.reason(), "outcome recorded");
        Ok(path)
    }

    fn write_atomic(&self, path: &Path, body: &str) -> Result<()> {
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| TournamentError::log(&self.dir, e))?;
        tmp.write_all(body.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| TournamentError::log(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| TournamentError::log(path, e.error))?;
        Ok(())
    }

    /// Every parseable record, sorted by file name
    pub fn scan(&self) -> Result<Vec<OutcomeRecord>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| TournamentError::log(&self.dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TournamentError::log(&self.dir, e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') || !file_name.ends_with(EXTENSION) {
                continue;
            }
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            match file_name.parse::<RecordName>() {
                Ok(name) => records.push(OutcomeRecord {
                    path: entry.path(),
                    name,
                }),
                Err(_) => warn!(file = %file_name, "ignoring file that is not an outcome record"),
            }
        }
        records.sort_by(|x, y| x.path.cmp(&y.path));
        Ok(records)
    }

    /// Record of the unordered pair `a`/`b`, if any
    pub fn find_pair(&self, a: &str, b: &str) -> Result<Option<OutcomeRecord>> {
        let key = RecordName::new(a, b, None, false).pair_key();
        Ok(self
            .scan()?
            .into_iter()
            .find(|r| r.name.pair_key() == key))
    }

    pub fn delete(&self, record: &OutcomeRecord) -> Result<()> {
        fs::remove_file(&record.path).map_err(|e| TournamentError::log(&record.path, e))
    }

    /// Move `record` to the file name of `name`; refuses to overwrite
    pub fn rename(&self, record: &OutcomeRecord, name: RecordName) -> Result<OutcomeRecord> {
        let path = self.dir.join(name.to_string());
        if path.exists() && path != record.path {
            return Err(TournamentError::log(
                &path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "record already exists"),
            ));
        }
        fs::rename(&record.path, &path).map_err(|e| TournamentError::log(&record.path, e))?;
        Ok(OutcomeRecord { path, name })
    }
}

#[cfg(test)]
#[path = "outcome_log_tests.rs"]
mod outcome_log_tests;
