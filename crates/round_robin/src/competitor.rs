//! Competitor registry
//!
//! Resolves a submissions directory plus a list of built-in bot references
//! into typed competitor descriptors. Descriptors are created once and never
//! change for the rest of the run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::error::{Result, TournamentError};

/// Identifier of a competitor, stable within one tournament run
pub type CompetitorId = usize;

/// Where a competitor's code comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum EntryPoint {
    /// A source file inside the submissions directory
    File(PathBuf),
    /// A dotted reference to a bot shipped with the referee
    Builtin(String),
}

impl EntryPoint {
    /// Argument form handed to the referee
    pub fn as_arg(&self) -> String {
        match self {
            EntryPoint::File(path) => path.display().to_string(),
            EntryPoint::Builtin(reference) => reference.clone(),
        }
    }
}

/// One participant of the tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: CompetitorId,
    pub name: String,
    pub entry_point: Option<EntryPoint>,
    /// Directory or file this competitor was discovered from
    pub source: Option<PathBuf>,
    pub is_builtin: bool,
}

impl Competitor {
    /// A competitor is valid iff an entry point was resolved
    pub fn is_valid(&self) -> bool {
        self.entry_point.is_some()
    }

    /// Case-insensitive identity used by the outcome log
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl fmt::Display for Competitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// All competitors of one run, indexed by id
#[derive(Debug, Clone, Default)]
pub struct Registry {
    competitors: Vec<Competitor>,
}

impl Registry {
    /// Discover submissions in `dir` (sorted by file name), then append the
    /// configured built-ins.
    pub fn discover(dir: &Path, config: &RegistryConfig) -> Result<Self> {
        let read_err = |source| TournamentError::Registry {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(read_err)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()
            .map_err(read_err)?;
        entries.sort();

        let mut registry = Registry::default();
        for path in entries {
            if is_hidden(&path) {
                continue;
            }
            if path.is_file() && !has_extension(&path, &config.entry_extension) {
                debug!(path = %path.display(), "skipping non-submission file");
                continue;
            }
            registry.add_submission(&path, &config.entry_extension);
        }
        for reference in &config.builtins {
            registry.add_builtin(reference);
        }
        Ok(registry)
    }

    /// Build a registry from explicit competitors (ids are reassigned in order)
    pub fn from_competitors(competitors: impl IntoIterator<Item = Competitor>) -> Self {
        let mut registry = Registry::default();
        for competitor in competitors {
            registry.push(competitor);
        }
        registry
    }

    /// Add a directory or file submission
    pub fn add_submission(&mut self, path: &Path, extension: &str) -> CompetitorId {
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (raw_name, entry_point) = if path.is_file() {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = stem.split('_').next().unwrap_or_default().to_string();
            (name, Some(EntryPoint::File(path.to_path_buf())))
        } else {
            let name = base.split('_').next().unwrap_or_default().to_string();
            (name, find_entry_file(path, extension).map(EntryPoint::File))
        };

        if entry_point.is_none() {
            warn!(path = %path.display(), "no .{} entry point found, submission will not play", extension);
        }

        self.push(Competitor {
            id: 0,
            name: raw_name,
            entry_point,
            source: Some(path.to_path_buf()),
            is_builtin: false,
        })
    }

    /// Add a bot shipped with the referee, e.g. `reconchess.bots.trout_bot`
    pub fn add_builtin(&mut self, reference: &str) -> CompetitorId {
        let name = reference
            .split('.')
            .nth(2)
            .or_else(|| reference.rsplit('.').next())
            .unwrap_or(reference)
            .replace('_', " ");
        self.push(Competitor {
            id: 0,
            name,
            entry_point: Some(EntryPoint::Builtin(reference.to_string())),
            source: None,
            is_builtin: true,
        })
    }

    fn push(&mut self, mut competitor: Competitor) -> CompetitorId {
        let id = self.competitors.len();
        competitor.id = id;
        competitor.name = self.unique_name(&sanitize_name(&competitor.name));
        debug!(id, name = %competitor.name, valid = competitor.is_valid(), "registered competitor");
        self.competitors.push(competitor);
        id
    }

    /// Append a numeric suffix when the name collides case-insensitively
    fn unique_name(&self, name: &str) -> String {
        let taken: HashSet<String> = self.competitors.iter().map(Competitor::key).collect();
        if !taken.contains(&name.to_lowercase()) {
            return name.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{name}{n}");
            if !taken.contains(&candidate.to_lowercase()) {
                warn!(original = name, renamed = %candidate, "duplicate competitor name");
                return candidate;
            }
            n += 1;
        }
    }

    pub fn get(&self, id: CompetitorId) -> Option<&Competitor> {
        self.competitors.get(id)
    }

    /// Case-insensitive lookup by display name
    pub fn find_by_name(&self, name: &str) -> Option<&Competitor> {
        let key = name.to_lowercase();
        self.competitors.iter().find(|c| c.key() == key)
    }

    /// Look up the competitor discovered from `path`
    pub fn find_by_source(&self, path: &Path) -> Option<&Competitor> {
        self.competitors
            .iter()
            .find(|c| c.source.as_deref() == Some(path))
    }

    pub fn ids(&self) -> Vec<CompetitorId> {
        self.competitors.iter().map(|c| c.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Competitor> {
        self.competitors.iter()
    }

    pub fn len(&self) -> usize {
        self.competitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.competitors.is_empty()
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}

/// First file in `dir` (sorted) with the given extension
fn find_entry_file(dir: &Path, extension: &str) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_extension(p, extension))
        .collect();
    files.sort();
    files.into_iter().next()
}

/// Restrict a name to characters that survive the case-marking file names of
/// the outcome log.
pub fn sanitize_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string();
    if !name.chars().any(|c| c.is_ascii_alphabetic()) {
        name = format!("sub{name}");
    }
    if name != raw {
        warn!(original = raw, sanitized = %name, "competitor name adjusted");
    }
    name
}

#[cfg(test)]
#[path = "competitor_tests.rs"]
mod competitor_tests;
