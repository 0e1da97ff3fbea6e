//! Submission preparation: point every submission at the local engine
//!
//! Submissions hard-code wherever their author kept Stockfish. Before a
//! tournament every source file under the submissions directory is rewritten
//! line by line so that all of them launch the same configured binary:
//!
//! - `popen_uci(...)` becomes `popen_uci("<engine>", setpgrp=True)`
//! - a quoted string ending in `/opt/stockfish/stockfish` becomes `'<engine>'`
//! - `stockfish_path ... = ...` and `STOCKFISH_PATH ... = ...` become a plain
//!   assignment of `"<engine>"`
//!
//! Each rule matches greedily within one line, like a `.*` pattern would.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, TournamentError};

const OPT_STOCKFISH: &str = "/opt/stockfish/stockfish";

/// What a patch run touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub lines_changed: usize,
}

/// Rewrite engine paths in every `*.{extension}` file below `dir`.
///
/// Hidden files and directories are skipped. Files that are not valid UTF-8
/// are left alone with a warning.
pub fn patch_engine_paths(dir: &Path, engine: &str, extension: &str) -> Result<PatchReport> {
    let mut files = Vec::new();
    collect_sources(dir, extension, &mut files)?;
    files.sort();

    let mut report = PatchReport {
        files_scanned: files.len(),
        ..PatchReport::default()
    };
    for path in files {
        let io_err = |source| TournamentError::Submission {
            path: path.clone(),
            source,
        };
        let original = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(path = %path.display(), "not UTF-8, skipping");
                continue;
            }
            Err(e) => return Err(io_err(e)),
        };

        let (patched, changed) = rewrite_source(&original, engine);
        if changed > 0 {
            fs::write(&path, patched).map_err(io_err)?;
            debug!(path = %path.display(), lines = changed, "patched");
            report.files_changed += 1;
            report.lines_changed += changed;
        }
    }

    info!(
        files = report.files_scanned,
        lines = report.lines_changed,
        "engine paths patched"
    );
    Ok(report)
}

/// Rewrite a whole source text, returning it with the number of changed lines
pub fn rewrite_source(text: &str, engine: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut changed = 0;
    for chunk in text.split_inclusive('\n') {
        let (line, newline) = match chunk.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (chunk, ""),
        };
        let patched = rewrite_line(line, engine);
        if patched != line {
            changed += 1;
        }
        out.push_str(&patched);
        out.push_str(newline);
    }
    (out, changed)
}

/// Apply every rule, in order, to one line (without its newline)
pub fn rewrite_line(line: &str, engine: &str) -> String {
    let line = replace_popen(line, engine);
    let line = replace_quoted(&line, '\'', engine);
    let line = replace_quoted(&line, '"', engine);
    let line = replace_assignment(&line, "stockfish_path", engine);
    replace_assignment(&line, "STOCKFISH_PATH", engine)
}

fn replace_popen(line: &str, engine: &str) -> String {
    const CALL: &str = "popen_uci(";
    let Some(start) = line.find(CALL) else {
        return line.to_string();
    };
    match line.rfind(')') {
        Some(close) if close >= start + CALL.len() => format!(
            "{}popen_uci(\"{engine}\", setpgrp=True){}",
            &line[..start],
            &line[close + 1..]
        ),
        _ => line.to_string(),
    }
}

/// From the first `quote` up to the last `/opt/stockfish/stockfish<quote>`
fn replace_quoted(line: &str, quote: char, engine: &str) -> String {
    let needle = format!("{OPT_STOCKFISH}{quote}");
    let Some(last) = line.rfind(&needle) else {
        return line.to_string();
    };
    match line.find(quote) {
        Some(open) if open < last => format!(
            "{}'{engine}'{}",
            &line[..open],
            &line[last + needle.len()..]
        ),
        _ => line.to_string(),
    }
}

/// From `key` to the end of the line, if an `=` follows it
fn replace_assignment(line: &str, key: &str, engine: &str) -> String {
    match line.find(key) {
        Some(start) if line[start + key.len()..].contains('=') => {
            format!("{}{key}=\"{engine}\"", &line[..start])
        }
        _ => line.to_string(),
    }
}

fn collect_sources(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    let read_err = |source| TournamentError::Registry {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_sources(&path, extension, files)?;
        } else if path.extension().is_some_and(|e| e == extension) {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "engine_path_tests.rs"]
mod engine_path_tests;
