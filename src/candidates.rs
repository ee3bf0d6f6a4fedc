//! Candidate list loading: one file per ecosystem, one name per line.

use crate::error::ConfigError;
use crate::models::PackageCandidate;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ANSI_RE: Regex = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ansi regex");
}

pub fn strip_ansi(input: &str) -> String {
    ANSI_RE.replace_all(input, "").into_owned()
}

/// Ecosystem from a list file name: drop the list suffix (or any extension),
/// then keep the last `-`-separated segment. `acme-npm.potential` → `npm`.
pub fn ecosystem_from_file_name(file_name: &str, suffix: &str) -> String {
    let stem = match file_name.strip_suffix(suffix) {
        Some(s) if !suffix.is_empty() => s,
        _ => Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name),
    };
    let eco = stem.rsplit('-').next().unwrap_or("").trim();
    if eco.is_empty() {
        "unknown".to_string()
    } else {
        eco.to_string()
    }
}

pub fn parse_list(content: &str, ecosystem: &str) -> Vec<PackageCandidate> {
    content
        .lines()
        .map(|line| strip_ansi(line.trim()).trim().to_string())
        .filter(|name| !name.is_empty())
        .map(|name| PackageCandidate::new(name, ecosystem))
        .collect()
}

/// List files in `dir` in name order. Hidden files and subdirectories are ignored.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|_| ConfigError::MissingInput(dir.to_path_buf()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path())
        .collect();
    files.sort();
    Ok(files)
}

/// Load every candidate in input order. An unreadable list is skipped with a warning.
pub fn load(dir: &Path, suffix: &str) -> Result<Vec<PackageCandidate>, ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::MissingInput(dir.to_path_buf()));
    }
    let mut candidates = Vec::new();
    for path in list_files(dir)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let ecosystem = ecosystem_from_file_name(&file_name, suffix);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let names = parse_list(&content, &ecosystem);
                tracing::info!(file = %file_name, ecosystem = %ecosystem, count = names.len(), "loaded candidate list");
                candidates.extend(names);
            }
            Err(e) => tracing::warn!(file = %path.display(), "failed to read candidate list: {e}"),
        }
    }
    Ok(candidates)
}
