//! Evidence gathering for one candidate: search variants, dedup, truncate, cap,
//! then derive signals.

use crate::config::EvidenceConfig;
use crate::models::{EvidenceSnippet, PackageCandidate, ProjectProfile, Signals};
use crate::search::{RawMatch, SearchAdapter};
use crate::signals;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub snippets: Vec<EvidenceSnippet>,
    pub signals: Signals,
    /// The pattern variant that produced the snippets, if any did.
    pub matched_variant: Option<String>,
}

pub struct EvidenceCollector<'a> {
    search: &'a SearchAdapter,
    root: PathBuf,
    home_org: String,
    case_insensitive: bool,
    max_snippets: usize,
    max_line_chars: usize,
}

impl<'a> EvidenceCollector<'a> {
    pub fn new(
        search: &'a SearchAdapter,
        root: &Path,
        home_org: &str,
        case_insensitive: bool,
        config: &EvidenceConfig,
    ) -> Self {
        Self {
            search,
            root: root.to_path_buf(),
            home_org: home_org.to_string(),
            case_insensitive,
            max_snippets: config.max_snippets.max(1),
            max_line_chars: config.max_line_chars.max(1),
        }
    }

    /// Collect evidence for `candidate`. Stops at the first pattern variant that
    /// yields anything.
    pub fn collect(&self, candidate: &PackageCandidate, _profile: &ProjectProfile) -> Evidence {
        let mut evidence = Evidence::default();

        for variant in pattern_variants(&candidate.name) {
            let out = self.search.search(&variant, &self.root, self.case_insensitive);
            if let Some(err) = &out.error {
                tracing::warn!(package = %candidate.name, variant = %variant, "search degraded: {err}");
            }
            if out.skipped_lines > 0 {
                tracing::info!(
                    package = %candidate.name,
                    skipped = out.skipped_lines,
                    "unparseable search output lines ignored"
                );
            }
            let snippets = normalize(out.matches, self.max_snippets, self.max_line_chars);
            if !snippets.is_empty() {
                evidence.snippets = snippets;
                evidence.matched_variant = Some(variant);
                break;
            }
        }

        if evidence.snippets.is_empty() {
            tracing::info!(package = %candidate.name, "no context found; analyzing name only");
        }

        evidence.signals = signals::derive(&candidate.name, &self.home_org, &evidence.snippets);
        evidence
    }
}

/// Literal name first, then separator-normalized spellings (`-` and `_` are
/// interchangeable in several registries). Duplicates are dropped.
pub fn pattern_variants(name: &str) -> Vec<String> {
    let mut variants = vec![name.to_string()];
    for alt in [name.replace('-', "_"), name.replace('_', "-")] {
        if !variants.contains(&alt) {
            variants.push(alt);
        }
    }
    variants
}

/// Dedup by trimmed content (first seen wins), truncate long lines, cap the set.
pub fn normalize(matches: Vec<RawMatch>, max_snippets: usize, max_line_chars: usize) -> Vec<EvidenceSnippet> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for m in matches {
        if out.len() >= max_snippets {
            break;
        }
        let trimmed = m.content.trim();
        if !seen.insert(trimmed.to_string()) {
            continue;
        }
        out.push(EvidenceSnippet {
            file: m.file,
            line: m.line,
            content: truncate_chars(trimmed, max_line_chars),
        });
    }
    out
}

/// Cut to exactly `max_chars` characters and append the marker when longer.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let clipped: String = input.chars().take(max_chars).collect();
    format!("{clipped}{TRUNCATION_MARKER}")
}
