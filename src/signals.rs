//! Deterministic heuristic tags derived from a candidate name and its evidence.
//! Tags are hints for the reasoning service; nothing here decides a verdict.

use crate::models::{EvidenceSnippet, SignalFlag, Signals};
use aho_corasick::AhoCorasick;
use lazy_static::lazy_static;
use regex::Regex;

const INTERNAL_NAMING: &[&str] = &["internal", "private", "conf", "corp", "secure", "intranet"];

const EXTERNAL_SOURCE: &[&str] = &[
    "workspace",
    "git+https",
    "git+ssh",
    "file:",
    "link:",
    "local:",
    "./",
    "../",
];

lazy_static! {
    static ref INTERNAL_NAMING_AC: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(INTERNAL_NAMING)
        .expect("valid internal-naming vocabulary");
    static ref EXTERNAL_SOURCE_AC: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(EXTERNAL_SOURCE)
        .expect("valid external-source vocabulary");
    static ref IMPORT_USAGE_RE: Regex =
        Regex::new(r#"(?i)(\bimport\b|\brequire\b|\bfrom\s+['"]|dependenc)"#)
            .expect("valid import-usage regex");
}

/// Flags that depend on the name alone.
pub fn name_signals(name: &str, home_org: &str) -> Signals {
    let mut flags = Signals::new();
    let lname = name.to_lowercase();

    if lname.starts_with('@') || lname.contains('/') {
        flags.insert(SignalFlag::Namespaced);
    }
    if INTERNAL_NAMING_AC.is_match(&lname) {
        flags.insert(SignalFlag::InternalNaming);
    }
    if is_org_branded(&lname, &home_org.to_lowercase()) {
        flags.insert(SignalFlag::OrgBranded);
    }
    flags
}

/// Flags that depend on the collected evidence text.
pub fn evidence_signals(snippets: &[EvidenceSnippet]) -> Signals {
    let mut flags = Signals::new();
    if snippets.is_empty() {
        flags.insert(SignalFlag::NoEvidence);
        return flags;
    }

    let text = snippets
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if EXTERNAL_SOURCE_AC.is_match(&text) {
        flags.insert(SignalFlag::ExplicitExternalSource);
    }
    if IMPORT_USAGE_RE.is_match(&text) {
        flags.insert(SignalFlag::ImportUsage);
    }
    flags
}

pub fn derive(name: &str, home_org: &str, snippets: &[EvidenceSnippet]) -> Signals {
    let mut flags = name_signals(name, home_org);
    flags.extend(evidence_signals(snippets));
    flags
}

fn is_org_branded(lname: &str, org: &str) -> bool {
    let org = org.trim();
    if org.is_empty() {
        return false;
    }
    let bare = lname.trim_start_matches('@');
    bare.starts_with(org) || bare.ends_with(org) || bare.split('/').any(|seg| seg == org)
}
