//! Core records that flow through the triage pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder written wherever a verdict carries no evidence line.
pub const NO_EVIDENCE: &str = "N/A";

/// Justification recorded for candidates whose remote analysis never produced a verdict.
pub const FAILED_JUSTIFICATION: &str = "remote analysis failed after retries";

/// A package name confirmed unregistered on a public registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCandidate {
    pub name: String,
    pub ecosystem: String,
}

impl PackageCandidate {
    pub fn new(name: impl Into<String>, ecosystem: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ecosystem: ecosystem.into(),
        }
    }
}

/// One located source line referencing a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub file: String,
    pub line: usize,
    pub content: String,
}

/// Deterministic observation about a name or its evidence text. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalFlag {
    Namespaced,
    InternalNaming,
    OrgBranded,
    ExplicitExternalSource,
    ImportUsage,
    NoEvidence,
}

impl SignalFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalFlag::Namespaced => "namespaced",
            SignalFlag::InternalNaming => "internal-naming",
            SignalFlag::OrgBranded => "org-branded",
            SignalFlag::ExplicitExternalSource => "explicit-external-source",
            SignalFlag::ImportUsage => "import-usage",
            SignalFlag::NoEvidence => "no-evidence",
        }
    }
}

impl fmt::Display for SignalFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Signals = BTreeSet<SignalFlag>;

/// Ecosystem and registry hints gathered once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProfile {
    pub ecosystems: BTreeSet<String>,
    pub has_private_registry_config: bool,
    pub likely_internal: bool,
    pub characteristics: BTreeSet<String>,
    /// Relative paths of dependency manifests, capped.
    #[serde(default)]
    pub manifests: Vec<String>,
}

/// Risk buckets in severity order (most severe first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "Potential Vulnerability")]
    PotentialVulnerability,
    #[serde(rename = "Needs Review")]
    NeedsReview,
    #[serde(rename = "False Positive")]
    FalsePositive,
    #[serde(rename = "Analysis Failed")]
    AnalysisFailed,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::PotentialVulnerability,
        Classification::NeedsReview,
        Classification::FalsePositive,
        Classification::AnalysisFailed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Classification::PotentialVulnerability => "Potential Vulnerability",
            Classification::NeedsReview => "Needs Review",
            Classification::FalsePositive => "False Positive",
            Classification::AnalysisFailed => "Analysis Failed",
        }
    }

    /// Map a label returned by the reasoning service. `AnalysisFailed` is never
    /// accepted from the remote side.
    pub fn from_remote_label(raw: &str) -> Option<Self> {
        let norm = raw.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match norm.as_str() {
            "potential vulnerability" | "vulnerable" | "vulnerability" | "confirmed"
            | "likely" | "critical" | "high" => Some(Classification::PotentialVulnerability),
            "needs review" | "uncertain" | "manual review" | "medium" | "unknown" => {
                Some(Classification::NeedsReview)
            }
            "false positive" | "unlikely" | "benign" | "not vulnerable" | "low" | "none" => {
                Some(Classification::FalsePositive)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
    Unknown,
}

impl Confidence {
    pub fn label(self) -> &'static str {
        match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
            Confidence::Unknown => "Unknown",
        }
    }

    pub fn from_remote_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "very high" => Some(Confidence::High),
            "medium" | "moderate" => Some(Confidence::Medium),
            "low" | "very low" => Some(Confidence::Low),
            "unknown" | "n/a" => Some(Confidence::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Completed,
    Failed,
}

/// Terminal outcome for one candidate. Exactly one exists per candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub candidate: PackageCandidate,
    pub classification: Classification,
    pub confidence: Confidence,
    pub justification: String,
    pub highest_risk_evidence: String,
    pub signals: Signals,
    pub status: Status,
    /// Top-level response fields outside the verdict schema, passed through for audit.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClassificationResult {
    pub fn failed(candidate: PackageCandidate, signals: Signals) -> Self {
        Self {
            candidate,
            classification: Classification::AnalysisFailed,
            confidence: Confidence::Unknown,
            justification: FAILED_JUSTIFICATION.to_string(),
            highest_risk_evidence: NO_EVIDENCE.to_string(),
            signals,
            status: Status::Failed,
            extra: serde_json::Map::new(),
        }
    }
}
