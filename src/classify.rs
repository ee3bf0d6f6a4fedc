//! Case file construction, remote classification and verdict validation.

use crate::error::CallError;
use crate::evidence::Evidence;
use crate::models::{
    Classification, ClassificationResult, Confidence, PackageCandidate, ProjectProfile, Signals,
    Status, NO_EVIDENCE,
};
use crate::remote::{self, ChatMessage, ChatRequest, ReasoningService};
use crate::retry::RetryPolicy;
use serde::Deserialize;

pub const CASE_TRUNCATION_MARKER: &str = "\n...[truncated due to length]";

const NO_CONTEXT: &str =
    "No source code context was found. Analyze based on the package name and type alone.";

const SYSTEM_PROMPT: &str = r#"You are a principal application security analyst triaging dependency confusion findings.

Every package in a case is confirmed to be unregistered on its public registry. Decide whether the
reference is a Potential Vulnerability (an install step could resolve the name from the public
registry, where an attacker may publish it) or a False Positive (test fixture, example, comment,
vendored or workspace/local/git source, or otherwise never resolved from the public registry).
Use Needs Review only when the evidence is genuinely inconclusive.

Weigh: how brand-specific or internal the name looks; ecosystem conventions (npm scopes, PyPI name
normalization, Go module paths); source markers such as workspace:, file:, link:, git+https:// or
relative paths; private registry configuration in the project; and whether the name is actually
declared or imported as a dependency rather than merely mentioned.

The observed signals are deterministic hints, not conclusions.

Respond with a single JSON object:
{
  "package_name": "string",
  "classification": "Potential Vulnerability" | "False Positive" | "Needs Review",
  "confidence": "High" | "Medium" | "Low",
  "justification": "1-2 concise sentences",
  "highest_risk_context": "the single most important evidence line, or 'N/A'",
  "risk_signals": ["short indicators you relied on"]
}"#;

/// Verdict schema expected inside the completion message.
#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    classification: Option<String>,
    confidence: String,
    justification: String,
    #[serde(default)]
    highest_risk_context: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedVerdict {
    pub classification: Classification,
    pub confidence: Confidence,
    pub justification: String,
    pub highest_risk_context: String,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Parse and validate the message content. One fallback: when the content is
/// not JSON as a whole, the span between the first `{` and the last `}` is tried.
pub fn parse_verdict(content: &str) -> Result<ValidatedVerdict, CallError> {
    let verdict: Verdict = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(first) => {
            let embedded = embedded_object(content)
                .ok_or_else(|| CallError::Malformed(format!("verdict is not JSON: {first}")))?;
            tracing::debug!("verdict extracted from surrounding text");
            serde_json::from_str(embedded)
                .map_err(|e| CallError::Malformed(format!("embedded verdict is not valid: {e}")))?
        }
    };
    validate(verdict)
}

fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// `risk` and `risk_level` stand in for a missing `classification`; when both are
/// present they stay in `extra`.
fn verdict_label(verdict: &Verdict) -> Result<String, CallError> {
    if let Some(label) = &verdict.classification {
        return Ok(label.clone());
    }
    ["risk", "risk_level"]
        .iter()
        .find_map(|key| verdict.extra.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .ok_or_else(|| CallError::Malformed("missing field `classification`".to_string()))
}

fn validate(verdict: Verdict) -> Result<ValidatedVerdict, CallError> {
    let label = verdict_label(&verdict)?;
    let classification = Classification::from_remote_label(&label)
        .ok_or_else(|| CallError::Malformed(format!("unknown classification '{label}'")))?;
    let justification = verdict.justification.trim().to_string();
    if justification.is_empty() {
        return Err(CallError::Malformed("empty justification".to_string()));
    }
    let confidence = Confidence::from_remote_label(&verdict.confidence).unwrap_or_else(|| {
        tracing::debug!(raw = %verdict.confidence, "unrecognized confidence label");
        Confidence::Unknown
    });
    let highest_risk_context = verdict
        .highest_risk_context
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_EVIDENCE.to_string());

    Ok(ValidatedVerdict {
        classification,
        confidence,
        justification,
        highest_risk_context,
        extra: verdict.extra,
    })
}

pub struct ClassifierSettings {
    pub model: String,
    pub temperature: f32,
    pub max_case_file_chars: usize,
    pub home_org: String,
}

pub struct ClassificationClient<S> {
    service: S,
    policy: RetryPolicy,
    settings: ClassifierSettings,
}

impl<S: ReasoningService> ClassificationClient<S> {
    pub fn new(service: S, policy: RetryPolicy, settings: ClassifierSettings) -> Self {
        Self {
            service,
            policy,
            settings,
        }
    }

    #[cfg(test)]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Serialize the case: identity, ecosystem, profile, signals and evidence.
    /// Cut to the configured bound with an explicit marker when too long.
    pub fn build_case_file(
        &self,
        candidate: &PackageCandidate,
        profile: &ProjectProfile,
        evidence: &Evidence,
    ) -> String {
        let signals: Vec<&str> = evidence.signals.iter().map(|s| s.as_str()).collect();
        let profile_json =
            serde_json::to_string_pretty(profile).unwrap_or_else(|_| "{}".to_string());
        let evidence_text = if evidence.snippets.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            serde_json::to_string_pretty(&evidence.snippets).unwrap_or_else(|_| "[]".to_string())
        };

        let case = format!(
            "Organization: {org}\n\
             Package name: {name}\n\
             Package type: {ecosystem}\n\
             Observed signals: {signals:?}\n\n\
             Project profile:\n{profile_json}\n\n\
             Source evidence:\n{evidence_text}\n\n\
             Use all information above to classify this package in the JSON format described.",
            org = self.settings.home_org,
            name = candidate.name,
            ecosystem = candidate.ecosystem,
        );
        bound_case_file(case, self.settings.max_case_file_chars)
    }

    /// Build the case file and submit it. The case file is returned alongside
    /// the result for audit.
    pub fn classify(
        &self,
        candidate: &PackageCandidate,
        profile: &ProjectProfile,
        evidence: &Evidence,
    ) -> (ClassificationResult, String) {
        let case_file = self.build_case_file(candidate, profile, evidence);
        let result = self.submit(candidate, &case_file, &evidence.signals);
        (result, case_file)
    }

    /// Send a prepared case file. Always yields a result: a verdict, or the
    /// Failed sentinel once retries are exhausted or a permanent error occurs.
    pub fn submit(&self, candidate: &PackageCandidate, case_file: &str, signals: &Signals) -> ClassificationResult {
        let request = ChatRequest::json_object(
            &self.settings.model,
            vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(case_file)],
            self.settings.temperature,
        );

        let outcome = self.policy.run(CallError::is_retryable, |attempt| {
            tracing::debug!(package = %candidate.name, attempt, "classification request");
            let body = self.service.complete(&request)?;
            let content = remote::message_content(&body)?;
            parse_verdict(&content)
        });

        match outcome {
            Ok(verdict) => ClassificationResult {
                candidate: candidate.clone(),
                classification: verdict.classification,
                confidence: verdict.confidence,
                justification: verdict.justification,
                highest_risk_evidence: verdict.highest_risk_context,
                signals: signals.clone(),
                status: Status::Completed,
                extra: verdict.extra,
            },
            Err(err) => {
                tracing::error!(package = %candidate.name, "analysis failed: {err}");
                ClassificationResult::failed(candidate.clone(), signals.clone())
            }
        }
    }
}

fn bound_case_file(case: String, max_chars: usize) -> String {
    if case.chars().count() <= max_chars {
        return case;
    }
    let mut cut: String = case.chars().take(max_chars).collect();
    cut.push_str(CASE_TRUNCATION_MARKER);
    cut
}
