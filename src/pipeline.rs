//! Sequential triage loop: evidence, classification, audit, pacing.

use crate::classify::ClassificationClient;
use crate::evidence::EvidenceCollector;
use crate::models::{Classification, PackageCandidate, ProjectProfile, Status};
use crate::pacer::Pacer;
use crate::remote::ReasoningService;
use crate::report::{AuditSink, ResultAggregator};
use colored::Colorize;

pub struct Pipeline<'a, S> {
    collector: EvidenceCollector<'a>,
    client: ClassificationClient<S>,
    pacer: Pacer,
    profile: &'a ProjectProfile,
    audit: Option<AuditSink>,
}

impl<'a, S: ReasoningService> Pipeline<'a, S> {
    pub fn new(
        collector: EvidenceCollector<'a>,
        client: ClassificationClient<S>,
        pacer: Pacer,
        profile: &'a ProjectProfile,
    ) -> Self {
        Self {
            collector,
            client,
            pacer,
            profile,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Option<AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    #[cfg(test)]
    pub fn client(&self) -> &ClassificationClient<S> {
        &self.client
    }

    /// Resolve every candidate, in order, to exactly one result.
    pub fn run(&self, candidates: &[PackageCandidate]) -> ResultAggregator {
        let mut aggregator = ResultAggregator::new();
        let total = candidates.len();

        for (idx, candidate) in candidates.iter().enumerate() {
            println!(
                "{} Analyzing {} package: {}",
                format!("[{}/{}]", idx + 1, total).dimmed(),
                candidate.ecosystem,
                candidate.name.bold()
            );

            let evidence = self.collector.collect(candidate, self.profile);
            tracing::info!(
                package = %candidate.name,
                snippets = evidence.snippets.len(),
                signals = ?evidence.signals,
                "evidence collected"
            );

            let (result, case_file) = self.client.classify(candidate, self.profile, &evidence);

            let verdict = match (result.status, result.classification) {
                (Status::Failed, _) => result.classification.label().red(),
                (_, Classification::PotentialVulnerability) => result.classification.label().yellow(),
                (_, Classification::NeedsReview) => result.classification.label().cyan(),
                _ => result.classification.label().green(),
            };
            println!("      -> {} ({})", verdict, result.confidence);

            if let Some(audit) = &self.audit {
                audit.write(&result, &case_file);
            }
            aggregator.record(result);

            if idx + 1 < total {
                self.pacer.wait();
            }
        }

        aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassifierSettings;
    use crate::config::{EvidenceConfig, SearchConfig};
    use crate::error::CallError;
    use crate::models::{Confidence, SignalFlag};
    use crate::remote::mock::{completion, server_error, ScriptedService};
    use crate::retry::RetryPolicy;
    use crate::search::{Exclusions, SearchAdapter, SearchBackend};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn verdict(classification: &str, confidence: &str, context: &str) -> Result<String, CallError> {
        Ok(completion(&json!({
            "classification": classification,
            "confidence": confidence,
            "justification": "test verdict",
            "highest_risk_context": context,
        })))
    }

    fn client(script: Vec<Result<String, CallError>>) -> ClassificationClient<ScriptedService> {
        ClassificationClient::new(
            ScriptedService::new(script),
            RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
            ClassifierSettings {
                model: "test-model".into(),
                temperature: 0.0,
                max_case_file_chars: 16_000,
                home_org: "acme".into(),
            },
        )
    }

    fn adapter(backend: Option<SearchBackend>) -> SearchAdapter {
        SearchAdapter::new(backend, &SearchConfig::default(), Exclusions::default())
    }

    fn run(
        root: &Path,
        search: &SearchAdapter,
        candidates: &[PackageCandidate],
        script: Vec<Result<String, CallError>>,
    ) -> (ResultAggregator, usize) {
        let profile = ProjectProfile::default();
        let collector = EvidenceCollector::new(search, root, "acme", true, &EvidenceConfig::default());
        let pipeline = Pipeline::new(collector, client(script), Pacer::new(Duration::ZERO), &profile);
        let agg = pipeline.run(candidates);
        let calls = pipeline.client().service().calls.get();
        (agg, calls)
    }

    #[test]
    fn name_only_candidate_is_classified_from_name() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("README.md"), "nothing relevant\n").unwrap();
        let search = adapter(SearchBackend::probe());

        let (agg, calls) = run(
            tmp.path(),
            &search,
            &[PackageCandidate::new("left-pad", "npm")],
            vec![verdict("False Positive", "High", "N/A")],
        );

        assert_eq!(calls, 1);
        let r = &agg.results()[0];
        assert_eq!(r.classification, Classification::FalsePositive);
        assert_eq!(r.confidence, Confidence::High);
        assert_eq!(r.highest_risk_evidence, "N/A");
        assert!(r.signals.contains(&SignalFlag::NoEvidence));
    }

    #[test]
    fn declared_internal_dependency_carries_usage_signals() {
        let Some(backend) = SearchBackend::probe() else {
            return;
        };
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("package.json"),
            "{\n  \"name\": \"acme-web\",\n  \"dependencies\": {\n    \"@acme/internal-auth\": \"^1.2.0\"\n  }\n}\n",
        )
        .unwrap();
        let search = adapter(Some(backend));
        let context = r#""@acme/internal-auth": "^1.2.0""#;

        let (agg, _) = run(
            tmp.path(),
            &search,
            &[PackageCandidate::new("@acme/internal-auth", "npm")],
            vec![verdict("Potential Vulnerability", "High", context)],
        );

        let r = &agg.results()[0];
        assert_eq!(r.classification, Classification::PotentialVulnerability);
        assert_eq!(r.highest_risk_evidence, context);
        assert!(r.signals.contains(&SignalFlag::Namespaced));
        assert!(r.signals.contains(&SignalFlag::OrgBranded));
        assert!(r.signals.contains(&SignalFlag::InternalNaming));
        assert!(!r.signals.contains(&SignalFlag::NoEvidence));

        let summary = agg.summarize();
        assert_eq!(summary.count(Classification::PotentialVulnerability), 1);
        assert_eq!(summary.total, 1);
    }

    #[test]
    fn one_failing_candidate_does_not_stop_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let search = adapter(None);
        let candidates = [
            PackageCandidate::new("acme-core", "pypi"),
            PackageCandidate::new("acme-ui", "npm"),
            PackageCandidate::new("left-pad", "npm"),
        ];
        let script = vec![
            server_error(),
            server_error(),
            server_error(),
            verdict("Needs Review", "Low", "N/A"),
            verdict("False Positive", "High", "N/A"),
        ];

        let (agg, calls) = run(tmp.path(), &search, &candidates, script);

        assert_eq!(calls, 5);
        assert_eq!(agg.results().len(), 3);
        let got: Vec<_> = agg
            .results()
            .iter()
            .map(|r| (r.candidate.name.as_str(), r.classification))
            .collect();
        assert_eq!(
            got,
            vec![
                ("acme-core", Classification::AnalysisFailed),
                ("acme-ui", Classification::NeedsReview),
                ("left-pad", Classification::FalsePositive),
            ]
        );
        let summary = agg.summarize();
        assert_eq!(summary.count(Classification::AnalysisFailed), 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn audit_artifacts_are_written_per_candidate() {
        let tmp = tempfile::tempdir().unwrap();
        let audit_dir = tmp.path().join("audit");
        let search = adapter(None);
        let profile = ProjectProfile::default();
        let collector = EvidenceCollector::new(&search, tmp.path(), "acme", true, &EvidenceConfig::default());
        let pipeline = Pipeline::new(
            collector,
            client(vec![verdict("False Positive", "Medium", "N/A")]),
            Pacer::new(Duration::ZERO),
            &profile,
        )
        .with_audit(Some(AuditSink::new(&audit_dir)));

        pipeline.run(&[PackageCandidate::new("left-pad", "npm")]);

        let case = fs::read_to_string(audit_dir.join("npm_left-pad.case.md")).unwrap();
        assert!(case.contains("Package name: left-pad"));
        assert!(audit_dir.join("npm_left-pad.json").exists());
    }
}
