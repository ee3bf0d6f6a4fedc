//! Result accumulation, the fixed-column CSV report, the terminal summary and
//! the optional per-candidate audit artifacts.

use crate::error::ReportError;
use crate::models::{Classification, ClassificationResult};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

pub const REPORT_COLUMNS: [&str; 6] = [
    "package_name",
    "package_type",
    "classification",
    "confidence",
    "justification",
    "highest_risk_context",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Every bucket, most severe first, including empty ones.
    pub counts: Vec<(Classification, usize)>,
    pub total: usize,
}

impl Summary {
    pub fn count(&self, bucket: Classification) -> usize {
        self.counts
            .iter()
            .find(|(b, _)| *b == bucket)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<ClassificationResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: ClassificationResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ClassificationResult] {
        &self.results
    }

    pub fn summarize(&self) -> Summary {
        let counts = Classification::ALL
            .iter()
            .map(|bucket| {
                let n = self
                    .results
                    .iter()
                    .filter(|r| r.classification == *bucket)
                    .count();
                (*bucket, n)
            })
            .collect();
        Summary {
            counts,
            total: self.results.len(),
        }
    }

    /// Write every result, in recorded order, with the fixed column set.
    pub fn persist(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let csv_err = |source: csv::Error| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        writer.write_record(REPORT_COLUMNS).map_err(csv_err)?;
        for r in &self.results {
            writer
                .write_record([
                    r.candidate.name.as_str(),
                    r.candidate.ecosystem.as_str(),
                    r.classification.label(),
                    r.confidence.label(),
                    r.justification.as_str(),
                    r.highest_risk_evidence.as_str(),
                ])
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn print_summary(aggregator: &ResultAggregator, summary: &Summary) {
    let rule = "---------------------------------".blue();
    println!("{rule}");
    println!("  {}", "Dependency Confusion Triage Summary".bold());
    println!("{rule}");
    println!("  Total Packages Analyzed: {}", summary.total.to_string().bold());
    for (bucket, n) in &summary.counts {
        let line = format!("  {}: {}", bucket.label(), n);
        let line = match bucket {
            Classification::PotentialVulnerability => line.yellow(),
            Classification::NeedsReview => line.cyan(),
            Classification::FalsePositive => line.green(),
            Classification::AnalysisFailed => line.red(),
        };
        println!("{line}");
    }
    println!("{rule}");

    let found = summary.count(Classification::PotentialVulnerability);
    if found == 0 {
        println!("  {} No potential vulnerabilities identified.", "[INFO]".green());
    } else {
        println!(
            "[{}] {}",
            "!!".yellow(),
            format!("Potential Vulnerabilities Found ({found}):").yellow()
        );
        let vulns = aggregator
            .results()
            .iter()
            .filter(|r| r.classification == Classification::PotentialVulnerability);
        for v in vulns {
            println!(
                "    {} {} ({})",
                "[VULN]".yellow(),
                v.candidate.name.bold(),
                v.candidate.ecosystem
            );
            println!("           {}", format!("Justification: {}", v.justification).dimmed());
            println!("           {}", format!("Highest Risk: {}", v.highest_risk_evidence).dimmed());
        }
    }
    println!("{rule}");
}

/// Per-candidate debug artifacts: the case file sent and the full result.
pub struct AuditSink {
    dir: PathBuf,
}

impl AuditSink {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Failures are logged, never propagated.
    pub fn write(&self, result: &ClassificationResult, case_file: &str) {
        if let Err(e) = self.try_write(result, case_file) {
            tracing::warn!(package = %result.candidate.name, "failed to write audit artifacts: {e}");
        }
    }

    fn try_write(&self, result: &ClassificationResult, case_file: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let stem = artifact_stem(&result.candidate.ecosystem, &result.candidate.name);
        fs::write(self.dir.join(format!("{stem}.case.md")), case_file)?;

        let record = serde_json::json!({
            "generated_at": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            "result": result,
        });
        fs::write(
            self.dir.join(format!("{stem}.json")),
            serde_json::to_string_pretty(&record)?,
        )?;
        Ok(())
    }
}

pub fn artifact_stem(ecosystem: &str, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{ecosystem}_{safe}")
}
