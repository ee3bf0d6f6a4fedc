mod candidates;
mod classify;
mod config;
mod error;
mod evidence;
mod models;
mod pacer;
mod pipeline;
mod profile;
mod remote;
mod report;
mod retry;
mod search;
mod signals;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use config::Config;
use error::ConfigError;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "deptriage",
    version,
    about = "Dependency confusion triage - classify unregistered package names against source evidence",
    long_about = "Collects source evidence and project signals for package names that are not registered on their public registry, asks a reasoning service to classify each one, and writes a CSV report."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every candidate listed under the input directory
    Run(RunArgs),

    /// Show the project profile of a target directory
    Profile {
        /// Target source tree
        target: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the evidence and signals collected for one package name (no remote call)
    Evidence {
        /// Target source tree
        target: PathBuf,

        /// Package name to search for
        name: String,

        /// Ecosystem label
        #[arg(short, long, default_value = "unknown")]
        ecosystem: String,

        /// Home organization (defaults to the target directory name)
        #[arg(long)]
        org: Option<String>,
    },

    /// Show or create the configuration file
    Config {
        /// Write the default config file
        #[arg(long)]
        create: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Target source tree
    target: PathBuf,

    /// Directory of candidate lists (default: <TARGET>/DEP)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Home organization (defaults to the target directory name)
    #[arg(long)]
    org: Option<String>,

    /// Report path (default: <TARGET>/llm_analysis_report.csv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the case file and full result of every candidate here
    #[arg(long)]
    audit_dir: Option<PathBuf>,

    /// Model name sent to the reasoning service
    #[arg(long)]
    model: Option<String>,

    /// Chat completions endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Delay between candidates, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Attempts per candidate before it is marked as failed
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Initial retry backoff, in milliseconds
    #[arg(long)]
    base_delay_ms: Option<u64>,

    /// Match package names case-sensitively
    #[arg(long)]
    case_sensitive: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = dispatch(cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run(args),

        Commands::Profile { target, json } => {
            let config = Config::load()?;
            let target = resolve_target(&target)?;
            let profile = profile::profile(&target, &config.filters);
            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                print_profile(&target, &profile);
            }
            Ok(())
        }

        Commands::Evidence {
            target,
            name,
            ecosystem,
            org,
        } => {
            let config = Config::load()?;
            let target = resolve_target(&target)?;
            let org = org.unwrap_or_else(|| default_org(&target));
            let exclusions = search::Exclusions {
                file_names: vec![config.report.file_name.clone()],
                dirs: vec![config.report.input_dir.clone()],
                suffixes: suffixes(&config),
            };
            let adapter = search::SearchAdapter::new(search::SearchBackend::probe(), &config.search, exclusions);
            let profile = profile::profile(&target, &config.filters);
            let collector = evidence::EvidenceCollector::new(
                &adapter,
                &target,
                &org,
                config.search.case_insensitive,
                &config.evidence,
            );
            let candidate = models::PackageCandidate::new(name, ecosystem);
            print_evidence(&candidate, &collector.collect(&candidate, &profile));
            Ok(())
        }

        Commands::Config { create } => {
            if create {
                let path = Config::create_default()?;
                println!("Created: {}", path.display());
            } else {
                config::show_config()?;
            }
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &args);

    let api_key = std::env::var(&config.classifier.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(config.classifier.api_key_env.clone()))?;

    let target = resolve_target(&args.target)?;
    let input_dir = match &args.input {
        Some(dir) => dir.clone(),
        None => target.join(&config.report.input_dir),
    };
    let input_dir = input_dir
        .canonicalize()
        .map_err(|_| ConfigError::MissingInput(input_dir.clone()))?;

    let candidates = candidates::load(&input_dir, &config.report.candidate_suffix)?;
    if candidates.is_empty() {
        println!(
            "{} No candidates found in {}; nothing to analyze.",
            "[INFO]".green(),
            input_dir.display()
        );
        return Ok(());
    }

    let org = args.org.clone().unwrap_or_else(|| default_org(&target));
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| target.join(&config.report.file_name));

    let audit_dir = match &args.audit_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create audit directory {}", dir.display()))?;
            Some(dir.canonicalize().unwrap_or_else(|_| dir.clone()))
        }
        None => None,
    };

    let mut exclusions = search::Exclusions {
        file_names: output
            .file_name()
            .map(|n| vec![n.to_string_lossy().to_string()])
            .unwrap_or_default(),
        dirs: Vec::new(),
        suffixes: suffixes(&config),
    };
    for dir in [Some(&input_dir), audit_dir.as_ref()].into_iter().flatten() {
        if let Ok(rel) = dir.strip_prefix(&target) {
            if !rel.as_os_str().is_empty() {
                exclusions.dirs.push(rel.to_string_lossy().to_string());
            }
        }
    }

    let adapter = search::SearchAdapter::new(search::SearchBackend::probe(), &config.search, exclusions);
    if adapter.backend().is_none() {
        tracing::warn!("neither rg nor grep is available; evidence will be empty");
    }

    let profile = profile::profile(&target, &config.filters);
    tracing::info!(ecosystems = ?profile.ecosystems, likely_internal = profile.likely_internal, "project profiled");

    println!("{}", "Dependency confusion triage".bold());
    println!("  Target:       {}", target.display());
    println!("  Organization: {}", org);
    println!("  Candidates:   {}", candidates.len());
    println!("  Model:        {}", config.classifier.model);
    println!(
        "  Search:       {}",
        adapter.backend().map(|b| b.program()).unwrap_or("none")
    );
    println!();

    let service = remote::HttpReasoningService::new(
        &config.classifier.endpoint,
        &api_key,
        Duration::from_secs(config.classifier.timeout_secs.max(1)),
    )?;
    let policy = retry::RetryPolicy::new(
        config.classifier.max_attempts,
        Duration::from_millis(config.classifier.base_delay_ms),
        Duration::from_millis(config.classifier.max_delay_ms),
    );
    let client = classify::ClassificationClient::new(
        service,
        policy,
        classify::ClassifierSettings {
            model: config.classifier.model.clone(),
            temperature: config.classifier.temperature,
            max_case_file_chars: config.classifier.max_case_file_chars,
            home_org: org.clone(),
        },
    );
    let collector = evidence::EvidenceCollector::new(
        &adapter,
        &target,
        &org,
        config.search.case_insensitive,
        &config.evidence,
    );
    let pipeline = pipeline::Pipeline::new(
        collector,
        client,
        pacer::Pacer::new(Duration::from_millis(config.pacer.delay_ms)),
        &profile,
    )
    .with_audit(audit_dir.as_deref().map(report::AuditSink::new));

    let aggregator = pipeline.run(&candidates);
    let summary = aggregator.summarize();
    let persisted = aggregator.persist(&output);

    println!();
    report::print_summary(&aggregator, &summary);
    persisted?;
    println!("Report saved to: {}", output.display().to_string().bold());
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(model) = &args.model {
        config.classifier.model = model.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.classifier.endpoint = endpoint.clone();
    }
    if let Some(delay) = args.delay_ms {
        config.pacer.delay_ms = delay;
    }
    if let Some(attempts) = args.max_attempts {
        config.classifier.max_attempts = attempts;
    }
    if let Some(base) = args.base_delay_ms {
        config.classifier.base_delay_ms = base;
    }
    if args.case_sensitive {
        config.search.case_insensitive = false;
    }
}

fn resolve_target(target: &Path) -> Result<PathBuf, ConfigError> {
    if !target.is_dir() {
        return Err(ConfigError::MissingTarget(target.to_path_buf()));
    }
    target
        .canonicalize()
        .map_err(|_| ConfigError::MissingTarget(target.to_path_buf()))
}

fn default_org(target: &Path) -> String {
    target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn suffixes(config: &Config) -> Vec<String> {
    let suffix = config.report.candidate_suffix.trim();
    if suffix.is_empty() {
        Vec::new()
    } else {
        vec![suffix.to_string()]
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// 2 for setup problems, 1 for everything else (including an unwritable report).
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        2
    } else {
        1
    }
}

fn print_profile(target: &Path, profile: &models::ProjectProfile) {
    println!("{} {}", "Project profile:".bold(), target.display());
    let ecosystems: Vec<&str> = profile.ecosystems.iter().map(String::as_str).collect();
    println!(
        "  Ecosystems:              {}",
        if ecosystems.is_empty() { "-".to_string() } else { ecosystems.join(", ") }
    );
    println!("  Private registry config: {}", profile.has_private_registry_config);
    println!("  Likely internal:         {}", profile.likely_internal);
    for c in &profile.characteristics {
        println!("  {} {}", "-".dimmed(), c);
    }
    if !profile.manifests.is_empty() {
        println!("  Manifests:");
        for m in &profile.manifests {
            println!("    {}", m);
        }
    }
}

fn print_evidence(candidate: &models::PackageCandidate, evidence: &evidence::Evidence) {
    println!(
        "{} {} ({})",
        "Evidence for".bold(),
        candidate.name.bold(),
        candidate.ecosystem
    );
    let signals: Vec<&str> = evidence.signals.iter().map(|s| s.as_str()).collect();
    println!("  Signals: {}", signals.join(", "));
    if let Some(variant) = &evidence.matched_variant {
        println!("  Matched as: {}", variant);
    }
    if evidence.snippets.is_empty() {
        println!("  {}", "No source references found.".dimmed());
    }
    for s in &evidence.snippets {
        println!("  {}:{}: {}", s.file.cyan(), s.line, s.content);
    }
}
