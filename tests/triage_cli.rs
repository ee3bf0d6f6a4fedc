//! Integration tests for the `deptriage` CLI against a local stand-in for the
//! reasoning service.

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;

fn deptriage_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_deptriage"))
}

// ── Mock chat completions server ────────────────────────────

type Responder = dyn Fn(&str) -> (u16, String) + Send + Sync;

struct MockServer {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    fn start(responder: impl Fn(&str) -> (u16, String) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("mock addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let responder: Arc<Responder> = Arc::new(responder);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let raw = read_request(&mut stream);
                let (status, body) = responder(&raw);
                seen.lock().unwrap().push(raw);
                let reply = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    if status < 400 { "OK" } else { "Error" },
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            url: format!("http://{addr}/v1/chat/completions"),
            requests,
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn completion(classification: &str, confidence: &str, justification: &str) -> String {
    let verdict = serde_json::json!({
        "classification": classification,
        "confidence": confidence,
        "justification": justification,
        "highest_risk_context": "N/A",
    });
    serde_json::json!({
        "id": "chatcmpl-mock",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": verdict.to_string()}}]
    })
    .to_string()
}

// ── Helpers ─────────────────────────────────────────────────

/// A target tree named `acme` with one candidate list.
fn setup_target(tmp: &Path, list_name: &str, names: &str) -> PathBuf {
    let target = tmp.join("acme");
    fs::create_dir_all(target.join("DEP")).unwrap();
    fs::write(target.join("README.md"), "# acme web\nNothing to see.\n").unwrap();
    fs::write(target.join("DEP").join(list_name), names).unwrap();
    target
}

/// Run with an isolated config dir and a known credential.
fn run_cli(tmp: &Path, args: &[&str]) -> Output {
    deptriage_bin()
        .args(args)
        .env("OPENAI_API_KEY", "test-key")
        .env("XDG_CONFIG_HOME", tmp.join("config"))
        .env("HOME", tmp)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("run deptriage")
}

fn read_report(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).expect("open report");
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        [
            "package_name",
            "package_type",
            "classification",
            "confidence",
            "justification",
            "highest_risk_context"
        ]
    );
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

// ── Run ─────────────────────────────────────────────────────

#[test]
fn name_only_candidate_lands_in_report() {
    let tmp = tempfile::tempdir().unwrap();
    let target = setup_target(tmp.path(), "npm.potential", "left-pad\n");
    let server = MockServer::start(|_| (200, completion("False Positive", "High", "Generic public name.")));

    let out = run_cli(
        tmp.path(),
        &["run", target.to_str().unwrap(), "--endpoint", &server.url, "--delay-ms", "0"],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let rows = read_report(&target.join("llm_analysis_report.csv"));
    assert_eq!(
        rows,
        vec![vec!["left-pad", "npm", "False Positive", "High", "Generic public name.", "N/A"]]
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.to_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains("json_object"));
    assert!(request.contains("Package name: left-pad"));
    assert!(request.contains("Organization: acme"));
    // The candidate list itself must never count as evidence.
    assert!(request.contains("No source code context was found"));
}

#[test]
fn failed_candidate_does_not_stop_later_ones() {
    let tmp = tempfile::tempdir().unwrap();
    let target = setup_target(tmp.path(), "npm.potential", "acme-core\nleft-pad\n");
    let server = MockServer::start(|raw| {
        if raw.contains("Package name: acme-core") {
            (500, r#"{"error":"overloaded"}"#.to_string())
        } else {
            (200, completion("False Positive", "Medium", "Public package."))
        }
    });

    let out = run_cli(
        tmp.path(),
        &[
            "run",
            target.to_str().unwrap(),
            "--endpoint",
            &server.url,
            "--delay-ms",
            "0",
            "--base-delay-ms",
            "0",
            "--max-attempts",
            "3",
        ],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let rows = read_report(&target.join("llm_analysis_report.csv"));
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0],
        vec![
            "acme-core",
            "npm",
            "Analysis Failed",
            "Unknown",
            "remote analysis failed after retries",
            "N/A"
        ]
    );
    assert_eq!(rows[1][0], "left-pad");
    assert_eq!(rows[1][2], "False Positive");
    assert_eq!(server.requests().len(), 4);

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Analysis Failed: 1"));
    assert!(stdout.contains("Total Packages Analyzed: 2"));
}

#[test]
fn audit_dir_receives_case_files() {
    let tmp = tempfile::tempdir().unwrap();
    let target = setup_target(tmp.path(), "pypi.potential", "acme_internal\n");
    let audit = tmp.path().join("audit");
    let server = MockServer::start(|_| (200, completion("Needs Review", "Low", "Unclear.")));

    let out = run_cli(
        tmp.path(),
        &[
            "run",
            target.to_str().unwrap(),
            "--endpoint",
            &server.url,
            "--delay-ms",
            "0",
            "--audit-dir",
            audit.to_str().unwrap(),
        ],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(audit.join("pypi_acme_internal.case.md").exists());
    assert!(audit.join("pypi_acme_internal.json").exists());
}

#[test]
fn missing_credential_is_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let target = setup_target(tmp.path(), "npm.potential", "left-pad\n");

    let out = deptriage_bin()
        .args(["run", target.to_str().unwrap()])
        .env_remove("OPENAI_API_KEY")
        .env("XDG_CONFIG_HOME", tmp.path().join("config"))
        .env("HOME", tmp.path())
        .output()
        .expect("run deptriage");

    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("OPENAI_API_KEY"));
    assert!(!target.join("llm_analysis_report.csv").exists());
}

#[test]
fn missing_target_is_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let out = run_cli(tmp.path(), &["run", tmp.path().join("nope").to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn missing_input_dir_is_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("acme");
    fs::create_dir_all(&target).unwrap();
    let out = run_cli(tmp.path(), &["run", target.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn empty_candidate_lists_mean_nothing_to_do() {
    let tmp = tempfile::tempdir().unwrap();
    let target = setup_target(tmp.path(), "npm.potential", "\n\n");

    let out = run_cli(tmp.path(), &["run", target.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("nothing to analyze"));
    assert!(!target.join("llm_analysis_report.csv").exists());
}

#[test]
fn unwritable_report_exits_one_after_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let target = setup_target(tmp.path(), "npm.potential", "left-pad\n");
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let server = MockServer::start(|_| (200, completion("False Positive", "High", "Generic.")));

    let out = run_cli(
        tmp.path(),
        &[
            "run",
            target.to_str().unwrap(),
            "--endpoint",
            &server.url,
            "--delay-ms",
            "0",
            "--output",
            blocker.join("report.csv").to_str().unwrap(),
        ],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Total Packages Analyzed: 1"));
}

// ── Profile / evidence ──────────────────────────────────────

#[test]
fn profile_json_reports_private_registry() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("acme");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join(".npmrc"), "@acme:registry=https://npm.acme.internal/\n").unwrap();
    fs::write(target.join("package.json"), r#"{"name":"acme-web","private":true}"#).unwrap();

    let out = run_cli(tmp.path(), &["profile", target.to_str().unwrap(), "--json"]);
    assert!(out.status.success());
    let profile: serde_json::Value = serde_json::from_slice(&out.stdout).expect("profile json");
    assert_eq!(profile["has_private_registry_config"], true);
    assert_eq!(profile["likely_internal"], true);
    assert_eq!(profile["ecosystems"], serde_json::json!(["npm"]));
}

#[test]
fn evidence_command_shows_matches_and_signals() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("acme");
    fs::create_dir_all(&target).unwrap();
    fs::write(
        target.join("package.json"),
        "{\n  \"dependencies\": {\n    \"@acme/internal-auth\": \"^1.2.0\"\n  }\n}\n",
    )
    .unwrap();

    let out = run_cli(
        tmp.path(),
        &["evidence", target.to_str().unwrap(), "@acme/internal-auth", "--ecosystem", "npm"],
    );
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("org-branded"));
    assert!(stdout.contains("namespaced"));
    if stdout.contains("no-evidence") {
        // no rg/grep on this machine
        return;
    }
    assert!(stdout.contains("package.json:3:"));
    assert!(stdout.contains("Matched as: @acme/internal-auth"));
}
