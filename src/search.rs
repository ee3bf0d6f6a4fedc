//! Literal-text search over the target tree.
//!
//! Two interchangeable backends (ripgrep, grep) are chosen once by a capability
//! probe. Both are run as argv lists in the target root searching `.`, so the
//! candidate name never passes through a shell and the output paths are
//! already relative.

use crate::config::SearchConfig;
use crate::error::SearchError;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Ripgrep,
    Grep,
}

impl SearchBackend {
    /// Prefer ripgrep, fall back to grep, `None` when neither runs.
    pub fn probe() -> Option<Self> {
        [SearchBackend::Ripgrep, SearchBackend::Grep]
            .into_iter()
            .find(|backend| backend.is_available())
    }

    pub fn program(self) -> &'static str {
        match self {
            SearchBackend::Ripgrep => "rg",
            SearchBackend::Grep => "grep",
        }
    }

    fn is_available(self) -> bool {
        Command::new(self.program())
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build the argument list for one literal search of `.`.
    pub fn build_args(
        self,
        pattern: &str,
        case_insensitive: bool,
        max_count_per_file: usize,
        exclusions: &Exclusions,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self {
            SearchBackend::Ripgrep => {
                args.extend(
                    [
                        "--line-number",
                        "--no-heading",
                        "--with-filename",
                        "--color=never",
                        "--no-ignore",
                        "--hidden",
                        "--fixed-strings",
                    ]
                    .map(OsString::from),
                );
                if case_insensitive {
                    args.push("--ignore-case".into());
                }
                args.push("--max-count".into());
                args.push(max_count_per_file.to_string().into());
                for glob in exclusions.ripgrep_globs() {
                    args.push("-g".into());
                    args.push(glob.into());
                }
            }
            SearchBackend::Grep => {
                args.extend(["-r", "-n", "-H", "-I", "-F", "--color=never"].map(OsString::from));
                if case_insensitive {
                    args.push("-i".into());
                }
                args.push("-m".into());
                args.push(max_count_per_file.to_string().into());
                args.extend(exclusions.grep_flags().into_iter().map(OsString::from));
            }
        }
        args.push("-e".into());
        args.push(pattern.into());
        args.push("--".into());
        args.push(".".into());
        args
    }
}

/// Paths the search must never report: the run's own bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    /// Exact file names excluded at any depth (e.g. the report CSV).
    pub file_names: Vec<String>,
    /// Directories excluded, relative to the search root.
    pub dirs: Vec<String>,
    /// File name suffixes excluded (e.g. `.potential`).
    pub suffixes: Vec<String>,
}

impl Exclusions {
    fn ripgrep_globs(&self) -> Vec<String> {
        let mut globs = vec!["!.git".to_string()];
        globs.extend(self.file_names.iter().map(|n| format!("!{n}")));
        globs.extend(self.dirs.iter().map(|d| format!("!{}", d.trim_end_matches('/'))));
        globs.extend(self.suffixes.iter().map(|s| format!("!*{s}")));
        globs
    }

    fn grep_flags(&self) -> Vec<String> {
        let mut flags = vec!["--exclude-dir=.git".to_string()];
        flags.extend(self.file_names.iter().map(|n| format!("--exclude={n}")));
        // grep matches --exclude-dir against base names only
        flags.extend(self.dirs.iter().filter_map(|d| {
            Path::new(d)
                .file_name()
                .map(|base| format!("--exclude-dir={}", base.to_string_lossy()))
        }));
        flags.extend(self.suffixes.iter().map(|s| format!("--exclude=*{s}")));
        flags
    }
}

/// One `file:line:content` record as emitted by the search tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub file: String,
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct SearchOutput {
    pub matches: Vec<RawMatch>,
    /// Set when the search degraded; `matches` may still hold partial results.
    pub error: Option<SearchError>,
    pub skipped_lines: usize,
    /// Output stopped at the line cap; later matches were never read.
    pub truncated: bool,
}

/// Immutable search capability shared by the whole run.
#[derive(Debug, Clone)]
pub struct SearchAdapter {
    backend: Option<SearchBackend>,
    timeout: Duration,
    max_count_per_file: usize,
    max_output_lines: usize,
    exclusions: Exclusions,
}

impl SearchAdapter {
    pub fn new(backend: Option<SearchBackend>, config: &SearchConfig, exclusions: Exclusions) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_count_per_file: config.max_count_per_file.max(1),
            max_output_lines: config.max_output_lines.max(1),
            exclusions,
        }
    }

    pub fn backend(&self) -> Option<SearchBackend> {
        self.backend
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn search(&self, pattern: &str, root: &Path, case_insensitive: bool) -> SearchOutput {
        let Some(backend) = self.backend else {
            return SearchOutput {
                error: Some(SearchError::Spawn {
                    tool: "rg/grep",
                    message: "no search tool available".to_string(),
                }),
                ..SearchOutput::default()
            };
        };

        let args = backend.build_args(
            pattern,
            case_insensitive,
            self.max_count_per_file,
            &self.exclusions,
        );
        let mut cmd = Command::new(backend.program());
        cmd.args(&args).current_dir(root);
        tracing::debug!(tool = backend.program(), pattern, root = %root.display(), "search");

        let captured = match run_with_timeout(cmd, self.timeout, self.max_output_lines, backend.program()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(pattern, "search failed: {e}");
                return SearchOutput {
                    error: Some(e),
                    ..SearchOutput::default()
                };
            }
        };

        let stdout = String::from_utf8_lossy(&captured.stdout);
        if captured.truncated {
            tracing::debug!(pattern, limit = self.max_output_lines, "search output capped");
        }
        // Exit code: 0=matches, 1=no matches, 2=error (possibly with partial output).
        // A capped read closes the pipe early, so the exit status no longer means anything.
        let error = match captured.status.code() {
            _ if captured.truncated => None,
            Some(0) | Some(1) => None,
            code => {
                let stderr = String::from_utf8_lossy(&captured.stderr).trim().to_string();
                tracing::warn!(tool = backend.program(), ?code, "search tool reported an error: {stderr}");
                Some(SearchError::Tool {
                    tool: backend.program(),
                    code,
                    stderr,
                })
            }
        };

        let (mut matches, skipped_lines) = parse_output(&stdout);
        for m in &mut matches {
            m.file = normalize_path(&m.file);
        }

        SearchOutput {
            matches,
            error,
            skipped_lines,
            truncated: captured.truncated,
        }
    }
}

/// Split one output line on its first two colons. Everything after the second
/// colon is content, verbatim. Returns `None` for lines of any other shape.
pub fn parse_line(line: &str) -> Option<RawMatch> {
    let (file, rest) = line.split_once(':')?;
    let (number, content) = rest.split_once(':')?;
    if file.is_empty() || number.is_empty() || number.starts_with('0') {
        return None;
    }
    if !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let line_no: usize = number.parse().ok()?;
    Some(RawMatch {
        file: file.to_string(),
        line: line_no,
        content: content.to_string(),
    })
}

/// Parse full tool output. Returns matches in output order and the number of
/// non-empty lines that had to be skipped.
pub fn parse_output(stdout: &str) -> (Vec<RawMatch>, usize) {
    let mut matches = Vec::new();
    let mut skipped = 0;
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(m) => matches.push(m),
            None => {
                skipped += 1;
                let preview: String = line.chars().take(70).collect();
                tracing::warn!("could not parse search output line: {preview}");
            }
        }
    }
    (matches, skipped)
}

fn normalize_path(file: &str) -> String {
    file.strip_prefix("./").unwrap_or(file).to_string()
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
}

/// Run `cmd` to completion or kill it at `timeout`. Pipes are drained on
/// helper threads so a chatty child can't block on a full pipe. At most
/// `max_lines` lines of stdout are kept; the child is stopped once the cap is hit.
fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    max_lines: usize,
    tool: &'static str,
) -> Result<Captured, SearchError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SearchError::Spawn {
            tool,
            message: e.to_string(),
        })?;

    let capped = Arc::new(AtomicBool::new(false));
    let stdout = drain_lines(child.stdout.take(), max_lines, Arc::clone(&capped));
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if capped.load(Ordering::Acquire) => {
                let _ = child.kill();
                match child.wait() {
                    Ok(status) => break status,
                    Err(e) => {
                        return Err(SearchError::Spawn {
                            tool,
                            message: e.to_string(),
                        })
                    }
                }
            }
            Ok(None) if Instant::now() >= deadline => {
                kill(&mut child);
                return Err(SearchError::Timeout(timeout.as_secs()));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill(&mut child);
                return Err(SearchError::Spawn {
                    tool,
                    message: e.to_string(),
                });
            }
        }
    };

    Ok(Captured {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        truncated: capped.load(Ordering::Acquire),
    })
}

/// Read whole lines until EOF or `max_lines`. `capped` is raised only when more
/// output was still pending at the cap.
fn drain_lines<R: Read + Send + 'static>(
    pipe: Option<R>,
    max_lines: usize,
    capped: Arc<AtomicBool>,
) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let Some(pipe) = pipe else {
            return buf;
        };
        let mut reader = BufReader::new(pipe);
        let mut lines = 0;
        loop {
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => return buf,
                Ok(_) => {
                    lines += 1;
                    if lines >= max_lines {
                        if reader.fill_buf().map(|b| !b.is_empty()).unwrap_or(false) {
                            capped.store(true, Ordering::Release);
                        }
                        return buf;
                    }
                }
            }
        }
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        buf
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
