use std::path::PathBuf;
use thiserror::Error;

/// Whole-run setup failures. Fatal before any candidate is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("'{0}' environment variable not set; cannot reach the reasoning service")]
    MissingCredential(String),

    #[error("target directory not found: {}", .0.display())]
    MissingTarget(PathBuf),

    #[error("candidate directory not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("invalid config file {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Recoverable search failures. Never propagated past the search adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search timed out after {0}s")]
    Timeout(u64),

    #[error("failed to start {tool}: {message}")]
    Spawn { tool: &'static str, message: String },

    #[error("{tool} exited with {code:?}: {stderr}")]
    Tool {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

/// One failed exchange with the reasoning service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("service returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl CallError {
    /// Timeouts, connection errors, 5xx and unparseable responses are worth another
    /// attempt; client-side rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Timeout | CallError::Connection(_) | CallError::Malformed(_) => true,
            CallError::Status { code, .. } => (500..600).contains(code),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write report {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
