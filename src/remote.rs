//! Reasoning service boundary: an OpenAI-compatible chat completions endpoint
//! asked for a JSON object response.

use crate::error::CallError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 500;

// ── Wire types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn json_object(model: &str, messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            messages,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
            temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Pull the first choice's message text out of a chat completion body.
pub fn message_content(body: &str) -> Result<String, CallError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| CallError::Malformed(format!("completion envelope: {e}")))?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| CallError::Malformed("completion has no message content".to_string()))
}

// ── Service ────────────────────────────────────────────────────────────────────

/// One synchronous exchange with the reasoning service. Returns the raw
/// response body on a 2xx status.
pub trait ReasoningService {
    fn complete(&self, request: &ChatRequest) -> Result<String, CallError>;
}

pub struct HttpReasoningService {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl HttpReasoningService {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl ReasoningService for HttpReasoningService {
    fn complete(&self, request: &ChatRequest) -> Result<String, CallError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().map_err(transport_error)?;

        if !status.is_success() {
            let preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(CallError::Status {
                code: status.as_u16(),
                body: preview,
            });
        }
        Ok(body)
    }
}

fn transport_error(e: reqwest::Error) -> CallError {
    if e.is_timeout() {
        CallError::Timeout
    } else {
        CallError::Connection(e.to_string())
    }
}
