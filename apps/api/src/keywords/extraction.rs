//! Extraction Client: the seam between keyword reconciliation and the remote
//! completion service.
//!
//! The service has historically answered with either a comma-joined string or
//! an array of strings. Both shapes are normalized here so the reconciler only
//! ever sees `Vec<String>`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::keywords::prompts::{KEYWORD_EXTRACTION_PROMPT, KEYWORD_EXTRACTION_SYSTEM};
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{LlmClient, LlmError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub resume_text: String,
    pub existing_keywords: Vec<String>,
    pub non_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub raw_candidates: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    #[error("extraction service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed extraction payload: {0}")]
    Malformed(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
}

#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn extract(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ExtractionError>;
}

/// Reads `{"keywords": string | string[]}` or `{"error": string}`.
pub fn parse_extraction_payload(payload: &Value) -> Result<Vec<String>, ExtractionError> {
    if let Some(error) = payload.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ExtractionError::Unavailable(message));
    }

    match payload.get("keywords") {
        Some(Value::String(joined)) => Ok(joined.split(',').map(str::to_string).collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ExtractionError::Malformed(format!("non-string keyword entry: {item}"))
                })
            })
            .collect(),
        Some(other) => Err(ExtractionError::Malformed(format!(
            "`keywords` must be a string or an array, got {other}"
        ))),
        None => Err(ExtractionError::Malformed(format!(
            "missing `keywords` field in {payload}"
        ))),
    }
}

/// Extraction backed by the shared LLM client.
#[derive(Clone)]
pub struct LlmExtractionClient {
    llm: LlmClient,
}

impl LlmExtractionClient {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

fn render_prompt(request: &AnalysisRequest) -> String {
    let list_or_none = |list: &[String]| {
        if list.is_empty() {
            "(none)".to_string()
        } else {
            list.join(", ")
        }
    };
    // Resume text goes in last so placeholders inside it stay literal.
    let prompt = KEYWORD_EXTRACTION_PROMPT
        .replace("{existing_keywords}", &list_or_none(&request.existing_keywords))
        .replace("{non_keywords}", &list_or_none(&request.non_keywords))
        .replace("{resume_text}", &request.resume_text);
    format!("{prompt}\n{GROUNDING_INSTRUCTION}")
}

impl From<LlmError> for ExtractionError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited { retry_after } => ExtractionError::RateLimited { retry_after },
            LlmError::Parse(e) => ExtractionError::Malformed(e.to_string()),
            LlmError::EmptyContent => ExtractionError::Malformed("empty completion".to_string()),
            LlmError::Http(e) => ExtractionError::Unavailable(e.to_string()),
            e @ LlmError::Api { .. } => ExtractionError::Unavailable(e.to_string()),
        }
    }
}

#[async_trait]
impl ExtractionClient for LlmExtractionClient {
    async fn extract(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ExtractionError> {
        let prompt = render_prompt(request);
        let payload: Value = self
            .llm
            .call_json(&prompt, KEYWORD_EXTRACTION_SYSTEM)
            .await?;

        let raw_candidates = parse_extraction_payload(&payload)?;
        debug!("Extraction returned {} raw candidates", raw_candidates.len());
        Ok(AnalysisResult { raw_candidates })
    }
}
