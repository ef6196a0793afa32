//! Response decoding: turn generated text into the HTTP response body.
//!
//! Two modes exist (see [`ResponseMode`]): strict mode insists the model
//! produced JSON and fails the request otherwise; raw mode returns whatever
//! was generated, wrapped as `{"text": [..]}`.

use crate::config::ResponseMode;
use crate::error::OcrError;
use crate::pipeline::inference::Generation;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// The decoded result of one OCR request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OcrOutput {
    /// Strict mode: the parsed JSON document, returned as-is.
    Structured(serde_json::Value),
    /// Raw mode: the decoded sequences, unvalidated.
    Raw { text: Vec<String> },
}

/// The page schema olmOCR is trained to emit.
///
/// Only used for logging; responses are never rejected for not matching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub primary_language: Option<String>,
    pub is_rotation_valid: bool,
    pub rotation_correction: i32,
    pub is_table: bool,
    pub is_diagram: bool,
    pub natural_text: Option<String>,
}

/// Decode a generation according to `mode`.
pub fn decode(
    generation: Generation,
    prompt: &str,
    mode: ResponseMode,
) -> Result<OcrOutput, OcrError> {
    let sequences: Vec<String> = generation
        .sequences
        .iter()
        .map(|s| strip_prompt_prefix(s, prompt).to_string())
        .collect();

    match mode {
        ResponseMode::RawText => Ok(OcrOutput::Raw { text: sequences }),
        ResponseMode::StrictJson => {
            let full_text = sequences.join(" ");
            let value = parse_json(&full_text)?;
            log_page_summary(&value);
            Ok(OcrOutput::Structured(value))
        }
    }
}

/// Drop an echoed prompt from the front of a generated sequence.
///
/// Some runtimes return prompt + completion as one string; chat endpoints
/// return the completion only, in which case this is a no-op.
pub fn strip_prompt_prefix<'a>(sequence: &'a str, prompt: &str) -> &'a str {
    if prompt.is_empty() {
        return sequence;
    }
    sequence.strip_prefix(prompt).unwrap_or(sequence)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n(.*)\n```\s*$").expect("valid regex"));

/// Parse decoded text as JSON, tolerating one outer code fence.
pub fn parse_json(text: &str) -> Result<serde_json::Value, OcrError> {
    let trimmed = text.trim();
    let body = RE_OUTER_FENCES
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |m| m.as_str());

    serde_json::from_str(body).map_err(|e| {
        debug!("Model output is not JSON ({e}): {:.200}", body);
        OcrError::InvalidJson(e)
    })
}

fn log_page_summary(value: &serde_json::Value) {
    match serde_json::from_value::<PageResponse>(value.clone()) {
        Ok(page) => info!(
            "Decoded page: language={}, rotation_valid={}, table={}, diagram={}, {} chars",
            page.primary_language.as_deref().unwrap_or("?"),
            page.is_rotation_valid,
            page.is_table,
            page.is_diagram,
            page.natural_text.as_deref().map_or(0, |t| t.chars().count()),
        ),
        Err(_) => info!("Decoded JSON output (non-page schema)"),
    }
}
