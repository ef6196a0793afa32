//! Model invocation: hand the assembled message to a vision model.
//!
//! [`VisionModel`] is the seam between the pipeline and whatever runs the
//! weights. Production uses [`LlmVisionModel`], which drives any
//! `edgequake-llm` provider (an OpenAI-compatible vLLM server hosting olmOCR,
//! Ollama, a hosted API). The provider owns tokenisation, the chat template
//! and device placement; this module only fixes the sampling parameters.
//!
//! There is no retry, timeout or cancellation here: a slow generation holds
//! its request until it finishes.

use crate::error::OcrError;
use crate::pipeline::message::OcrMessage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Sampling temperature used for every request.
pub const TEMPERATURE: f32 = 0.8;

/// Sampling parameters for one generation call.
///
/// Only `max_new_tokens` varies between deployments; the rest is fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub do_sample: bool,
    pub num_return_sequences: usize,
    pub max_new_tokens: Option<usize>,
}

impl SamplingParams {
    pub fn new(max_new_tokens: Option<usize>) -> Self {
        Self {
            temperature: TEMPERATURE,
            do_sample: true,
            num_return_sequences: 1,
            max_new_tokens,
        }
    }
}

/// Raw output of one generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    /// One decoded string per returned sequence.
    pub sequences: Vec<String>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A pretrained vision-language model.
///
/// Implementations are shared read-only across concurrent requests.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(
        &self,
        message: &OcrMessage,
        params: &SamplingParams,
    ) -> Result<Generation, OcrError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn generate(
        &self,
        message: &OcrMessage,
        params: &SamplingParams,
    ) -> Result<Generation, OcrError> {
        let (b64, mime) = message
            .image
            .clone()
            .ok_or_else(|| OcrError::Prompt("message carries no image".into()))?;

        let messages = vec![ChatMessage::user_with_images(
            message.prompt(),
            vec![ImageData::new(b64, mime)],
        )];
        let options = build_options(params);

        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| OcrError::Inference(e.to_string()))?;

        debug!(
            "Generation: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(Generation {
            sequences: vec![response.content],
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the sampling parameters.
fn build_options(params: &SamplingParams) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(params.temperature),
        max_tokens: params.max_new_tokens,
        ..Default::default()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "allenai/olmOCR-7B-0225-preview";

/// Resolve the model provider, from most-specific to least-specific:
///
/// 1. **Named provider** (`provider_name`) with `model` or [`DEFAULT_MODEL`].
/// 2. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 3. **Auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, OcrError> {
    if let Some(name) = provider_name {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, model.unwrap_or(&env_model));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| OcrError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No model provider could be auto-detected from environment.\n\
                Pass --provider/--model or set EDGEQUAKE_LLM_PROVIDER and EDGEQUAKE_MODEL.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, OcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        OcrError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
