//! Process-wide, read-only state shared by every request.
//!
//! The model handle and the frozen configuration are built once at startup
//! and handed to the HTTP layer as `Arc<OcrContext>`. Nothing in here is
//! mutated per request; dropping the last `Arc` after the server stops
//! releases the model connection.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::pipeline::inference::{resolve_provider, LlmVisionModel, SamplingParams, VisionModel};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub struct OcrContext {
    pub config: OcrConfig,
    pub model: Arc<dyn VisionModel>,
}

impl OcrContext {
    /// Build a context around an already constructed model.
    pub fn new(config: OcrConfig, model: Arc<dyn VisionModel>) -> Self {
        Self { config, model }
    }

    /// Build a context whose model is resolved from `config.provider_name`,
    /// `config.model` and the environment.
    pub fn from_config(config: OcrConfig) -> Result<Self, OcrError> {
        let provider = resolve_provider(config.provider_name.as_deref(), config.model.as_deref())?;
        info!(
            "Model provider ready (provider={}, model={})",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or("default")
        );
        Ok(Self::new(config, Arc::new(LlmVisionModel::new(provider))))
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams::new(self.config.max_new_tokens)
    }
}

impl fmt::Debug for OcrContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrContext")
            .field("config", &self.config)
            .field("model", &"<dyn VisionModel>")
            .finish()
    }
}
