//! Configuration types for the OCR service.
//!
//! All service behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. The config is frozen into the
//! [`crate::context::OcrContext`] at startup and never mutated afterwards.
//!
//! Deployments differ on the response shape ([`ResponseMode`]), the multipart
//! field name ([`UploadField`]) and whether `max_new_tokens` is bounded, so
//! each of these is a setting rather than a hard-coded choice.

use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default CORS origin (a local frontend dev server).
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Smallest accepted longest-side bound, in pixels.
pub const MIN_TARGET_DIM: u32 = 64;

/// Largest accepted longest-side bound, in pixels.
pub const MAX_TARGET_DIM: u32 = 16_384;

/// Configuration for the OCR service.
///
/// # Example
/// ```rust
/// use edgequake_ocr::{OcrConfig, ResponseMode, UploadField};
///
/// let config = OcrConfig::builder()
///     .response_mode(ResponseMode::RawText)
///     .upload_field(UploadField::Pdf)
///     .max_new_tokens(None)
///     .build()
///     .unwrap();
/// assert_eq!(config.upload_field.as_str(), "pdf");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Socket address the HTTP server binds to. Default: `0.0.0.0:8000`.
    pub bind_address: SocketAddr,

    /// The single origin allowed by CORS. Default: `http://localhost:3000`.
    pub allowed_origin: String,

    /// Multipart field carrying the upload. Default: [`UploadField::File`].
    pub upload_field: UploadField,

    /// Strict JSON or raw text responses. Default: [`ResponseMode::StrictJson`].
    pub response_mode: ResponseMode,

    /// Upper bound on generated tokens; `None` leaves generation unbounded.
    /// Default: `Some(2048)`.
    pub max_new_tokens: Option<usize>,

    /// Longest side of the rendered page image in pixels. Default: 1024.
    ///
    /// olmOCR was trained on 1024 px renders; larger images cost more vision
    /// tokens without improving accuracy.
    pub target_longest_image_dim: u32,

    /// Character budget for the anchor text. Default: 4000.
    pub anchor_text_length: usize,

    /// Anchor text extraction engine. Default: [`AnchorEngine::PdfReport`].
    pub anchor_engine: AnchorEngine,

    /// Directory for transient upload files. `None` uses the system temp dir.
    pub upload_dir: Option<PathBuf>,

    /// Maximum accepted request body in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Model identifier, e.g. "allenai/olmOCR-7B-0225-preview".
    pub model: Option<String>,

    /// Model provider name (e.g. "openai", "ollama", "vllm").
    pub provider_name: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            upload_field: UploadField::default(),
            response_mode: ResponseMode::default(),
            max_new_tokens: Some(2048),
            target_longest_image_dim: 1024,
            anchor_text_length: 4000,
            anchor_engine: AnchorEngine::default(),
            upload_dir: None,
            max_upload_bytes: 50 * 1024 * 1024,
            model: None,
            provider_name: None,
        }
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory where uploads are written for the duration of a request.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    pub fn allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.allowed_origin = origin.into();
        self
    }

    pub fn upload_field(mut self, field: UploadField) -> Self {
        self.config.upload_field = field;
        self
    }

    pub fn response_mode(mut self, mode: ResponseMode) -> Self {
        self.config.response_mode = mode;
        self
    }

    pub fn max_new_tokens(mut self, n: Option<usize>) -> Self {
        self.config.max_new_tokens = n;
        self
    }

    pub fn target_longest_image_dim(mut self, px: u32) -> Self {
        self.config.target_longest_image_dim = px.clamp(MIN_TARGET_DIM, MAX_TARGET_DIM);
        self
    }

    pub fn anchor_text_length(mut self, chars: usize) -> Self {
        self.config.anchor_text_length = chars;
        self
    }

    pub fn anchor_engine(mut self, engine: AnchorEngine) -> Self {
        self.config.anchor_engine = engine;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.allowed_origin.trim().is_empty() {
            return Err(OcrError::InvalidConfig(
                "allowed origin must not be empty".into(),
            ));
        }
        if axum::http::HeaderValue::from_str(c.allowed_origin.trim()).is_err() {
            return Err(OcrError::InvalidConfig(format!(
                "allowed origin '{}' is not a valid header value",
                c.allowed_origin
            )));
        }
        if c.max_new_tokens == Some(0) {
            return Err(OcrError::InvalidConfig(
                "max_new_tokens must be ≥ 1 (use None for unbounded)".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(OcrError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the decoded model output is returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Parse the output as JSON and return it; unparseable output is a 500. (default)
    #[default]
    StrictJson,
    /// Return `{"text": [..]}` with the decoded output, never validating it.
    RawText,
}

/// Name of the multipart field that carries the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadField {
    /// `file` (default)
    #[default]
    File,
    /// `pdf`
    Pdf,
}

impl UploadField {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadField::File => "file",
            UploadField::Pdf => "pdf",
        }
    }
}

/// Engine used to extract anchor text from a PDF page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorEngine {
    /// Positioned text runs and image boxes, linearised with coordinates. (default)
    #[default]
    PdfReport,
    /// The page's plain text layer.
    PlainText,
}
