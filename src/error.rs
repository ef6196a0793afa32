//! Error types for the edgequake-ocr service.
//!
//! Every pipeline stage returns `Result<_, OcrError>`. The variants are grouped
//! by the stage that produced them so a log line alone tells you where a
//! request died. [`OcrError::kind`] collapses the variants into three
//! client-facing categories:
//!
//! * [`ErrorKind::Input`]: the upload itself is unusable (no file, wrong
//!   extension). Maps to HTTP 400 (413 for an oversized body); retrying the
//!   same request cannot succeed.
//! * [`ErrorKind::Processing`]: rendering, anchor extraction, prompt assembly
//!   or the model call failed. Maps to HTTP 500 with the cause passed through.
//! * [`ErrorKind::OutputValidation`]: the model answered but the answer is not
//!   JSON (strict mode only). Maps to HTTP 500.
//!
//! The single HTTP translation point is the [`IntoResponse`] impl at the
//! bottom of this file.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// All errors produced while handling one OCR request.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// The multipart body did not contain the configured file field.
    #[error("No file uploaded. Expected a multipart field named '{field}'.")]
    MissingFile { field: String },

    /// The uploaded file's extension is not one of pdf, png, jpg, jpeg.
    #[error("Unsupported file type '{extension}'. Only PDF and image files are supported.")]
    UnsupportedFileType { extension: String },

    /// The file field appeared more than once.
    #[error("Only one file may be uploaded per request (field '{field}' was sent {count} times).")]
    MultipleFiles { field: String, count: usize },

    /// The request body is not a readable multipart form.
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    /// The request body exceeded the configured upload limit.
    #[error("Upload too large. The limit is {limit} bytes.")]
    PayloadTooLarge { limit: usize },

    /// A local input file could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadInput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the upload to its transient location failed.
    #[error("Failed to persist upload: {0}")]
    Persist(#[source] std::io::Error),

    // ── Render errors ─────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install libpdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The PDF could not be opened or the page could not be rasterised.
    #[error("Rendering failed: {0}")]
    Render(String),

    /// A raster upload could not be decoded or re-encoded.
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    // ── Anchor errors ─────────────────────────────────────────────────────
    /// Anchor text extraction failed.
    #[error("Anchor text extraction failed: {0}")]
    AnchorText(String),

    // ── Prompt errors ─────────────────────────────────────────────────────
    /// The chat message could not be assembled.
    #[error("Prompt assembly failed: {0}")]
    Prompt(String),

    // ── Inference errors ──────────────────────────────────────────────────
    /// The model provider is not initialised (missing API key etc.).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed.
    #[error("Model inference failed: {0}")]
    Inference(String),

    // ── Decode errors ─────────────────────────────────────────────────────
    /// Strict mode only: the decoded output is not valid JSON.
    #[error("OCR result is not a valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Client-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Processing,
    OutputValidation,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Input => StatusCode::BAD_REQUEST,
            ErrorKind::Processing | ErrorKind::OutputValidation => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Input => "input_error",
            ErrorKind::Processing => "processing_error",
            ErrorKind::OutputValidation => "output_validation_error",
        }
    }
}

impl OcrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrError::MissingFile { .. }
            | OcrError::UnsupportedFileType { .. }
            | OcrError::MultipleFiles { .. }
            | OcrError::MalformedUpload(_)
            | OcrError::PayloadTooLarge { .. }
            | OcrError::ReadInput { .. } => ErrorKind::Input,
            OcrError::InvalidJson(_) => ErrorKind::OutputValidation,
            OcrError::Persist(_)
            | OcrError::PdfiumBindingFailed(_)
            | OcrError::Render(_)
            | OcrError::Image(_)
            | OcrError::AnchorText(_)
            | OcrError::Prompt(_)
            | OcrError::ProviderNotConfigured { .. }
            | OcrError::Inference(_)
            | OcrError::InvalidConfig(_)
            | OcrError::Internal(_) => ErrorKind::Processing,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OcrError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => self.kind().status_code(),
        }
    }
}

impl IntoResponse for OcrError {
    /// Log the error and convert it into an Axum response.
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = self.to_string();
        match kind {
            ErrorKind::Input => tracing::warn!("Rejected upload: {message}"),
            ErrorKind::Processing | ErrorKind::OutputValidation => {
                tracing::error!("OCR request failed: {message}")
            }
        }
        let body = json!({
            "error": kind.as_str(),
            "message": message,
        });
        (self.status_code(), Json(body)).into_response()
    }
}
