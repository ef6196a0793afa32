//! # edgequake-ocr
//!
//! An HTTP OCR service: upload a PDF or an image, get back the structured
//! JSON that an olmOCR-style Vision Language Model reads off the page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! multipart upload
//!  │
//!  ├─ 1. Intake    validate extension, persist to a transient file
//!  ├─ 2. Render    PDF page 1 via pdfium, or bound an image upload
//!  ├─ 3. Anchor    positional text hints from the PDF text layer
//!  ├─ 4. Prompt    olmOCR instruction + data-URI image
//!  ├─ 5. VLM       one generation, temperature 0.8
//!  └─ 6. Decode    strict JSON, or raw `{"text": [..]}`
//! ```
//!
//! Only the first page of a PDF is processed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{serve, OcrConfig, OcrContext};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from EDGEQUAKE_LLM_PROVIDER / OPENAI_API_KEY / …
//!     let config = OcrConfig::builder().build()?;
//!     let addr = config.bind_address;
//!     let ctx = Arc::new(OcrContext::from_config(config)?);
//!     serve(ctx, addr).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-server` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod ocr;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnchorEngine, OcrConfig, OcrConfigBuilder, ResponseMode, UploadField};
pub use context::OcrContext;
pub use error::{ErrorKind, OcrError};
pub use ocr::{ocr_file, run_ocr};
pub use pipeline::decode::OcrOutput;
pub use pipeline::inference::{Generation, LlmVisionModel, SamplingParams, VisionModel};
pub use pipeline::intake::UploadedDocument;
pub use pipeline::message::OcrMessage;
pub use server::{router, serve};
