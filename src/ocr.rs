//! The OCR pipeline for one document.
//!
//! [`run_ocr`] is the whole request lifecycle minus HTTP: persist the upload,
//! produce the page image and anchor text, build the message, call the model
//! and decode the answer. Each stage returns `Result<_, OcrError>` and the
//! first failure ends the request; there are no retries and no partial
//! results.

use crate::context::OcrContext;
use crate::error::OcrError;
use crate::pipeline::decode::{self, OcrOutput};
use crate::pipeline::intake::{DocumentKind, UploadedDocument};
use crate::pipeline::message::OcrMessage;
use crate::pipeline::{anchor, render};
use crate::prompts::IMAGE_ANCHOR_PLACEHOLDER;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Run OCR on one uploaded document.
///
/// The upload is written to a transient file that is deleted before this
/// function returns, on success and on every error path.
pub async fn run_ocr(ctx: &OcrContext, document: UploadedDocument) -> Result<OcrOutput, OcrError> {
    let total_start = Instant::now();
    let config = &ctx.config;
    info!(
        "OCR request: '{}' ({:?}, {} bytes)",
        document.filename,
        document.kind,
        document.bytes.len()
    );

    // ── Step 1: Persist upload ───────────────────────────────────────────
    let upload = document.persist(&config.upload_dir())?;

    // ── Step 2: Page image + anchor text ─────────────────────────────────
    let render_start = Instant::now();
    let (page, anchor_text) = match document.kind {
        DocumentKind::Pdf => {
            let page = render::render_pdf_page(upload.path(), config.target_longest_image_dim).await?;
            let anchor_text = anchor::extract_anchor_text(
                upload.path(),
                config.anchor_engine,
                config.anchor_text_length,
            )
            .await?;
            (page, anchor_text)
        }
        DocumentKind::Image(kind) => {
            let page =
                render::prepare_image(document.bytes, kind, config.target_longest_image_dim).await?;
            (page, IMAGE_ANCHOR_PLACEHOLDER.to_string())
        }
    };
    debug!(
        "Page ready: {}x{} {}, anchor {} chars, {}ms",
        page.width,
        page.height,
        page.mime_type,
        anchor_text.chars().count(),
        render_start.elapsed().as_millis()
    );

    // ── Step 3: Assemble prompt ──────────────────────────────────────────
    let message = OcrMessage::for_page(&anchor_text, &page);

    // ── Step 4: Inference ────────────────────────────────────────────────
    let llm_start = Instant::now();
    let generation = ctx.model.generate(&message, &ctx.sampling()).await?;
    debug!(
        "Model returned {} sequence(s) in {}ms",
        generation.sequences.len(),
        llm_start.elapsed().as_millis()
    );

    // ── Step 5: Decode ───────────────────────────────────────────────────
    let output = decode::decode(generation, message.prompt(), config.response_mode)?;

    drop(upload);
    info!("OCR complete in {}ms", total_start.elapsed().as_millis());
    Ok(output)
}

/// Run OCR on a local file, classified by its extension like an upload.
pub async fn ocr_file(ctx: &OcrContext, path: impl AsRef<Path>) -> Result<OcrOutput, OcrError> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = DocumentKind::from_filename(&filename)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| OcrError::ReadInput {
            path: path.display().to_string(),
            source,
        })?;

    run_ocr(
        ctx,
        UploadedDocument {
            filename,
            kind,
            bytes,
        },
    )
    .await
}
