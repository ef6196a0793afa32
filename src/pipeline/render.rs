//! Page normalisation: turn an upload into one bounded image for the model.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to drive from async contexts. Rendering and image decoding are CPU-bound,
//! so both run on Tokio's blocking pool to keep the reactor responsive while
//! other requests are in flight.
//!
//! ## Why cap the longest side?
//!
//! The vision encoder's token count grows with pixel area, and olmOCR was
//! trained on 1024 px renders. The cap is applied to whichever side is longer
//! so portrait and landscape pages get the same treatment.

use crate::error::OcrError;
use crate::pipeline::encode;
use crate::pipeline::intake::ImageKind;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A single page image, base64-encoded and ready to embed in a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub base64: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl RenderedPage {
    pub fn data_uri(&self) -> String {
        encode::data_uri(self.mime_type, &self.base64)
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Bind to libpdfium.
///
/// `PDFIUM_LIB_PATH` wins when set; otherwise a library next to the working
/// directory is tried before the system-wide one.
pub fn bind_pdfium() -> Result<Pdfium, OcrError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        return Pdfium::bind_to_library(&path)
            .map(Pdfium::new)
            .map_err(|e| OcrError::PdfiumBindingFailed(format!("'{path}': {e}")));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| OcrError::PdfiumBindingFailed(e.to_string()))
}

/// Verify once at startup that pdfium can be loaded.
pub fn check_pdfium() -> Result<(), OcrError> {
    bind_pdfium().map(|_| ())
}

/// Render the first page of a PDF to a PNG whose longest side is at most
/// `target_longest_dim` pixels.
pub async fn render_pdf_page(
    pdf_path: &Path,
    target_longest_dim: u32,
) -> Result<RenderedPage, OcrError> {
    let path: PathBuf = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || render_first_page_blocking(&path, target_longest_dim))
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {e}")))?
}

/// Blocking implementation of first-page rendering.
fn render_first_page_blocking(
    pdf_path: &Path,
    target_longest_dim: u32,
) -> Result<RenderedPage, OcrError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| OcrError::Render(format!("cannot open PDF: {e:?}")))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(OcrError::Render("PDF has no pages".into()));
    }
    if pages.len() > 1 {
        info!("PDF has {} pages; only page 1 is processed", pages.len());
    }

    let page = pages
        .get(0)
        .map_err(|e| OcrError::Render(format!("cannot load page 1: {e:?}")))?;

    let dim = i32::try_from(target_longest_dim).unwrap_or(i32::MAX);
    let render_config = if page.width().value >= page.height().value {
        PdfRenderConfig::new()
            .set_target_width(dim)
            .set_maximum_height(dim)
    } else {
        PdfRenderConfig::new()
            .set_target_height(dim)
            .set_maximum_width(dim)
    };

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| OcrError::Render(format!("rasterisation failed: {e:?}")))?;

    let image = bound_image(bitmap.as_image(), target_longest_dim);
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());

    Ok(RenderedPage {
        base64: encode::encode_png(&image)?,
        mime_type: "image/png",
        width: image.width(),
        height: image.height(),
    })
}

/// Prepare a raster upload.
///
/// The format is sniffed from the bytes; `kind` (from the filename) is only
/// compared against it for logging. Images already within the bound are
/// passed through byte-for-byte with their detected MIME type; larger ones
/// are downscaled and re-encoded as PNG.
pub async fn prepare_image(
    bytes: Vec<u8>,
    kind: ImageKind,
    target_longest_dim: u32,
) -> Result<RenderedPage, OcrError> {
    tokio::task::spawn_blocking(move || prepare_image_blocking(&bytes, kind, target_longest_dim))
        .await
        .map_err(|e| OcrError::Internal(format!("Image task panicked: {e}")))?
}

fn prepare_image_blocking(
    bytes: &[u8],
    kind: ImageKind,
    target_longest_dim: u32,
) -> Result<RenderedPage, OcrError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    let format = reader.format();
    if format != Some(kind.format()) {
        debug!("Upload declared as {:?} but content is {:?}", kind, format);
    }

    let image = reader.decode()?;
    let (width, height) = (image.width(), image.height());

    if width.max(height) <= target_longest_dim {
        debug!("Image {}x{} within bound, passing through", width, height);
        return Ok(RenderedPage {
            base64: encode::encode_bytes(bytes),
            mime_type: format.map_or("image/png", |f| f.to_mime_type()),
            width,
            height,
        });
    }

    let image = bound_image(image, target_longest_dim);
    debug!(
        "Image {}x{} downscaled to {}x{}",
        width,
        height,
        image.width(),
        image.height()
    );
    Ok(RenderedPage {
        base64: encode::encode_png(&image)?,
        mime_type: "image/png",
        width: image.width(),
        height: image.height(),
    })
}

/// Downscale so the longest side is at most `max_dim`, preserving aspect ratio.
pub fn bound_image(image: DynamicImage, max_dim: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_dim {
        image
    } else {
        image.resize(max_dim, max_dim, FilterType::Lanczos3)
    }
}
