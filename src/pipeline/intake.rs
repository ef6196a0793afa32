//! File intake: classify an upload and persist it for the request lifetime.
//!
//! ## Why write to disk at all?
//!
//! pdfium opens documents from a file-system path. Writing the upload to a
//! [`tempfile::NamedTempFile`] gives it one, and the returned
//! [`TransientUpload`] guard deletes the file when dropped, whether the
//! request succeeds, fails with an error, or unwinds from a panic.

use crate::error::OcrError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// The kind of document, inferred from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image(ImageKind),
}

/// Raster formats accepted as direct image uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn format(self) -> image::ImageFormat {
        match self {
            ImageKind::Png => image::ImageFormat::Png,
            ImageKind::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl DocumentKind {
    /// Classify a filename by its extension (the text after the last `.`).
    ///
    /// A name without a dot is read whole, so `notes` is rejected while a
    /// bare `pdf` is accepted.
    pub fn from_filename(filename: &str) -> Result<Self, OcrError> {
        let extension = filename
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match extension.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "png" => Ok(DocumentKind::Image(ImageKind::Png)),
            "jpg" | "jpeg" => Ok(DocumentKind::Image(ImageKind::Jpeg)),
            _ => Err(OcrError::UnsupportedFileType { extension }),
        }
    }

    /// Extension used for the transient file.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image(ImageKind::Png) => "png",
            DocumentKind::Image(ImageKind::Jpeg) => "jpg",
        }
    }
}

/// One uploaded file, held in memory for the duration of a request.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    /// Validate the filename and wrap the bytes.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, OcrError> {
        let filename = filename.into();
        let kind = DocumentKind::from_filename(&filename)?;
        Ok(Self {
            filename,
            kind,
            bytes,
        })
    }

    /// Write the bytes to a uniquely named file inside `dir`.
    pub fn persist(&self, dir: &Path) -> Result<TransientUpload, OcrError> {
        let suffix = format!(".{}", self.kind.extension());
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(dir)
            .map_err(OcrError::Persist)?;
        file.write_all(&self.bytes).map_err(OcrError::Persist)?;
        file.flush().map_err(OcrError::Persist)?;

        debug!(
            "Persisted '{}' ({} bytes) → {}",
            self.filename,
            self.bytes.len(),
            file.path().display()
        );
        Ok(TransientUpload { file })
    }
}

/// An upload written to disk. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct TransientUpload {
    file: NamedTempFile,
}

impl TransientUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
