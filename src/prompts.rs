//! Prompt templates for olmOCR-style page extraction.
//!
//! The wording matches the instruction the model was fine-tuned on and must
//! not change. The anchor text is the template's only input.

/// Anchor text used for raster uploads, which have no text layer to mine.
pub const IMAGE_ANCHOR_PLACEHOLDER: &str = "Image uploaded for OCR processing.";

/// Build the fine-tuning prompt for one page.
///
/// The anchor text is wrapped in `RAW_TEXT_START` / `RAW_TEXT_END` markers so
/// the model can tell extracted hints apart from the instruction.
pub fn build_finetuning_prompt(anchor_text: &str) -> String {
    format!(
        "Below is the image of one page of a document, as well as some raw textual content \
that was previously extracted for it. Just return the plain text representation of this \
document as if you were reading it naturally.\n\
Do not hallucinate.\n\
RAW_TEXT_START\n{anchor_text}\nRAW_TEXT_END"
    )
}
