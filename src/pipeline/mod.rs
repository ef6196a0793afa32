//! Pipeline stages for single-page OCR.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without the others and without a live model.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ render ──▶ anchor ──▶ message ──▶ inference ──▶ decode
//! (upload)   (pdfium)   (hints)    (prompt)    (VLM)         (JSON)
//! ```
//!
//! 1. [`intake`]    classify the upload and persist it for the request lifetime
//! 2. [`render`]    rasterise page 1 (or bound an image upload); uses [`encode`]
//! 3. [`anchor`]    extract positional text hints from the PDF text layer
//! 4. [`message`]   build the chat message: instruction + data-URI image
//! 5. [`inference`] call the vision model with fixed sampling parameters
//! 6. [`decode`]    strip the prompt echo and parse (or pass through) the output

pub mod anchor;
pub mod decode;
pub mod encode;
pub mod inference;
pub mod intake;
pub mod message;
pub mod render;
