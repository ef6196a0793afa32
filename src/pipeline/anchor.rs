//! Anchor text: positional hints pulled from the PDF's own text layer.
//!
//! The model sees the rendered page, but pixels alone lose exact spelling of
//! small print, numbers and names. Anchor text gives it the embedded text runs
//! together with their page coordinates, so it can cross-check what it reads.
//!
//! ## Report format
//!
//! ```text
//! Page dimensions: 612.0x792.0
//! [Image 72x500 to 540x700]
//! [72x720]Quarterly Report
//! [72x690]Revenue grew 12 % year over year
//! ```
//!
//! ## Budget
//!
//! The output never exceeds the configured character budget. When the full
//! report does not fit, the elements at the page extremes (leftmost,
//! rightmost, lowest, highest) are kept first because they anchor the
//! page layout, then the rest are added in document order until the budget
//! is spent.

use crate::config::AnchorEngine;
use crate::error::OcrError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest single text run kept before it is shortened to `head ... tail`.
const MAX_TEXT_ELEMENT_LENGTH: usize = 250;

/// Below this budget only the page-dimension header is emitted.
const MIN_ELEMENT_BUDGET: usize = 20;

/// Gap in points under which two image boxes count as one image.
const IMAGE_MERGE_TOLERANCE: f32 = 0.5;

/// A text run with its origin in PDF user space (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// An axis-aligned box in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    fn touches(&self, other: &BoundingBox, tolerance: f32) -> bool {
        !(self.x1 < other.x0 - tolerance
            || other.x1 < self.x0 - tolerance
            || self.y1 < other.y0 - tolerance
            || other.y1 < self.y0 - tolerance)
    }

    fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Everything the report engine knows about one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageReport {
    pub width: f32,
    pub height: f32,
    pub text_elements: Vec<TextElement>,
    pub image_elements: Vec<BoundingBox>,
}

/// Extract anchor text for page 1 of the PDF at `pdf_path`.
pub async fn extract_anchor_text(
    pdf_path: &Path,
    engine: AnchorEngine,
    max_chars: usize,
) -> Result<String, OcrError> {
    let path: PathBuf = pdf_path.to_path_buf();

    let anchor = tokio::task::spawn_blocking(move || match engine {
        AnchorEngine::PdfReport => {
            read_page_report(&path).map(|report| linearize_report(&report, max_chars))
        }
        AnchorEngine::PlainText => {
            read_plain_text(&path).map(|text| truncate_chars(&text, max_chars))
        }
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Anchor task panicked: {e}")))??;

    debug!(
        "Anchor text ({:?}): {} chars (budget {})",
        engine,
        anchor.chars().count(),
        max_chars
    );
    Ok(anchor)
}

/// Collect text runs and image boxes from page 1.
fn read_page_report(pdf_path: &Path) -> Result<PageReport, OcrError> {
    let pdfium = crate::pipeline::render::bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| OcrError::AnchorText(format!("cannot open PDF: {e:?}")))?;
    let page = document
        .pages()
        .get(0)
        .map_err(|e| OcrError::AnchorText(format!("cannot load page 1: {e:?}")))?;

    let mut report = PageReport {
        width: page.width().value,
        height: page.height().value,
        ..Default::default()
    };

    let text = page
        .text()
        .map_err(|e| OcrError::AnchorText(format!("cannot read text layer: {e:?}")))?;
    for segment in text.segments().iter() {
        let bounds = segment.bounds();
        report.text_elements.push(TextElement {
            text: segment.text(),
            x: bounds.left().value,
            y: bounds.bottom().value,
        });
    }

    for object in page.objects().iter() {
        if object.as_image_object().is_none() {
            continue;
        }
        if let Ok(bounds) = object.bounds() {
            report.image_elements.push(BoundingBox {
                x0: bounds.left().value,
                y0: bounds.bottom().value,
                x1: bounds.right().value,
                y1: bounds.top().value,
            });
        }
    }

    Ok(report)
}

fn read_plain_text(pdf_path: &Path) -> Result<String, OcrError> {
    let pdfium = crate::pipeline::render::bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| OcrError::AnchorText(format!("cannot open PDF: {e:?}")))?;
    let page = document
        .pages()
        .get(0)
        .map_err(|e| OcrError::AnchorText(format!("cannot load page 1: {e:?}")))?;
    page.text()
        .map(|t| t.all())
        .map_err(|e| OcrError::AnchorText(format!("cannot read text layer: {e:?}")))
}

// ── Linearisation ────────────────────────────────────────────────────────

enum Element {
    Image(BoundingBox),
    Text(TextElement),
}

struct Rendered {
    position: (f32, f32),
    line: String,
}

/// Render a page report as anchor text no longer than `max_chars`.
pub fn linearize_report(report: &PageReport, max_chars: usize) -> String {
    let mut result = format!(
        "Page dimensions: {:.1}x{:.1}\n",
        report.width, report.height
    );
    if max_chars < MIN_ELEMENT_BUDGET {
        return truncate_chars(&result, max_chars);
    }

    let images = merge_image_elements(&report.image_elements);
    let texts: Vec<&TextElement> = report
        .text_elements
        .iter()
        .filter(|t| !t.text.trim().is_empty())
        .collect();

    let mut elements: Vec<(Element, Rendered)> = Vec::with_capacity(images.len() + texts.len());
    for b in &images {
        let line = format!(
            "[Image {:.0}x{:.0} to {:.0}x{:.0}]\n",
            b.x0, b.y0, b.x1, b.y1
        );
        elements.push((
            Element::Image(*b),
            Rendered {
                position: (b.x0, b.y0),
                line,
            },
        ));
    }
    for t in &texts {
        let line = format!("[{:.0}x{:.0}]{}\n", t.x, t.y, cleanup_element_text(&t.text));
        elements.push((
            Element::Text((*t).clone()),
            Rendered {
                position: (t.x, t.y),
                line,
            },
        ));
    }

    let header_len = result.chars().count();
    let total: usize = header_len
        + elements
            .iter()
            .map(|(_, r)| r.line.chars().count())
            .sum::<usize>();

    if total <= max_chars {
        for (_, r) in &elements {
            result.push_str(&r.line);
        }
        return result;
    }

    // Over budget: edge elements first, then the remainder in document order.
    let edges = edge_indices(&elements);
    let mut selected = vec![false; elements.len()];
    let mut current = header_len;

    let order = edges
        .iter()
        .copied()
        .chain((0..elements.len()).filter(|i| !edges.contains(i)));
    for i in order {
        let len = elements[i].1.line.chars().count();
        if current + len > max_chars {
            if edges.contains(&i) {
                continue;
            }
            break;
        }
        selected[i] = true;
        current += len;
    }

    let mut chosen: Vec<&Rendered> = elements
        .iter()
        .zip(&selected)
        .filter(|(_, keep)| **keep)
        .map(|((_, r), _)| r)
        .collect();
    chosen.sort_by(|a, b| {
        a.position
            .0
            .total_cmp(&b.position.0)
            .then(a.position.1.total_cmp(&b.position.1))
    });

    for r in chosen {
        result.push_str(&r.line);
    }
    truncate_chars(&result, max_chars)
}

/// Indices of the elements at the page extremes, deduplicated.
fn edge_indices(elements: &[(Element, Rendered)]) -> Vec<usize> {
    let mut edges = Vec::new();
    let mut push = |idx: Option<usize>| {
        if let Some(i) = idx {
            if !edges.contains(&i) {
                edges.push(i);
            }
        }
    };

    let pick = |key: &dyn Fn(&Element) -> Option<f32>, want_max: bool| -> Option<usize> {
        elements
            .iter()
            .enumerate()
            .filter_map(|(i, (e, _))| key(e).map(|v| (i, v)))
            .reduce(|best, cur| {
                let better = if want_max { cur.1 > best.1 } else { cur.1 < best.1 };
                if better {
                    cur
                } else {
                    best
                }
            })
            .map(|(i, _)| i)
    };

    let image_x0 = |e: &Element| match e {
        Element::Image(b) => Some(b.x0),
        Element::Text(_) => None,
    };
    let image_x1 = |e: &Element| match e {
        Element::Image(b) => Some(b.x1),
        Element::Text(_) => None,
    };
    let image_y0 = |e: &Element| match e {
        Element::Image(b) => Some(b.y0),
        Element::Text(_) => None,
    };
    let image_y1 = |e: &Element| match e {
        Element::Image(b) => Some(b.y1),
        Element::Text(_) => None,
    };
    let text_x = |e: &Element| match e {
        Element::Text(t) => Some(t.x),
        Element::Image(_) => None,
    };
    let text_y = |e: &Element| match e {
        Element::Text(t) => Some(t.y),
        Element::Image(_) => None,
    };

    push(pick(&image_x0, false));
    push(pick(&image_x1, true));
    push(pick(&image_y0, false));
    push(pick(&image_y1, true));
    push(pick(&text_x, false));
    push(pick(&text_x, true));
    push(pick(&text_y, false));
    push(pick(&text_y, true));
    edges
}

/// Merge image boxes that overlap or touch, until no two boxes touch.
pub fn merge_image_elements(images: &[BoundingBox]) -> Vec<BoundingBox> {
    let mut merged: Vec<BoundingBox> = images.to_vec();
    loop {
        let mut changed = false;
        let mut out: Vec<BoundingBox> = Vec::with_capacity(merged.len());
        for b in merged {
            if let Some(existing) = out
                .iter_mut()
                .find(|o| o.touches(&b, IMAGE_MERGE_TOLERANCE))
            {
                *existing = existing.union(&b);
                changed = true;
            } else {
                out.push(b);
            }
        }
        merged = out;
        if !changed {
            return merged;
        }
    }
}

/// Trim, escape brackets and control whitespace, and cap very long runs.
fn cleanup_element_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.trim().chars() {
        match c {
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    cap_split_string(&escaped, MAX_TEXT_ELEMENT_LENGTH)
}

/// Shorten `text` to roughly `max_len` chars as `head ... tail`, cutting at spaces.
fn cap_split_string(text: &str, max_len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }
    let part = (max_len / 2).saturating_sub(3);

    let head_raw: String = chars[..part].iter().collect();
    let head = match head_raw.rsplit_once(' ') {
        Some((h, _)) if !h.is_empty() => h.to_string(),
        _ => head_raw.clone(),
    };

    let tail_raw: String = chars[chars.len() - part..].iter().collect();
    let tail = match tail_raw.split_once(' ') {
        Some((_, t)) if !t.is_empty() => t.to_string(),
        _ => tail_raw.clone(),
    };

    format!("{head} ... {tail}")
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
