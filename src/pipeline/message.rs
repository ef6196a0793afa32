//! Prompt assembly: one chat message holding the instruction and the page image.
//!
//! The shape mirrors the OpenAI chat-completions content-part format so that
//! the same message can be logged, replayed against an OpenAI-compatible
//! endpoint, or handed to an `edgequake-llm` provider.

use crate::pipeline::render::RenderedPage;
use crate::prompts::build_finetuning_prompt;
use serde::{Deserialize, Serialize};

/// A single multimodal chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
    /// Base64 payload and MIME type of the image, kept alongside the data URI
    /// so providers that take raw base64 do not have to re-parse it.
    #[serde(skip)]
    pub image: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl OcrMessage {
    /// Build the user message for one page from its anchor text and image.
    pub fn for_page(anchor_text: &str, page: &RenderedPage) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text {
                    text: build_finetuning_prompt(anchor_text),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: page.data_uri(),
                    },
                },
            ],
            image: Some((page.base64.clone(), page.mime_type.to_string())),
        }
    }

    /// The instruction text (first text part).
    pub fn prompt(&self) -> &str {
        self.content
            .iter()
            .find_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .unwrap_or_default()
    }
}
