
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, ChatModel};

pub const CAPTION_INSTRUCTION: &str =
    "Describe this image, chart, or diagram found in a PDF document in detail for a search index.";

/// Prefix that marks caption chunks in the index
pub const CAPTION_PREFIX: &str = "[Image/Chart Description]: ";

/// A non-empty description of one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption(String);

impl Caption {
    /// `None` for blank text
    #[inline]
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Text stored for the caption's chunk
    #[inline]
    pub fn chunk_text(&self) -> String {
        format!("{}{}", CAPTION_PREFIX, self.0)
    }
}

impl fmt::Display for Caption {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Best-effort image describer backed by a vision model
#[derive(Clone)]
pub struct Captioner {
    model: Arc<dyn ChatModel>,
}

impl Captioner {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// One attempt; every failure is logged and becomes `None`.
    /// `mime_type` names the format of `image`, e.g. `image/png`
    #[inline]
    pub fn caption(&self, image: &[u8], mime_type: &str) -> Option<Caption> {
        if image.is_empty() {
            return None;
        }

        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(image));
        let message = ChatMessage::user_with_image(CAPTION_INSTRUCTION, data_url);

        debug!(
            "Captioning {} byte {} image with {}",
            image.len(),
            mime_type,
            self.model.model_name()
        );

        match self.model.complete(&[message], None) {
            Ok(text) => {
                let caption = Caption::new(text);
                if caption.is_none() {
                    warn!("Vision model returned an empty caption");
                }
                caption
            }
            Err(e) => {
                warn!("Image captioning failed: {:#}", e);
                None
            }
        }
    }
}

impl fmt::Debug for Captioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Captioner")
            .field("model", &self.model.model_name())
            .finish()
    }
}
