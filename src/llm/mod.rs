// Hosted language model access
// Chat completion, image captioning and the message types they share

pub mod caption;
pub mod groq;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use caption::{CAPTION_INSTRUCTION, Caption, Captioner};
pub use groq::GroqClient;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// An OpenAI-style chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    /// `https://` URL or `data:<mime>;base64,<data>` URL
    pub url: String,
}

impl ChatMessage {
    #[inline]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user message carrying an instruction and one image
    #[inline]
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

/// A hosted model that turns a conversation into one text completion.
/// Implementations make exactly one remote attempt per call.
pub trait ChatModel: Send + Sync {
    fn complete(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String>;

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}
