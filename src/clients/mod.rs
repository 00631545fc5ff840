//! Chat-style model provider clients.
//!
//! Both providers accept the same OpenAI-style message list and return either
//! plain text (`chat`) or the canonical completion JSON (`chat_raw`), so the
//! rest of the crate never needs to know which one is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ProviderKind, ServiceConfig};
use crate::error::MemeError;

pub(crate) mod google;
mod openrouter;

pub use google::GoogleClient;
pub use openrouter::OpenRouterClient;

/// Who is speaking.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model
    System,
    /// The caller
    User,
    /// The model
    Assistant,
}

/// A URL reference inside an image part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Usually a `data:` URI
    pub url: String,
}

/// One piece of a multi-part message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
    /// An image, referenced by URL or data URI
    ImageUrl {
        /// The image reference
        image_url: ImageUrl,
    },
}

impl ContentPart {
    /// Text part helper.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Image part helper.
    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Message body: either a bare string or an ordered list of parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// A bare string
    Text(String),
    /// Ordered text and image parts
    Parts(Vec<ContentPart>),
}

/// A role-tagged chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker
    pub role: Role,
    /// Body
    pub content: MessageContent,
}

impl ChatMessage {
    /// System message with plain text content.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message with plain text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message made of several parts.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Concatenated text of the message, image parts skipped.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Everything a provider needs for one call.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    /// Provider model identifier
    pub model: String,
    /// Ordered conversation
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Response token budget
    pub max_tokens: u32,
    /// Output modalities to request, eg `["image", "text"]`; empty means text only
    pub modalities: Vec<String>,
}

impl ChatRequest {
    /// Builds a request with the default budget of 512 tokens at temperature 0.2.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.2,
            max_tokens: 512,
            modalities: Vec::new(),
        }
    }

    /// Overrides the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Overrides the token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Asks for image output alongside text.
    pub fn with_image_output(mut self) -> Self {
        self.modalities = vec!["image".to_string(), "text".to_string()];
        self
    }
}

/// A model provider.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the text of the first choice.
    async fn chat(&self, request: &ChatRequest) -> Result<String, MemeError>;

    /// Returns the whole response, in the canonical
    /// `choices[].message.{content, images, refusal}` shape.
    async fn chat_raw(&self, request: &ChatRequest) -> Result<Value, MemeError>;
}

/// Builds the reqwest client shared by the providers.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, MemeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| MemeError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Reads a response body, turning a non-2xx status into an error.
pub(crate) async fn read_json(response: reqwest::Response, label: &str) -> Result<Value, MemeError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(MemeError::Transport(format!(
            "{label} API error {status}: {}",
            String::from_utf8_lossy(&bytes)
        )));
    }
    serde_json::from_slice(&bytes).map_err(|err| MemeError::InvalidResponse {
        message: format!("Failed to parse {label} JSON: {err}"),
        summary: format!("body_len={}", bytes.len()),
    })
}

/// Picks the provider implementation named by the config.
pub fn build_chat_client(config: &ServiceConfig) -> Result<Arc<dyn ChatClient>, MemeError> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    match config.provider {
        ProviderKind::OpenRouter => Ok(Arc::new(OpenRouterClient::new(
            config.openrouter_api_key.as_deref(),
            crate::constants::OPENROUTER_BASE_URL,
            timeout,
        )?)),
        ProviderKind::Google => Ok(Arc::new(GoogleClient::new(
            config.google_api_key.as_deref(),
            crate::constants::GOOGLE_BASE_URL,
            timeout,
        )?)),
    }
}
