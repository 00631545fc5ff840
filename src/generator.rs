//! Runs the image model and pulls the picture out of its response.
//!
//! Providers are normalised into the canonical completion shape before
//! they reach this module, so extraction only ever reads
//! `choices[0].message.{images, refusal}` and `choices[0].finish_reason`.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::clients::{ChatClient, ChatMessage, ChatRequest, ContentPart};
use crate::constants::{DEFAULT_MIME_TYPE, GENERIC_REFUSAL};
use crate::error::MemeError;
use crate::images::{DownloadedImage, GeneratedImage, ImageDownloader, decode_data_uri};

#[derive(Debug, Default, Deserialize)]
struct ImageEntry {
    #[serde(default, alias = "b64")]
    b64_json: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    image_url: Option<ImageEntryUrl>,
    #[serde(default)]
    url: Option<String>,
}

/// `image_url` is usually `{"url": ..}` but some providers send a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageEntryUrl {
    Bare(String),
    Object {
        #[serde(default)]
        url: Option<String>,
    },
}

impl ImageEntryUrl {
    fn url(&self) -> Option<&str> {
        match self {
            Self::Bare(url) => Some(url),
            Self::Object { url } => url.as_deref(),
        }
    }
}

/// Where the first returned image lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageLocation {
    /// Bytes were returned inline
    Inline {
        /// MIME type of the bytes
        mime_type: String,
        /// Decoded payload
        content: Vec<u8>,
    },
    /// The image has to be fetched
    Remote(String),
}

fn is_policy_finish(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    reason == "content_filter"
        || ["safety", "policy", "prohibited", "blocked", "blocklist"]
            .iter()
            .any(|marker| reason.contains(marker))
}

/// Trimmed, non-empty text at `pointer`; non-string values are rendered as JSON.
fn text_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::Null => None,
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        other => Some(other.to_string()),
    }
}

/// Refusal explanation for a choice, if the choice is a refusal.
///
/// Reads the fields one by one so an odd message shape can't hide a refusal.
fn refusal_reason(choice: &Value) -> Option<String> {
    let refusal = text_at(choice, "/message/refusal");
    let finish = text_at(choice, "/finish_reason");
    let policy_finish = finish.as_deref().is_some_and(is_policy_finish);
    if refusal.is_none() && !policy_finish {
        return None;
    }

    let reasoning = text_at(choice, "/message/reasoning");
    let pieces: Vec<String> = [refusal, reasoning, finish].into_iter().flatten().collect();
    if pieces.is_empty() {
        Some(GENERIC_REFUSAL.to_string())
    } else {
        Some(pieces.join(" | "))
    }
}

fn locate(entry: &ImageEntry) -> Result<ImageLocation, MemeError> {
    if let Some(payload) = entry.b64_json.as_deref().filter(|p| !p.is_empty()) {
        let content = general_purpose::STANDARD.decode(payload.trim())?;
        return Ok(ImageLocation::Inline {
            mime_type: entry
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            content,
        });
    }
    let url = entry
        .image_url
        .as_ref()
        .and_then(ImageEntryUrl::url)
        .or(entry.url.as_deref())
        .map(str::trim)
        .unwrap_or_default();
    if url.starts_with("data:") {
        let (mime_type, content) = decode_data_uri(url)?;
        return Ok(ImageLocation::Inline { mime_type, content });
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(ImageLocation::Remote(url.to_string()));
    }
    Err(MemeError::Internal(
        "Image entry has no base64 payload, data URI or http(s) URL".to_string(),
    ))
}

fn locate_first_image(raw: &Value) -> Result<ImageLocation, MemeError> {
    let choice = raw
        .pointer("/choices/0")
        .ok_or_else(|| MemeError::Internal("Response has no choices".to_string()))?;
    if let Some(reason) = refusal_reason(choice) {
        return Err(MemeError::Refused(reason));
    }
    let first = choice
        .pointer("/message/images/0")
        .ok_or_else(|| MemeError::Internal("Response contains no images".to_string()))?;
    let entry: ImageEntry = serde_json::from_value(first.clone())
        .map_err(|err| MemeError::Internal(format!("Unparseable image entry: {err}")))?;
    locate(&entry)
}

/// Finds the first image in a canonical completion.
///
/// Refusals come back as [`MemeError::Refused`]; every other failure is an
/// [`MemeError::InvalidResponse`] carrying a redacted summary of `raw`.
pub fn extract_image(raw: &Value) -> Result<ImageLocation, MemeError> {
    locate_first_image(raw).map_err(|err| match err {
        MemeError::Refused(reason) => MemeError::Refused(reason),
        other => {
            let summary = summarize_response(raw);
            warn!("Image extraction failed: {} summary={}", other, summary);
            MemeError::InvalidResponse {
                message: format!("Failed to extract image: {other}"),
                summary,
            }
        }
    })
}

fn str_len(value: Option<&Value>) -> Option<usize> {
    value.and_then(Value::as_str).map(str::len)
}

fn keys_of(value: &Value) -> Vec<String> {
    value
        .as_object()
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default()
}

/// Describes a response by field presence and sizes, never payloads.
pub fn summarize_response(raw: &Value) -> String {
    let choices = raw.get("choices").and_then(Value::as_array);
    let first = choices.and_then(|choices| choices.first());
    let message = first.and_then(|choice| choice.get("message"));
    let images = message
        .and_then(|message| message.get("images"))
        .and_then(Value::as_array);

    let image_summaries: Vec<Value> = images
        .map(|images| {
            images
                .iter()
                .map(|image| {
                    json!({
                        "keys": keys_of(image),
                        "url_len": str_len(image.pointer("/image_url/url")).or(str_len(image.get("url"))),
                        "b64_len": str_len(image.get("b64_json")),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "top_level_keys": keys_of(raw),
        "choices": choices.map(Vec::len),
        "finish_reason": first.and_then(|choice| choice.get("finish_reason")).cloned(),
        "has_content": message.and_then(|m| m.get("content")).is_some_and(|c| !c.is_null()),
        "content_len": str_len(message.and_then(|m| m.get("content"))),
        "has_refusal": message.and_then(|m| m.get("refusal")).is_some_and(|r| !r.is_null()),
        "images": images.map(Vec::len),
        "image_entries": image_summaries,
    })
    .to_string()
}

/// Instruction plus images for the image model.
pub fn build_messages(
    prompt: &str,
    template_image: &DownloadedImage,
    reference_image: Option<&DownloadedImage>,
) -> Vec<ChatMessage> {
    let mut parts = vec![
        ContentPart::text(prompt),
        ContentPart::image(template_image.as_data_uri()),
    ];
    if let Some(reference) = reference_image {
        parts.push(ContentPart::image(reference.as_data_uri()));
    }
    vec![ChatMessage::user_parts(parts)]
}

/// Produces the final meme image.
#[derive(Clone)]
pub struct MemeImageGenerator {
    client: Arc<dyn ChatClient>,
    downloader: ImageDownloader,
    model: String,
}

impl MemeImageGenerator {
    /// Generator using `model` on `client`; remote results are fetched with `downloader`.
    pub fn new(
        client: Arc<dyn ChatClient>,
        downloader: ImageDownloader,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            downloader,
            model: model.into(),
        }
    }

    /// Asks for one image; refusals surface as [`MemeError::Refused`].
    pub async fn generate(
        &self,
        prompt: &str,
        template_image: &DownloadedImage,
        reference_image: Option<&DownloadedImage>,
    ) -> Result<GeneratedImage, MemeError> {
        let request = ChatRequest::new(
            &self.model,
            build_messages(prompt, template_image, reference_image),
        )
        .with_max_tokens(1024)
        .with_image_output();
        let raw = self.client.chat_raw(&request).await?;
        match extract_image(&raw)? {
            ImageLocation::Inline { mime_type, content } => Ok(GeneratedImage {
                source: None,
                content,
                mime_type,
            }),
            ImageLocation::Remote(url) => {
                let downloaded = self.downloader.download(&url).await.map_err(|err| {
                    MemeError::InvalidResponse {
                        message: format!("Failed to fetch generated image: {err}"),
                        summary: summarize_response(&raw),
                    }
                })?;
                Ok(downloaded.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::ScriptedClient;
    use std::time::Duration;

    const PIXEL: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn b64(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    fn template_image() -> DownloadedImage {
        DownloadedImage {
            url: "https://api.memegen.link/images/drake.png".to_string(),
            content: vec![1, 2, 3],
            mime_type: "image/png".to_string(),
        }
    }

    fn generator(client: Arc<ScriptedClient>) -> MemeImageGenerator {
        let downloader = ImageDownloader::new(Duration::from_secs(1)).expect("downloader");
        MemeImageGenerator::new(client, downloader, "image-model")
    }

    #[test]
    fn data_uri_image_is_decoded() {
        let raw = json!({"choices": [{"finish_reason": "stop", "message": {
            "content": "here you go",
            "images": [{"type": "image_url", "image_url": {"url": format!("data:image/webp;base64,{}", b64(PIXEL))}}]
        }}]});
        assert_eq!(
            extract_image(&raw).expect("image"),
            ImageLocation::Inline {
                mime_type: "image/webp".to_string(),
                content: PIXEL.to_vec()
            }
        );
    }

    #[test]
    fn inline_payload_wins_over_url() {
        let raw = json!({"choices": [{"message": {"images": [{
            "b64_json": b64(PIXEL),
            "image_url": {"url": "https://example.org/ignored.png"}
        }]}}]});
        assert_eq!(
            extract_image(&raw).expect("image"),
            ImageLocation::Inline {
                mime_type: DEFAULT_MIME_TYPE.to_string(),
                content: PIXEL.to_vec()
            }
        );
    }

    #[test]
    fn http_url_is_remote() {
        let raw = json!({"choices": [{"message": {"images": [
            {"image_url": {"url": "https://cdn.example.org/out.png"}}
        ]}}]});
        assert_eq!(
            extract_image(&raw).expect("image"),
            ImageLocation::Remote("https://cdn.example.org/out.png".to_string())
        );
    }

    #[test]
    fn refusal_field_is_a_refusal() {
        let raw = json!({"choices": [{"finish_reason": "stop", "message": {
            "refusal": "I can't edit photos of real people",
            "reasoning": "identity policy",
            "images": []
        }}]});
        match extract_image(&raw) {
            Err(MemeError::Refused(reason)) => assert_eq!(
                reason,
                "I can't edit photos of real people | identity policy | stop"
            ),
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn content_filter_without_text_still_refuses() {
        let raw = json!({"choices": [{"finish_reason": "content_filter", "message": {"content": null}}]});
        assert_eq!(
            extract_image(&raw),
            Err(MemeError::Refused("content_filter".to_string()))
        );
    }

    #[test]
    fn null_message_with_filter_finish_is_a_refusal() {
        let raw = json!({"choices": [{"finish_reason": "content_filter", "message": null}]});
        assert_eq!(
            extract_image(&raw),
            Err(MemeError::Refused("content_filter".to_string()))
        );
    }

    #[test]
    fn refusal_wins_over_odd_image_entries() {
        let raw = json!({"choices": [{"message": {
            "refusal": "blocked by policy",
            "images": [{"image_url": "https://x.org/a.png"}]
        }}]});
        assert_eq!(
            extract_image(&raw),
            Err(MemeError::Refused("blocked by policy".to_string()))
        );
    }

    #[test]
    fn bare_string_image_url_is_accepted() {
        let raw = json!({"choices": [{"finish_reason": "stop", "message": {
            "images": [{"image_url": "https://x.org/a.png"}]
        }}]});
        assert_eq!(
            extract_image(&raw),
            Ok(ImageLocation::Remote("https://x.org/a.png".to_string()))
        );
    }

    #[test]
    fn missing_images_carry_redacted_summary() {
        let secret = b64(&[7u8; 64]);
        let raw = json!({"choices": [{"finish_reason": "stop", "message": {
            "content": "just text",
            "images": [{"image_url": {"url": "ftp://nope"}, "b64_json": ""}]
        }}], "id": "gen-1"});
        match extract_image(&raw) {
            Err(MemeError::InvalidResponse { summary, .. }) => {
                assert!(summary.contains("\"images\":1"));
                assert!(summary.contains("\"url_len\":10"));
                assert!(!summary.contains("ftp://nope"));
            }
            other => panic!("expected invalid response, got {other:?}"),
        }

        let raw = json!({"choices": [{"message": {"content": secret}}]});
        match extract_image(&raw) {
            Err(MemeError::InvalidResponse { summary, message }) => {
                assert!(message.contains("no images"));
                assert!(!summary.contains(&secret));
                assert!(summary.contains("\"content_len\":88"));
            }
            other => panic!("expected invalid response, got {other:?}"),
        }

        assert!(matches!(
            extract_image(&json!({"choices": []})),
            Err(MemeError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn both_provider_shapes_yield_identical_images() {
        let openrouter = json!({"choices": [{"finish_reason": "stop", "message": {
            "content": "",
            "images": [{"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{}", b64(PIXEL))}}]
        }}]});
        let google = crate::clients::google::to_canonical(&json!({"candidates": [{
            "finishReason": "STOP",
            "content": {"parts": [
                {"text": "Here is your meme"},
                {"inlineData": {"mimeType": "image/png", "data": b64(PIXEL)}}
            ]}
        }]}));
        assert_eq!(
            extract_image(&openrouter).expect("openrouter image"),
            extract_image(&google).expect("google image")
        );
    }

    #[test]
    fn google_empty_answer_is_a_refusal() {
        let google = crate::clients::google::to_canonical(&json!({"candidates": [{"finishReason": "STOP"}]}));
        assert!(extract_image(&google).is_err_and(|err| err.is_refusal()));
    }

    #[tokio::test]
    async fn generate_sends_prompt_then_images() {
        let client = Arc::new(ScriptedClient::with_raw(vec![Ok(json!({"choices": [{"message": {
            "images": [{"image_url": {"url": format!("data:image/png;base64,{}", b64(PIXEL))}}]
        }}]}))]));
        let generated = generator(client.clone())
            .generate("add the caption", &template_image(), None)
            .await
            .expect("generated");
        assert_eq!(generated.content, PIXEL);
        assert_eq!(generated.source, None);

        let seen = client.seen();
        assert_eq!(seen[0].model, "image-model");
        assert_eq!(seen[0].modalities, vec!["image".to_string(), "text".to_string()]);
        assert_eq!(seen[0].messages[0].text(), "add the caption");
    }

    #[tokio::test]
    async fn generate_passes_refusals_through() {
        let client = Arc::new(ScriptedClient::with_raw(vec![Ok(json!({"choices": [{
            "finish_reason": "SAFETY", "message": {"refusal": "blocked"}
        }]}))]));
        let err = generator(client)
            .generate("add the caption", &template_image(), None)
            .await
            .expect_err("refused");
        assert_eq!(err, MemeError::Refused("blocked | SAFETY".to_string()));
    }
}
