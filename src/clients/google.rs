use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ChatClient, ChatMessage, ChatRequest, ContentPart, MessageContent, Role, http_client, read_json};
use crate::constants::{DEFAULT_MIME_TYPE, NO_IMAGE_RETURNED, REFUSAL_TEXT_LIMIT};
use crate::error::MemeError;
use crate::images::split_data_uri;

/// Google Generative Language `generateContent` API.
#[derive(Clone, Debug)]
pub struct GoogleClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleClient {
    /// Fails when no API key is available.
    pub fn new(api_key: Option<&str>, base_url: &str, timeout: Duration) -> Result<Self, MemeError> {
        let api_key = api_key.map(str::trim).unwrap_or_default();
        if api_key.is_empty() {
            return Err(MemeError::Config(
                "Google API key not provided. Set GOOGLE_API_KEY.".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, request: &ChatRequest) -> Result<Value, MemeError> {
        let url = format!(
            "{}/{}:generateContent",
            self.base_url,
            normalize_model(&request.model)
        );
        debug!("POST {} messages={}", url, request.messages.len());
        let mut body =
            to_google_payload(&request.messages, request.temperature, request.max_tokens);
        if !request.modalities.is_empty() {
            body["generationConfig"]["responseModalities"] = request
                .modalities
                .iter()
                .map(|modality| Value::String(modality.to_ascii_uppercase()))
                .collect();
        }
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        read_json(response, "Google").await
    }
}

#[async_trait]
impl ChatClient for GoogleClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, MemeError> {
        let data = self.post(request).await?;
        Ok(first_text(&data))
    }

    async fn chat_raw(&self, request: &ChatRequest) -> Result<Value, MemeError> {
        let data = self.post(request).await?;
        Ok(to_canonical(&data))
    }
}

/// Maps OpenRouter-style ids onto Google's, eg
/// `google/gemini-2.5-flash-image-preview:free` -> `models/gemini-2.5-flash-image-preview`.
pub(crate) fn normalize_model(model: &str) -> String {
    let model = model.split_once('/').map_or(model, |(_, rest)| rest);
    let model = model.split_once(':').map_or(model, |(name, _)| name);
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Converts the chat message list into a `generateContent` body.
pub(crate) fn to_google_payload(messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Value {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for message in messages {
        if message.role == Role::System {
            system_instruction = Some(json!({
                "role": "system",
                "parts": [{"text": message.text()}]
            }));
            continue;
        }

        let mut parts = Vec::new();
        match &message.content {
            MessageContent::Text(text) => parts.push(json!({"text": text})),
            MessageContent::Parts(items) => {
                for item in items {
                    match item {
                        ContentPart::Text { text } => parts.push(json!({"text": text})),
                        ContentPart::ImageUrl { image_url } => {
                            if let Some((mime, data)) = split_data_uri(&image_url.url)
                                && !data.is_empty()
                            {
                                parts.push(json!({
                                    "inline_data": {"mime_type": mime, "data": data}
                                }));
                            }
                        }
                    }
                }
            }
        }
        if !parts.is_empty() {
            contents.push(json!({"role": "user", "parts": parts}));
        }
    }

    if contents.is_empty() {
        contents.push(json!({"role": "user", "parts": [{"text": ""}]}));
    }

    let mut payload = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": max_tokens,
        }
    });
    if let (Some(instruction), Some(object)) = (system_instruction, payload.as_object_mut()) {
        object.insert("systemInstruction".to_string(), instruction);
    }
    payload
}

fn first_candidate_parts(data: &Value) -> &[Value] {
    data.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// First text part of the first candidate, trimmed.
pub(crate) fn first_text(data: &Value) -> String {
    first_candidate_parts(data)
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

const FILTERED_FINISH_REASONS: [&str; 5] =
    ["safety", "blocked", "recitation", "prohibited_content", "blocklist"];
const REFUSAL_FINISH_REASONS: [&str; 4] = ["prohibited_content", "blocked", "safety", "blocklist"];

fn str_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|text| !text.is_empty())
}

/// Image entry for an inline or file part, in the canonical shape.
fn image_entry(part: &Value) -> Option<Value> {
    if let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data"))
        && let Some(data) = str_at(inline, &["data"])
    {
        let mime = str_at(inline, &["mimeType", "mime_type"]).unwrap_or(DEFAULT_MIME_TYPE);
        return Some(json!({
            "type": "image_url",
            "image_url": {"url": format!("data:{mime};base64,{data}")}
        }));
    }
    if let Some(file) = part.get("fileData").or_else(|| part.get("file_data"))
        && let Some(uri) = str_at(file, &["fileUri", "file_uri"])
    {
        return Some(json!({"type": "image_url", "image_url": {"url": uri}}));
    }
    None
}

/// Translates a Google response into `choices[0].message.{content, images, refusal}`.
pub(crate) fn to_canonical(data: &Value) -> Value {
    let mut refusal: Option<String> = None;
    let mut finish_reason = "stop".to_string();

    let feedback = data
        .get("promptFeedback")
        .or_else(|| data.get("prompt_feedback"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    if let Some(block_reason) = str_at(&feedback, &["blockReason", "block_reason"]) {
        refusal = Some(block_reason.to_string());
        finish_reason = "content_filter".to_string();
    }

    let mut images = Vec::new();
    let mut texts: Vec<String> = Vec::new();

    if let Some(candidate) = data.pointer("/candidates/0") {
        if let Some(reason) = str_at(candidate, &["finishReason", "finish_reason"]) {
            let reason = reason.to_ascii_lowercase();
            finish_reason = if FILTERED_FINISH_REASONS.contains(&reason.as_str()) {
                "content_filter".to_string()
            } else if reason == "length" || reason == "max_tokens" {
                "length".to_string()
            } else {
                reason.clone()
            };
            if refusal.is_none() && REFUSAL_FINISH_REASONS.contains(&reason.as_str()) {
                refusal = Some(reason);
            }
        }

        for part in first_candidate_parts(data) {
            if let Some(entry) = image_entry(part) {
                images.push(entry);
                continue;
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                let text = text.trim();
                if !text.is_empty() {
                    texts.push(text.to_string());
                }
            }
        }
    }

    if images.is_empty() {
        let block_message = str_at(&feedback, &["blockReasonMessage", "block_reason_message"])
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if !block_message.is_empty() {
            texts.push(block_message.clone());
        }
        if refusal.is_none() && !texts.is_empty() {
            refusal = Some(texts.join(" ").chars().take(REFUSAL_TEXT_LIMIT).collect());
        }
        if finish_reason == "stop" && (refusal.is_some() || !block_message.is_empty()) {
            finish_reason = "content_filter".to_string();
        }
        if refusal.is_none() {
            refusal = Some(NO_IMAGE_RETURNED.to_string());
        }
    }

    json!({
        "choices": [{
            "finish_reason": finish_reason,
            "message": {
                "content": "",
                "images": images,
                "refusal": refusal,
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ids_are_normalized() {
        assert_eq!(
            normalize_model("google/gemini-2.5-flash-image-preview:free"),
            "models/gemini-2.5-flash-image-preview"
        );
        assert_eq!(normalize_model("gemini-2.5-flash"), "models/gemini-2.5-flash");
        assert_eq!(
            normalize_model("models/gemini-2.5-flash"),
            "models/gemini-2.5-flash"
        );
    }

    #[test]
    fn payload_moves_system_and_inlines_images() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user_parts(vec![
                ContentPart::text("edit this"),
                ContentPart::image("data:image/jpeg;base64,QUJD"),
                ContentPart::image("https://example.org/not-inlined.png"),
            ]),
        ];
        let payload = to_google_payload(&messages, 0.5, 256);
        assert_eq!(
            payload["systemInstruction"],
            json!({"role": "system", "parts": [{"text": "be brief"}]})
        );
        assert_eq!(
            payload["contents"],
            json!([{
                "role": "user",
                "parts": [
                    {"text": "edit this"},
                    {"inline_data": {"mime_type": "image/jpeg", "data": "QUJD"}}
                ]
            }])
        );
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], json!(256));
    }

    #[test]
    fn empty_conversation_gets_placeholder_content() {
        let payload = to_google_payload(&[ChatMessage::system("only rules")], 0.2, 10);
        assert_eq!(
            payload["contents"],
            json!([{"role": "user", "parts": [{"text": ""}]}])
        );
    }

    #[test]
    fn first_text_is_trimmed() {
        let data = json!({"candidates": [{"content": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "AAAA"}},
            {"text": "  the answer \n"}
        ]}}]});
        assert_eq!(first_text(&data), "the answer");
        assert_eq!(first_text(&json!({})), "");
    }

    #[test]
    fn inline_parts_become_data_uri_images() {
        let camel = json!({"candidates": [{"finishReason": "STOP", "content": {"parts": [
            {"inlineData": {"mimeType": "image/webp", "data": "UklGRg=="}}
        ]}}]});
        let snake = json!({"candidates": [{"finish_reason": "STOP", "content": {"parts": [
            {"inline_data": {"mime_type": "image/webp", "data": "UklGRg=="}}
        ]}}]});
        for data in [camel, snake] {
            let canonical = to_canonical(&data);
            let choice = &canonical["choices"][0];
            assert_eq!(choice["finish_reason"], "stop");
            assert_eq!(choice["message"]["refusal"], Value::Null);
            assert_eq!(
                choice["message"]["images"][0]["image_url"]["url"],
                "data:image/webp;base64,UklGRg=="
            );
        }
    }

    #[test]
    fn prompt_block_reason_is_a_refusal() {
        let canonical = to_canonical(&json!({
            "promptFeedback": {"blockReason": "PROHIBITED_CONTENT", "blockReasonMessage": "nope"}
        }));
        let choice = &canonical["choices"][0];
        assert_eq!(choice["finish_reason"], "content_filter");
        assert_eq!(choice["message"]["refusal"], "PROHIBITED_CONTENT");
        assert_eq!(choice["message"]["images"], json!([]));
    }

    #[test]
    fn candidate_safety_finish_is_a_refusal() {
        let canonical = to_canonical(&json!({"candidates": [{"finishReason": "SAFETY"}]}));
        assert_eq!(canonical["choices"][0]["finish_reason"], "content_filter");
        assert_eq!(canonical["choices"][0]["message"]["refusal"], "safety");
    }

    #[test]
    fn text_only_answer_explains_refusal() {
        let long = "x".repeat(800);
        let canonical = to_canonical(&json!({"candidates": [{"finishReason": "STOP", "content": {"parts": [
            {"text": "I can't help with"},
            {"text": long}
        ]}}]}));
        let choice = &canonical["choices"][0];
        assert_eq!(choice["finish_reason"], "content_filter");
        let refusal = choice["message"]["refusal"].as_str().expect("refusal text");
        assert!(refusal.starts_with("I can't help with x"));
        assert_eq!(refusal.chars().count(), REFUSAL_TEXT_LIMIT);
    }

    #[test]
    fn empty_answer_defaults_to_marker() {
        let canonical = to_canonical(&json!({"candidates": [{"finishReason": "MAX_TOKENS"}]}));
        let choice = &canonical["choices"][0];
        assert_eq!(choice["finish_reason"], "length");
        assert_eq!(choice["message"]["refusal"], NO_IMAGE_RETURNED);
    }

    #[test]
    fn file_parts_become_url_images() {
        let canonical = to_canonical(&json!({"candidates": [{"content": {"parts": [
            {"fileData": {"mimeType": "image/png", "fileUri": "https://example.org/out.png"}}
        ]}}]}));
        assert_eq!(
            canonical["choices"][0]["message"]["images"][0]["image_url"]["url"],
            "https://example.org/out.png"
        );
    }
}
