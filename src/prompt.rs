//! Builds the edit instruction handed to the image model.

use std::sync::Arc;

use tracing::debug;

use crate::clients::{ChatClient, ChatMessage, ChatRequest, ContentPart};
use crate::error::MemeError;
use crate::images::DownloadedImage;
use crate::templates::Template;

const STYLE_HINTS_ILLUSTRATED: [&str; 8] = [
    "cartoon",
    "illustrat",
    "drawn",
    "drawing",
    "comic",
    "anime",
    "pixel",
    "animated",
];

const SYSTEM_PROMPT: &str = r#"You write a single edit instruction for an image model that turns a meme template into a finished meme.

Rules:
- Output ONLY the instruction. No preamble, no quotes, no markdown.
- Keep the template's layout, panels and composition recognisable.
- Write the caption text exactly as it should appear, short and punchy.
- Use at most as many text boxes as the template has lines.
- The first image is the template. A second image, if present, is the reference."#;

const SYSTEM_PROMPT_SOFT: &str = r#"You write a single edit instruction for an image model that turns a meme template into a finished meme.

Rules:
- Output ONLY the instruction. No preamble, no quotes, no markdown.
- Keep the template's layout, panels and composition recognisable.
- Write the caption text exactly as it should appear, short and punchy.
- Use at most as many text boxes as the template has lines.
- Never ask for a specific real person's identity, face or likeness.
- The first image is the template. A second image, if present, is only a loose style reference."#;

/// True when the template's style tags suggest a drawn rather than photographic image.
pub(crate) fn is_illustrated(template: &Template) -> bool {
    template.styles.iter().any(|style| {
        let style = style.to_ascii_lowercase();
        STYLE_HINTS_ILLUSTRATED
            .iter()
            .any(|hint| style.contains(hint))
    })
}

fn reference_guidance(template: &Template, safety_soften: bool) -> String {
    if safety_soften {
        return "A reference image is attached. Do not match or reproduce anyone's identity or face from it. \
Use it only for generic stylistic cues such as colour palette, clothing style or mood, \
and describe any people in the edit generically."
            .to_string();
    }
    if is_illustrated(template) {
        "A reference image is attached. Replace the main character's face with the person from the reference, \
matching their identity and facial features, but redrawn in the template's illustrated style \
(same line work, shading and colours) so it blends in."
            .to_string()
    } else {
        "A reference image is attached. Replace the main character's face with the person from the reference, \
matching their identity and facial features photorealistically, with matching lighting, skin tone and \
perspective so the swap looks natural."
            .to_string()
    }
}

fn user_prompt(
    description: &str,
    template: &Template,
    has_reference: bool,
    safety_soften: bool,
) -> String {
    let mut prompt = format!(
        "Situation: {description}\n\nTemplate: {} (id: {})\nText lines: {}\n",
        template.name, template.id, template.lines
    );
    let example = template.example_text();
    if !example.is_empty() {
        prompt.push_str(&format!("Example captions: {}\n", example.join(" / ")));
    }
    if !template.styles.is_empty() {
        prompt.push_str(&format!("Styles: {}\n", template.styles.join(", ")));
    }
    if has_reference {
        prompt.push('\n');
        prompt.push_str(&reference_guidance(template, safety_soften));
        prompt.push('\n');
    }
    prompt.push_str("\nWrite the edit instruction now.");
    prompt
}

/// Inputs for one prompt generation.
#[derive(Clone, Copy, Debug)]
pub struct PromptInput<'a> {
    /// What the user wants
    pub description: &'a str,
    /// The chosen template
    pub template: &'a Template,
    /// The template's blank image
    pub template_image: &'a DownloadedImage,
    /// Optional reference image
    pub reference_image: Option<&'a DownloadedImage>,
}

/// Assembles the system/user messages for the prompt model.
pub fn build_messages(input: &PromptInput<'_>, safety_soften: bool) -> Vec<ChatMessage> {
    let system = if safety_soften {
        SYSTEM_PROMPT_SOFT
    } else {
        SYSTEM_PROMPT
    };
    let mut parts = vec![
        ContentPart::text(user_prompt(
            input.description,
            input.template,
            input.reference_image.is_some(),
            safety_soften,
        )),
        ContentPart::image(input.template_image.as_data_uri()),
    ];
    if let Some(reference) = input.reference_image {
        parts.push(ContentPart::image(reference.as_data_uri()));
    }
    vec![ChatMessage::system(system), ChatMessage::user_parts(parts)]
}

/// Asks a text/vision model for the edit instruction.
#[derive(Clone)]
pub struct PromptGenerator {
    client: Arc<dyn ChatClient>,
    model: String,
}

impl PromptGenerator {
    /// Generator using `model` on `client`.
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Returns the instruction with trailing whitespace removed.
    pub async fn create_prompt(
        &self,
        input: &PromptInput<'_>,
        safety_soften: bool,
    ) -> Result<String, MemeError> {
        let request = ChatRequest::new(&self.model, build_messages(input, safety_soften))
            .with_temperature(0.7)
            .with_max_tokens(512);
        let text = self.client.chat(&request).await?;
        debug!("Prompt model returned {} chars", text.len());
        Ok(text.trim_end().to_string())
    }
}
