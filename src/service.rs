//! Sequences template choice, prompt writing and image generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{ChatClient, build_chat_client};
use crate::config::{MatcherKind, ServiceConfig};
use crate::constants::DEFAULT_MIME_TYPE;
use crate::error::MemeError;
use crate::generator::MemeImageGenerator;
use crate::images::{DownloadedImage, GeneratedImage, ImageDownloader};
use crate::matching::{ModelTemplateMatcher, SimpleTemplateMatcher, TemplateMatch, TemplateMatcher, TemplatePicker};
use crate::prompt::{PromptGenerator, PromptInput};
use crate::retry::{self, with_retry};
use crate::templates::TemplateRepository;

/// The outcome of one successful run.
#[derive(Clone, Debug, PartialEq)]
pub struct MemeResult {
    /// The finished meme
    pub image: GeneratedImage,
    /// Id of the template used
    pub template_id: String,
    /// Name of the template used
    pub template_name: String,
    /// The instruction that produced the image
    pub prompt: String,
}

/// A reference image uploaded with the request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceUpload {
    /// Client supplied filename
    pub filename: Option<String>,
    /// Client supplied content type
    pub content_type: Option<String>,
    /// Raw bytes
    pub content: Vec<u8>,
}

/// The external collaborators the service drives.
#[async_trait]
pub trait MemeBackend: Send + Sync {
    /// Best template for the situation, if any.
    async fn pick_template(&self, situation: &str) -> Result<Option<TemplateMatch>, MemeError>;

    /// Fetches an image by URL.
    async fn download(&self, url: &str) -> Result<DownloadedImage, MemeError>;

    /// Writes the edit instruction.
    async fn create_prompt(
        &self,
        input: &PromptInput<'_>,
        safety_soften: bool,
    ) -> Result<String, MemeError>;

    /// Renders the meme.
    async fn generate(
        &self,
        prompt: &str,
        template_image: &DownloadedImage,
        reference_image: Option<&DownloadedImage>,
    ) -> Result<GeneratedImage, MemeError>;
}

/// Backend talking to the configured model provider.
#[derive(Clone)]
pub struct LiveBackend {
    picker: TemplatePicker,
    downloader: ImageDownloader,
    prompts: PromptGenerator,
    images: MemeImageGenerator,
}

impl LiveBackend {
    /// Wires the pieces together from already-built parts.
    pub fn new(
        picker: TemplatePicker,
        downloader: ImageDownloader,
        prompts: PromptGenerator,
        images: MemeImageGenerator,
    ) -> Self {
        Self {
            picker,
            downloader,
            prompts,
            images,
        }
    }

    /// Builds the provider client and every component from config.
    pub fn from_config(
        config: &ServiceConfig,
        repo: Arc<TemplateRepository>,
    ) -> Result<Self, MemeError> {
        let client = build_chat_client(config)?;
        Self::with_client(config, repo, client)
    }

    /// Same as [`LiveBackend::from_config`] with an explicit provider client.
    pub fn with_client(
        config: &ServiceConfig,
        repo: Arc<TemplateRepository>,
        client: Arc<dyn ChatClient>,
    ) -> Result<Self, MemeError> {
        let matcher: Arc<dyn TemplateMatcher> = match config.matcher {
            MatcherKind::Model => Arc::new(ModelTemplateMatcher::new(
                client.clone(),
                &config.matcher_model,
                config.max_candidates,
            )),
            MatcherKind::Simple => Arc::new(SimpleTemplateMatcher::default()),
        };
        let downloader =
            ImageDownloader::new(Duration::from_secs(config.download_timeout_seconds))?;
        Ok(Self::new(
            TemplatePicker::new(repo, matcher),
            downloader.clone(),
            PromptGenerator::new(client.clone(), &config.prompt_model),
            MemeImageGenerator::new(client, downloader, &config.image_model),
        ))
    }
}

#[async_trait]
impl MemeBackend for LiveBackend {
    async fn pick_template(&self, situation: &str) -> Result<Option<TemplateMatch>, MemeError> {
        self.picker.pick_best(situation, true).await
    }

    async fn download(&self, url: &str) -> Result<DownloadedImage, MemeError> {
        self.downloader.download(url).await
    }

    async fn create_prompt(
        &self,
        input: &PromptInput<'_>,
        safety_soften: bool,
    ) -> Result<String, MemeError> {
        self.prompts.create_prompt(input, safety_soften).await
    }

    async fn generate(
        &self,
        prompt: &str,
        template_image: &DownloadedImage,
        reference_image: Option<&DownloadedImage>,
    ) -> Result<GeneratedImage, MemeError> {
        self.images
            .generate(prompt, template_image, reference_image)
            .await
    }
}

/// Refusals and fallback outcomes end the generation step; anything else gets another go.
fn generation_retryable(err: &MemeError) -> bool {
    !matches!(err, MemeError::Refused(_) | MemeError::StepFailed { .. })
}

/// Runs the whole pipeline for one request.
#[derive(Clone)]
pub struct MemeService {
    backend: Arc<dyn MemeBackend>,
}

impl MemeService {
    /// Service over `backend`.
    pub fn new(backend: Arc<dyn MemeBackend>) -> Self {
        Self { backend }
    }

    /// Produces a meme for `description`, with an optional reference image.
    ///
    /// An uploaded file takes precedence over `reference_url`.
    pub async fn generate_meme(
        &self,
        description: &str,
        reference_file: Option<ReferenceUpload>,
        reference_url: Option<&str>,
    ) -> Result<MemeResult, MemeError> {
        let description = description.trim();
        let cid = Uuid::new_v4().to_string();
        let cid = cid.as_str();
        let reference_url = reference_url.map(str::trim).filter(|url| !url.is_empty());
        info!(
            "cid={} step=start description_len={} has_ref_url={} has_ref_file={}",
            cid,
            description.len(),
            reference_url.is_some(),
            reference_file
                .as_ref()
                .and_then(|file| file.filename.as_deref())
                .is_some_and(|name| !name.trim().is_empty())
        );
        if description.is_empty() {
            return Err(MemeError::MissingDescription);
        }
        let backend = self.backend.as_ref();

        let top = with_retry(cid, "pick_template", 2, retry::always, move |attempt| async move {
            info!(
                "cid={} step=pick_template attempt={} situation={:?}",
                cid, attempt, description
            );
            backend
                .pick_template(description)
                .await?
                .ok_or(MemeError::NoTemplate)
        })
        .await
        .map_err(|err| MemeError::step("Failed to select a template", &err))?;
        let template = &top.template;
        info!(
            "cid={} step=pick_template_success template_id={} template_name={:?} score={:.3} blank_url={}",
            cid, template.id, template.name, top.score, template.blank
        );

        info!("cid={} step=download_template_image url={}", cid, template.blank);
        let template_image = backend.download(&template.blank).await?;
        info!(
            "cid={} step=template_image_ready mime={} size={}",
            cid,
            template_image.mime_type,
            template_image.content.len()
        );

        let reference_image = self
            .build_reference_image(cid, reference_file, reference_url)
            .await?;
        if let Some(reference) = &reference_image {
            info!(
                "cid={} step=reference_image_ready mime={} size={}",
                cid,
                reference.mime_type,
                reference.content.len()
            );
        }

        let input = PromptInput {
            description,
            template,
            template_image: &template_image,
            reference_image: reference_image.as_ref(),
        };

        let prompt = with_retry(cid, "create_prompt", 2, retry::always, move |attempt| async move {
            info!(
                "cid={} step=create_prompt attempt={} template_id={} has_reference_image={}",
                cid,
                attempt,
                input.template.id,
                input.reference_image.is_some()
            );
            backend.create_prompt(&input, false).await
        })
        .await
        .map_err(|err| MemeError::step("Failed to create prompt", &err))?;
        info!("cid={} step=create_prompt_success prompt={:?}", cid, prompt);

        let first_prompt = prompt.as_str();
        let (image, prompt) = with_retry(
            cid,
            "generate_image",
            2,
            generation_retryable,
            move |attempt| async move {
                info!(
                    "cid={} step=generate_image attempt={} prompt_len={} has_ref_image={}",
                    cid,
                    attempt,
                    first_prompt.len(),
                    input.reference_image.is_some()
                );
                match backend
                    .generate(first_prompt, input.template_image, input.reference_image)
                    .await
                {
                    Ok(image) => {
                        info!(
                            "cid={} step=generate_image_success mime={} size={}",
                            cid,
                            image.mime_type,
                            image.content.len()
                        );
                        Ok((image, first_prompt.to_string()))
                    }
                    Err(MemeError::Refused(reason)) => {
                        warn!(
                            "cid={} step=generate_image_refused attempt={} error={}",
                            cid, attempt, reason
                        );
                        safety_fallback(backend, cid, &input, reason).await
                    }
                    Err(err) => Err(err),
                }
            },
        )
        .await
        .map_err(|err| {
            if generation_retryable(&err) {
                MemeError::step("Failed to generate image", &err)
            } else {
                err
            }
        })?;

        Ok(MemeResult {
            image,
            template_id: template.id.clone(),
            template_name: template.name.clone(),
            prompt,
        })
    }

    async fn build_reference_image(
        &self,
        cid: &str,
        reference_file: Option<ReferenceUpload>,
        reference_url: Option<&str>,
    ) -> Result<Option<DownloadedImage>, MemeError> {
        if let Some(file) = reference_file {
            info!(
                "cid={} step=reference_upload_received filename={:?} content_type={:?}",
                cid, file.filename, file.content_type
            );
            return Ok(reference_from_upload(file));
        }
        if let Some(url) = reference_url {
            info!("cid={} step=reference_url_received url={}", cid, url);
            return self.backend.download(url).await.map(Some);
        }
        Ok(None)
    }
}

/// A blank filename or empty body means "no reference".
fn reference_from_upload(file: ReferenceUpload) -> Option<DownloadedImage> {
    let filename = file
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())?
        .to_string();
    if file.content.is_empty() {
        return None;
    }
    let mime_type = file
        .content_type
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
    Some(DownloadedImage {
        url: filename,
        content: file.content,
        mime_type,
    })
}

/// One softened retry after a refusal.
///
/// If the softened prompt can't be written the original refusal is returned;
/// a second refusal is returned as-is.
async fn safety_fallback(
    backend: &dyn MemeBackend,
    cid: &str,
    input: &PromptInput<'_>,
    original_refusal: String,
) -> Result<(GeneratedImage, String), MemeError> {
    info!(
        "cid={} step=create_prompt_soft attempt=1 template_id={} has_reference_image={}",
        cid,
        input.template.id,
        input.reference_image.is_some()
    );
    let soft_prompt = match backend.create_prompt(input, true).await {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!("cid={} step=create_prompt_soft_error attempt=1 error={}", cid, err);
            return Err(MemeError::Refused(original_refusal));
        }
    };
    info!("cid={} step=create_prompt_soft_success prompt={:?}", cid, soft_prompt);

    info!(
        "cid={} step=generate_image_soft attempt=1 prompt_len={} has_ref_image={}",
        cid,
        soft_prompt.len(),
        input.reference_image.is_some()
    );
    match backend
        .generate(&soft_prompt, input.template_image, input.reference_image)
        .await
    {
        Ok(image) => {
            info!(
                "cid={} step=generate_image_soft_success mime={} size={}",
                cid,
                image.mime_type,
                image.content.len()
            );
            Ok((image, soft_prompt))
        }
        Err(MemeError::Refused(reason)) => {
            warn!("cid={} step=generate_image_soft_refused attempt=1 error={}", cid, reason);
            Err(MemeError::Refused(reason))
        }
        Err(err) => {
            warn!("cid={} step=generate_image_soft_error attempt=1 error={}", cid, err);
            Err(MemeError::step(
                "Failed to generate image after safety fallback",
                &err,
            ))
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted backend for service and router tests.

    use super::*;
    use crate::templates::test_template;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Queue<T> = Mutex<VecDeque<Result<T, MemeError>>>;

    /// What one `create_prompt` call looked like.
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) struct PromptCall {
        pub(crate) soften: bool,
        pub(crate) reference: Option<String>,
    }

    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        pub(crate) picks: Queue<Option<TemplateMatch>>,
        pub(crate) prompts: Queue<String>,
        pub(crate) generations: Queue<GeneratedImage>,
        pub(crate) downloads: Mutex<Vec<String>>,
        pub(crate) prompt_calls: Mutex<Vec<PromptCall>>,
        pub(crate) generate_calls: Mutex<Vec<String>>,
        pub(crate) pick_calls: Mutex<u32>,
    }

    pub(crate) fn matched(id: &str, name: &str) -> TemplateMatch {
        TemplateMatch {
            template: test_template(id, name, &[]),
            score: 1.0,
        }
    }

    pub(crate) fn png(bytes: &[u8]) -> GeneratedImage {
        GeneratedImage {
            source: None,
            content: bytes.to_vec(),
            mime_type: "image/png".to_string(),
        }
    }

    fn next<T>(queue: &Queue<T>, what: &str) -> Result<T, MemeError> {
        queue
            .lock()
            .map_err(|err| MemeError::Internal(err.to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(MemeError::Internal(format!("no scripted {what}"))))
    }

    impl ScriptedBackend {
        pub(crate) fn new(
            picks: Vec<Result<Option<TemplateMatch>, MemeError>>,
            prompts: Vec<Result<String, MemeError>>,
            generations: Vec<Result<GeneratedImage, MemeError>>,
        ) -> Self {
            Self {
                picks: Mutex::new(picks.into()),
                prompts: Mutex::new(prompts.into()),
                generations: Mutex::new(generations.into()),
                ..Default::default()
            }
        }

        pub(crate) fn prompt_calls(&self) -> Vec<PromptCall> {
            self.prompt_calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub(crate) fn generate_calls(&self) -> Vec<String> {
            self.generate_calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub(crate) fn downloads(&self) -> Vec<String> {
            self.downloads.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub(crate) fn pick_calls(&self) -> u32 {
            self.pick_calls.lock().map(|c| *c).unwrap_or_default()
        }
    }

    #[async_trait]
    impl MemeBackend for ScriptedBackend {
        async fn pick_template(
            &self,
            _situation: &str,
        ) -> Result<Option<TemplateMatch>, MemeError> {
            if let Ok(mut calls) = self.pick_calls.lock() {
                *calls += 1;
            }
            next(&self.picks, "pick")
        }

        async fn download(&self, url: &str) -> Result<DownloadedImage, MemeError> {
            if let Ok(mut downloads) = self.downloads.lock() {
                downloads.push(url.to_string());
            }
            Ok(DownloadedImage {
                url: url.to_string(),
                content: url.as_bytes().to_vec(),
                mime_type: "image/png".to_string(),
            })
        }

        async fn create_prompt(
            &self,
            input: &PromptInput<'_>,
            safety_soften: bool,
        ) -> Result<String, MemeError> {
            if let Ok(mut calls) = self.prompt_calls.lock() {
                calls.push(PromptCall {
                    soften: safety_soften,
                    reference: input.reference_image.map(|image| image.url.clone()),
                });
            }
            next(&self.prompts, "prompt")
        }

        async fn generate(
            &self,
            prompt: &str,
            _template_image: &DownloadedImage,
            _reference_image: Option<&DownloadedImage>,
        ) -> Result<GeneratedImage, MemeError> {
            if let Ok(mut calls) = self.generate_calls.lock() {
                calls.push(prompt.to_string());
            }
            next(&self.generations, "generation")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    fn service(backend: &Arc<ScriptedBackend>) -> MemeService {
        MemeService::new(backend.clone())
    }

    fn refused(reason: &str) -> Result<GeneratedImage, MemeError> {
        Err(MemeError::Refused(reason.to_string()))
    }

    #[tokio::test]
    async fn happy_path_returns_everything() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("drake", "Drakeposting")))],
            vec![Ok("caption it".to_string())],
            vec![Ok(png(b"meme"))],
        ));
        let result = service(&backend)
            .generate_meme("  tabs vs spaces  ", None, None)
            .await
            .expect("meme");
        assert_eq!(result.template_id, "drake");
        assert_eq!(result.template_name, "Drakeposting");
        assert_eq!(result.prompt, "caption it");
        assert_eq!(result.image, png(b"meme"));
        assert_eq!(
            backend.downloads(),
            vec!["https://api.memegen.link/images/drake.png".to_string()]
        );
    }

    #[tokio::test]
    async fn blank_description_is_rejected_up_front() {
        let backend = Arc::new(ScriptedBackend::default());
        let err = service(&backend)
            .generate_meme(" \n\t", None, Some("https://example.org/me.png"))
            .await
            .expect_err("rejected");
        assert_eq!(err, MemeError::MissingDescription);
        assert_eq!(backend.pick_calls(), 0);
        assert!(backend.downloads().is_empty());
    }

    #[tokio::test]
    async fn transient_pick_failure_is_retried() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![
                Err(MemeError::Transport("reset".to_string())),
                Ok(Some(matched("stonks", "Stonks"))),
            ],
            vec![Ok("caption it".to_string())],
            vec![Ok(png(b"meme"))],
        ));
        let result = service(&backend)
            .generate_meme("number go up", None, None)
            .await
            .expect("meme");
        assert_eq!(result.template_id, "stonks");
        assert_eq!(backend.pick_calls(), 2);
    }

    #[tokio::test]
    async fn no_template_twice_fails_selection() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(None), Ok(None)], vec![], vec![]));
        let err = service(&backend)
            .generate_meme("anything", None, None)
            .await
            .expect_err("no template");
        assert_eq!(
            err,
            MemeError::StepFailed {
                step: "Failed to select a template".to_string(),
                cause: "no template found".to_string(),
            }
        );
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(backend.pick_calls(), 2);
    }

    #[tokio::test]
    async fn prompt_failure_twice_is_terminal() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("fine", "This is Fine")))],
            vec![
                Err(MemeError::Transport("503".to_string())),
                Err(MemeError::Transport("504".to_string())),
            ],
            vec![],
        ));
        let err = service(&backend)
            .generate_meme("prod is down", None, None)
            .await
            .expect_err("prompt failed");
        assert_eq!(err.to_string(), "Failed to create prompt: Request failed: 504");
        assert!(backend.generate_calls().is_empty());
    }

    #[tokio::test]
    async fn refusal_fallback_uses_softened_prompt() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("stonks", "Stonks")))],
            vec![Ok("use their face".to_string()), Ok("generic person".to_string())],
            vec![refused("SAFETY"), Ok(png(b"soft meme"))],
        ));
        let result = service(&backend)
            .generate_meme("me getting rich", None, None)
            .await
            .expect("meme");
        assert_eq!(result.prompt, "generic person");
        assert_eq!(result.image, png(b"soft meme"));
        assert_eq!(
            backend.generate_calls(),
            vec!["use their face".to_string(), "generic person".to_string()]
        );
        let softened: Vec<bool> = backend.prompt_calls().iter().map(|c| c.soften).collect();
        assert_eq!(softened, vec![false, true]);
    }

    #[tokio::test]
    async fn second_refusal_is_surfaced_without_more_attempts() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("stonks", "Stonks")))],
            vec![Ok("use their face".to_string()), Ok("generic person".to_string())],
            vec![refused("first"), refused("second"), Ok(png(b"never"))],
        ));
        let err = service(&backend)
            .generate_meme("me getting rich", None, None)
            .await
            .expect_err("refused");
        assert_eq!(err, MemeError::Refused("second".to_string()));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(backend.generate_calls().len(), 2);
        assert_eq!(backend.prompt_calls().len(), 2);
    }

    #[tokio::test]
    async fn soft_prompt_failure_keeps_original_refusal() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("stonks", "Stonks")))],
            vec![Ok("use their face".to_string()), Err(MemeError::Transport("down".to_string()))],
            vec![refused("original"), Ok(png(b"never"))],
        ));
        let err = service(&backend)
            .generate_meme("me getting rich", None, None)
            .await
            .expect_err("refused");
        assert_eq!(err, MemeError::Refused("original".to_string()));
        assert_eq!(backend.generate_calls().len(), 1);
    }

    #[tokio::test]
    async fn soft_generation_error_is_terminal() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("stonks", "Stonks")))],
            vec![Ok("use their face".to_string()), Ok("generic person".to_string())],
            vec![
                refused("SAFETY"),
                Err(MemeError::Transport("timeout".to_string())),
                Ok(png(b"never")),
            ],
        ));
        let err = service(&backend)
            .generate_meme("me getting rich", None, None)
            .await
            .expect_err("failed");
        assert_eq!(
            err.to_string(),
            "Failed to generate image after safety fallback: Request failed: timeout"
        );
        assert_eq!(backend.generate_calls().len(), 2);
    }

    #[tokio::test]
    async fn generic_generation_failure_is_retried_then_wrapped() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("fine", "This is Fine")))],
            vec![Ok("caption it".to_string())],
            vec![
                Err(MemeError::Transport("first".to_string())),
                Err(MemeError::Transport("second".to_string())),
            ],
        ));
        let err = service(&backend)
            .generate_meme("prod is down", None, None)
            .await
            .expect_err("failed");
        assert_eq!(err.to_string(), "Failed to generate image: Request failed: second");

        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("fine", "This is Fine")))],
            vec![Ok("caption it".to_string())],
            vec![Err(MemeError::Transport("first".to_string())), Ok(png(b"meme"))],
        ));
        let result = service(&backend)
            .generate_meme("prod is down", None, None)
            .await
            .expect("retried");
        assert_eq!(result.prompt, "caption it");
    }

    #[tokio::test]
    async fn uploaded_file_beats_reference_url() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("drake", "Drakeposting")))],
            vec![Ok("caption it".to_string())],
            vec![Ok(png(b"meme"))],
        ));
        let upload = ReferenceUpload {
            filename: Some("me.jpg".to_string()),
            content_type: Some("image/jpeg".to_string()),
            content: vec![0xFF, 0xD8],
        };
        service(&backend)
            .generate_meme("me", Some(upload), Some("https://example.org/other.png"))
            .await
            .expect("meme");
        assert_eq!(backend.downloads().len(), 1);
        assert_eq!(backend.prompt_calls()[0].reference.as_deref(), Some("me.jpg"));
    }

    #[tokio::test]
    async fn empty_upload_means_no_reference() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("drake", "Drakeposting")))],
            vec![Ok("caption it".to_string())],
            vec![Ok(png(b"meme"))],
        ));
        let upload = ReferenceUpload {
            filename: Some("  ".to_string()),
            content_type: None,
            content: vec![1, 2, 3],
        };
        service(&backend)
            .generate_meme("me", Some(upload), Some("https://example.org/other.png"))
            .await
            .expect("meme");
        assert_eq!(backend.prompt_calls()[0].reference, None);
        assert_eq!(backend.downloads().len(), 1);
    }

    #[tokio::test]
    async fn reference_url_is_downloaded() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(Some(matched("drake", "Drakeposting")))],
            vec![Ok("caption it".to_string())],
            vec![Ok(png(b"meme"))],
        ));
        service(&backend)
            .generate_meme("me", None, Some("  https://example.org/me.png "))
            .await
            .expect("meme");
        assert_eq!(
            backend.downloads(),
            vec![
                "https://api.memegen.link/images/drake.png".to_string(),
                "https://example.org/me.png".to_string()
            ]
        );
        assert_eq!(
            backend.prompt_calls()[0].reference.as_deref(),
            Some("https://example.org/me.png")
        );
    }

    #[test]
    fn upload_defaults_mime() {
        let image = reference_from_upload(ReferenceUpload {
            filename: Some("me".to_string()),
            content_type: None,
            content: vec![9],
        })
        .expect("reference");
        assert_eq!(image.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(
            reference_from_upload(ReferenceUpload {
                filename: Some("me.png".to_string()),
                content_type: Some("image/png".to_string()),
                content: Vec::new(),
            }),
            None
        );
    }
}
