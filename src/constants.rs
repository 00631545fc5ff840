//! Shared constants/defaults for things
//!

use std::path::PathBuf;
use std::sync::LazyLock;

/// Where the template catalogue lives unless told otherwise
pub static DEFAULT_TEMPLATES_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from("./data/meme_templates.json"));

/// Default directory for the browser frontend
pub static DEFAULT_STATIC_DIR: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("./static"));

/// MIME type used when nothing better can be determined.
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// Score added for each keyword found in the situation.
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 1.0;

/// Score added once when any word of the template name is found in the situation.
pub const DEFAULT_NAME_WEIGHT: f64 = 0.5;

/// Maximum number of templates sent to the ranking model.
pub const DEFAULT_MAX_CANDIDATES: usize = 207;

/// Model used to rank templates.
pub const DEFAULT_MATCHER_MODEL: &str = "google/gemini-2.5-flash-image-preview:free";

/// Model used to write the edit instruction.
pub const DEFAULT_PROMPT_MODEL: &str = "google/gemini-2.5-flash";

/// Model used to render the final image.
pub const DEFAULT_IMAGE_MODEL: &str = "google/gemini-2.5-flash-image-preview";

/// Default OpenRouter API root
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default Google Generative Language API root
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Timeout (in seconds) for model provider calls.
pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 60;

/// Timeout (in seconds) for image downloads.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECONDS: u64 = 30;

/// How many preview URLs the background endpoint returns by default.
pub const DEFAULT_BACKGROUND_COUNT: i64 = 60;

/// Upper bound on request bodies, uploads included.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Refusal text used when a provider produced neither an image nor an explanation.
pub const NO_IMAGE_RETURNED: &str = "no_image_returned";

/// Refusal text used when a refusal carried no detail at all.
pub const GENERIC_REFUSAL: &str = "the model declined to generate the image";

/// Upper bound (in characters) on the refusal explanation assembled from text parts.
pub const REFUSAL_TEXT_LIMIT: usize = 500;
