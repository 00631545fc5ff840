//! Config handling

use std::path::PathBuf;

use clap::ValueEnum;
use tracing::log::LevelFilter;

use crate::cli::CliOptions;
use crate::constants::{
    DEFAULT_DOWNLOAD_TIMEOUT_SECONDS, DEFAULT_IMAGE_MODEL, DEFAULT_MATCHER_MODEL,
    DEFAULT_MAX_CANDIDATES, DEFAULT_PROMPT_MODEL, DEFAULT_PROVIDER_TIMEOUT_SECONDS,
    DEFAULT_STATIC_DIR, DEFAULT_TEMPLATES_PATH,
};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Which model API the service talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// OpenRouter's OpenAI compatible API
    #[default]
    #[value(name = "openrouter")]
    OpenRouter,
    /// Google Gemini generateContent
    Google,
}

/// How templates are ranked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MatcherKind {
    /// Ask the matcher model
    #[default]
    Model,
    /// Keyword overlap, no network
    Simple,
}

/// Everything the service needs once the command line is parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    /// Model API in use
    pub provider: ProviderKind,
    /// Required when `provider` is OpenRouter
    pub openrouter_api_key: Option<String>,
    /// Required when `provider` is Google
    pub google_api_key: Option<String>,
    /// Template ranking strategy
    pub matcher: MatcherKind,
    /// Model that ranks templates
    pub matcher_model: String,
    /// Model that writes the edit instruction
    pub prompt_model: String,
    /// Model that renders the meme
    pub image_model: String,
    /// Upper bound on templates shown to the matcher model, zero for no limit
    pub max_candidates: usize,
    /// Provider call timeout
    pub timeout_seconds: u64,
    /// Image download timeout
    pub download_timeout_seconds: u64,
    /// Template catalogue JSON
    pub templates_path: PathBuf,
    /// Frontend assets
    pub static_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            openrouter_api_key: None,
            google_api_key: None,
            matcher: MatcherKind::default(),
            matcher_model: DEFAULT_MATCHER_MODEL.to_string(),
            prompt_model: DEFAULT_PROMPT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            timeout_seconds: DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            download_timeout_seconds: DEFAULT_DOWNLOAD_TIMEOUT_SECONDS,
            templates_path: DEFAULT_TEMPLATES_PATH.clone(),
            static_dir: DEFAULT_STATIC_DIR.clone(),
        }
    }
}

/// Blank strings count as unset.
fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl From<&CliOptions> for ServiceConfig {
    fn from(cli: &CliOptions) -> Self {
        let defaults = Self::default();
        Self {
            provider: cli.provider,
            openrouter_api_key: non_blank(cli.openrouter_api_key.as_ref()),
            google_api_key: non_blank(cli.google_api_key.as_ref()),
            matcher: cli.matcher,
            matcher_model: non_blank(Some(&cli.matcher_model)).unwrap_or(defaults.matcher_model),
            prompt_model: non_blank(Some(&cli.prompt_model)).unwrap_or(defaults.prompt_model),
            image_model: non_blank(Some(&cli.image_model)).unwrap_or(defaults.image_model),
            max_candidates: cli.max_candidates,
            timeout_seconds: cli.timeout_seconds.max(1),
            download_timeout_seconds: cli.download_timeout_seconds.max(1),
            templates_path: cli
                .templates_path
                .clone()
                .unwrap_or(defaults.templates_path),
            static_dir: cli.static_dir.clone().unwrap_or(defaults.static_dir),
        }
    }
}
