//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::config::{MatcherKind, ProviderKind};
use crate::constants::{
    DEFAULT_DOWNLOAD_TIMEOUT_SECONDS, DEFAULT_IMAGE_MODEL, DEFAULT_MATCHER_MODEL,
    DEFAULT_MAX_CANDIDATES, DEFAULT_PROMPT_MODEL, DEFAULT_PROVIDER_TIMEOUT_SECONDS,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "MEMEGEN_DEBUG")]
    /// Enable debug logging. Env: MEMEGEN_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "8000", env = "MEMEGEN_PORT")]
    /// http listener, defaults to `8000`.
    /// Env: MEMEGEN_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "MEMEGEN_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: MEMEGEN_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, short, env = "MEMEGEN_TEMPLATES_PATH")]
    /// Path to the template catalogue, defaults to `./data/meme_templates.json`.
    /// Env: MEMEGEN_TEMPLATES_PATH
    pub templates_path: Option<PathBuf>,
    #[clap(long, short, env = "MEMEGEN_STATIC_DIR")]
    /// Directory holding `index.html` and friends, defaults to `./static`.
    /// Env: MEMEGEN_STATIC_DIR
    pub static_dir: Option<PathBuf>,

    #[clap(long, value_enum, default_value_t = ProviderKind::OpenRouter, env = "MEMEGEN_PROVIDER")]
    /// Model API to use. Env: MEMEGEN_PROVIDER
    pub provider: ProviderKind,
    #[clap(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    /// Env: OPENROUTER_API_KEY
    pub openrouter_api_key: Option<String>,
    #[clap(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    /// Env: GOOGLE_API_KEY
    pub google_api_key: Option<String>,

    #[clap(long, value_enum, default_value_t = MatcherKind::Model, env = "MEMEGEN_MATCHER")]
    /// Template ranking strategy. Env: MEMEGEN_MATCHER
    pub matcher: MatcherKind,
    #[clap(long, default_value = DEFAULT_MATCHER_MODEL, env = "MEMEGEN_MATCHER_MODEL")]
    /// Env: MEMEGEN_MATCHER_MODEL
    pub matcher_model: String,
    #[clap(long, default_value = DEFAULT_PROMPT_MODEL, env = "MEMEGEN_PROMPT_MODEL")]
    /// Env: MEMEGEN_PROMPT_MODEL
    pub prompt_model: String,
    #[clap(long, default_value = DEFAULT_IMAGE_MODEL, env = "MEMEGEN_IMAGE_MODEL")]
    /// Env: MEMEGEN_IMAGE_MODEL
    pub image_model: String,
    #[clap(long, default_value_t = DEFAULT_MAX_CANDIDATES, env = "MEMEGEN_MAX_CANDIDATES")]
    /// Templates shown to the matcher model, `0` for all of them.
    /// Env: MEMEGEN_MAX_CANDIDATES
    pub max_candidates: usize,

    #[clap(long, default_value_t = DEFAULT_PROVIDER_TIMEOUT_SECONDS, env = "MEMEGEN_TIMEOUT_SECONDS")]
    /// Provider call timeout. Env: MEMEGEN_TIMEOUT_SECONDS
    pub timeout_seconds: u64,
    #[clap(
        long,
        default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECONDS,
        env = "MEMEGEN_DOWNLOAD_TIMEOUT_SECONDS"
    )]
    /// Image download timeout. Env: MEMEGEN_DOWNLOAD_TIMEOUT_SECONDS
    pub download_timeout_seconds: u64,
}
