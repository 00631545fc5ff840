use std::sync::Arc;

use clap::Parser;
use memegen::config::{ServiceConfig, setup_logging};
use memegen::service::{LiveBackend, MemeService};
use memegen::templates::TemplateRepository;
use memegen::web::AppState;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = memegen::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let config = ServiceConfig::from(&cli);

    let repo = match TemplateRepository::load(&config.templates_path) {
        Ok(repo) => Arc::new(repo),
        Err(err) => {
            error!(
                "Failed to load templates from {}: {}",
                config.templates_path.display(),
                err
            );
            return;
        }
    };
    info!(
        "Loaded {} templates from {}",
        repo.len(),
        config.templates_path.display()
    );

    let backend = match LiveBackend::from_config(&config, repo.clone()) {
        Ok(backend) => backend,
        Err(err) => {
            error!("Failed to set up model provider: {}", err);
            return;
        }
    };
    info!(
        "Using provider={:?} matcher={:?} image_model={}",
        config.provider, config.matcher, config.image_model
    );

    let state = AppState::new(
        MemeService::new(Arc::new(backend)),
        repo,
        &config.static_dir,
    );
    if let Err(err) = memegen::web::setup_server(&cli.listen_address, cli.port, state).await {
        error!("Application error: {}", err);
    }
}
