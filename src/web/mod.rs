//! HTTP surface

use std::num::NonZeroU16;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::constants::MAX_UPLOAD_BYTES;
use crate::service::MemeService;
use crate::templates::TemplateRepository;

mod meme;

use meme::{background_handler, create_meme_handler, index_handler};

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    service: Arc<MemeService>,
    repo: Arc<TemplateRepository>,
    static_dir: PathBuf,
}

impl AppState {
    /// Shared state for the router.
    pub fn new(service: MemeService, repo: Arc<TemplateRepository>, static_dir: &Path) -> Self {
        Self {
            service: Arc::new(service),
            repo,
            static_dir: static_dir.to_path_buf(),
        }
    }
}

fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/", get(index_handler))
        .route("/meme", post(create_meme_handler))
        .route("/memes/background", get(background_handler))
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Binds `listen_addr:port` and serves the app.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    state: AppState,
) -> Result<(), anyhow::Error> {
    let app = create_router(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}
