//! Meme endpoints

use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::AppState;
use crate::constants::DEFAULT_BACKGROUND_COUNT;
use crate::error::MemeError;
use crate::service::ReferenceUpload;

/// Successful `POST /meme` body.
#[derive(Serialize, Debug)]
pub(crate) struct MemeResponse {
    mime_type: String,
    data_uri: String,
    template_id: String,
    template_name: String,
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> MemeError {
    MemeError::Internal(format!("Failed to read form: {err}"))
}

pub(crate) async fn create_meme_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MemeResponse>, MemeError> {
    let mut description = String::new();
    let mut reference_url: Option<String> = None;
    let mut reference_file: Option<ReferenceUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default();
        match field_name {
            "description" => {
                description = field.text().await.map_err(multipart_error)?;
            }
            "reference_url" => {
                reference_url = Some(field.text().await.map_err(multipart_error)?);
            }
            "reference_file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let content = field.bytes().await.map_err(multipart_error)?;
                reference_file = Some(ReferenceUpload {
                    filename,
                    content_type,
                    content: content.to_vec(),
                });
            }
            other => debug!("Ignoring form field {:?}", other),
        }
    }

    let result = state
        .service
        .generate_meme(&description, reference_file, reference_url.as_deref())
        .await?;
    Ok(Json(MemeResponse {
        mime_type: result.image.mime_type.clone(),
        data_uri: result.image.as_data_uri(),
        template_id: result.template_id,
        template_name: result.template_name,
    }))
}

#[derive(Deserialize, Debug)]
pub(crate) struct BackgroundQuery {
    count: Option<i64>,
}

/// Random blank template images for the page background.
pub(crate) async fn background_handler(
    State(state): State<AppState>,
    Query(query): Query<BackgroundQuery>,
) -> Json<serde_json::Value> {
    let mut images: Vec<String> = state
        .repo
        .all_unique()
        .into_iter()
        .map(|template| template.blank)
        .filter(|blank| !blank.is_empty())
        .collect();
    let count = query.count.unwrap_or(DEFAULT_BACKGROUND_COUNT);
    let k = usize::try_from(count).unwrap_or(0).min(images.len());
    images.shuffle(&mut rand::rng());
    images.truncate(k);
    Json(json!({ "images": images }))
}

pub(crate) async fn index_handler(State(state): State<AppState>) -> Response {
    let index_path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&index_path).await {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            warn!("Failed to read {}: {}", index_path.display(), err);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "index.html not found" })),
            )
                .into_response()
        }
    }
}
