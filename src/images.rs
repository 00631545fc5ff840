//! Image payloads, data-URI encoding and the downloader.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::constants::DEFAULT_MIME_TYPE;
use crate::error::MemeError;

/// Encodes bytes as a `data:<mime>;base64,<payload>` URI.
pub fn encode_data_uri(mime_type: &str, content: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(content)
    )
}

/// Splits a data URI into its MIME type and (still encoded) payload.
///
/// Returns `None` when the string isn't a data URI at all.
pub fn split_data_uri(uri: &str) -> Option<(String, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.split(';').next().unwrap_or_default().trim();
    let mime = if mime.is_empty() { DEFAULT_MIME_TYPE } else { mime };
    Some((mime.to_string(), payload))
}

/// Decodes a base64 data URI into `(mime_type, bytes)`.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), MemeError> {
    let (mime, payload) = split_data_uri(uri).ok_or_else(|| MemeError::InvalidResponse {
        message: "Not a data URI".to_string(),
        summary: format!("uri_len={}", uri.len()),
    })?;
    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    Ok((mime, bytes))
}

/// An image fetched from a URL or received as an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedImage {
    /// Where it came from: a URL or the upload's filename
    pub url: String,
    /// Raw bytes
    pub content: Vec<u8>,
    /// MIME type, eg `image/png`
    pub mime_type: String,
}

impl DownloadedImage {
    /// Base64 data URI of the image.
    pub fn as_data_uri(&self) -> String {
        encode_data_uri(&self.mime_type, &self.content)
    }
}

/// An image produced by the image model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    /// The URL it was fetched from, if it was not returned inline
    pub source: Option<String>,
    /// Raw bytes
    pub content: Vec<u8>,
    /// MIME type, eg `image/png`
    pub mime_type: String,
}

impl GeneratedImage {
    /// Base64 data URI of the image.
    pub fn as_data_uri(&self) -> String {
        encode_data_uri(&self.mime_type, &self.content)
    }

    /// Builds an image from a base64 data URI.
    pub fn from_data_uri(uri: &str) -> Result<Self, MemeError> {
        let (mime_type, content) = decode_data_uri(uri)?;
        Ok(Self {
            source: None,
            content,
            mime_type,
        })
    }
}

impl From<DownloadedImage> for GeneratedImage {
    fn from(image: DownloadedImage) -> Self {
        Self {
            source: Some(image.url),
            content: image.content,
            mime_type: image.mime_type,
        }
    }
}

/// Guesses a MIME type from the extension of a path or URL.
pub fn guess_mime_from_name(name: &str) -> Option<String> {
    let path = url::Url::parse(name)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| name.to_string());
    image::ImageFormat::from_path(Path::new(&path))
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Content-Type header first, then the URL's extension, then `image/png`.
pub fn resolve_mime(content_type: Option<&str>, url: &str) -> String {
    content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase)
        .or_else(|| guess_mime_from_name(url))
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

/// Fetches images over HTTP, retrying once.
#[derive(Clone, Debug)]
pub struct ImageDownloader {
    client: reqwest::Client,
}

impl ImageDownloader {
    /// Downloader whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, MemeError> {
        Ok(Self {
            client: crate::clients::http_client(timeout)?,
        })
    }

    /// Fetches `url`; a failed attempt is retried once immediately.
    pub async fn download(&self, url: &str) -> Result<DownloadedImage, MemeError> {
        match self.fetch(url).await {
            Ok(image) => Ok(image),
            Err(first) => {
                warn!("Download of {} failed, retrying: {}", url, first);
                self.fetch(url).await.map_err(|last| {
                    MemeError::Transport(format!("Failed to download {url}: {last}"))
                })
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<DownloadedImage, MemeError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content = response.bytes().await?.to_vec();
        let mime_type = resolve_mime(content_type.as_deref(), url);
        debug!(
            "Downloaded {} ({} bytes, {})",
            url,
            content.len(),
            mime_type
        );
        Ok(DownloadedImage {
            url: url.to_string(),
            content,
            mime_type,
        })
    }
}
