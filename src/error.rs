//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};

use crate::templates::TemplateError;

/// Failure kinds for the meme pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum MemeError {
    /// The description was empty after trimming
    MissingDescription,
    /// The provider blocked generation on safety/policy grounds
    Refused(String),
    /// The matcher produced no template
    NoTemplate,
    /// Network round-trip failed or the provider answered non-2xx
    Transport(String),
    /// The provider answered, but not in a shape we can use
    InvalidResponse {
        /// What was wrong
        message: String,
        /// Redacted description of the response, for the logs
        summary: String,
    },
    /// A pipeline step gave up after its attempts
    StepFailed {
        /// User facing description of the step
        step: String,
        /// The last underlying error
        cause: String,
    },
    /// Missing credentials or bad settings at startup
    Config(String),
    /// Anything else
    Internal(String),
}

impl MemeError {
    /// Wraps the error as the terminal failure of a named step.
    pub fn step(step: impl Into<String>, cause: &MemeError) -> Self {
        MemeError::StepFailed {
            step: step.into(),
            cause: cause.to_string(),
        }
    }

    /// True for provider safety refusals.
    pub fn is_refusal(&self) -> bool {
        matches!(self, MemeError::Refused(_))
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MemeError::MissingDescription | MemeError::Refused(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for MemeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDescription => write!(f, "Description is required"),
            Self::Refused(reason) => write!(f, "{reason}"),
            Self::NoTemplate => write!(f, "no template found"),
            Self::Transport(message) => write!(f, "Request failed: {message}"),
            Self::InvalidResponse { message, .. } => write!(f, "{message}"),
            Self::StepFailed { step, cause } => write!(f, "{step}: {cause}"),
            Self::Config(message) => write!(f, "Configuration error: {message}"),
            Self::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for MemeError {}

impl From<reqwest::Error> for MemeError {
    fn from(err: reqwest::Error) -> Self {
        MemeError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for MemeError {
    fn from(err: serde_json::Error) -> Self {
        MemeError::InvalidResponse {
            message: format!("Failed to parse JSON: {err}"),
            summary: String::new(),
        }
    }
}

impl From<std::io::Error> for MemeError {
    fn from(err: std::io::Error) -> Self {
        MemeError::Internal(err.to_string())
    }
}

impl From<base64::DecodeError> for MemeError {
    fn from(err: base64::DecodeError) -> Self {
        MemeError::InvalidResponse {
            message: format!("Failed to base64-decode image: {err}"),
            summary: String::new(),
        }
    }
}

impl From<url::ParseError> for MemeError {
    fn from(err: url::ParseError) -> Self {
        MemeError::Transport(err.to_string())
    }
}

impl From<TemplateError> for MemeError {
    fn from(err: TemplateError) -> Self {
        MemeError::Internal(err.to_string())
    }
}

impl IntoResponse for MemeError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let detail = match &self {
            MemeError::MissingDescription => {
                info!("Bad request received: missing description");
                self.to_string()
            }
            MemeError::Refused(reason) => {
                info!("Generation refused: {}", reason);
                format!("The AI refused to generate the image: {reason}")
            }
            other => {
                error!("Internal server error: {}", other);
                other.to_string()
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
