use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CreatorPilotError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("provider error: {0}")]
    Provider(String),
}

pub use crate::Result;

impl From<diesel::result::Error> for CreatorPilotError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}

impl CreatorPilotError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Serialization(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Http(_) | Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "We couldn't find that item. It may have been archived or removed.",
            Self::Validation(_) | Self::Serialization(_) => {
                "Some of the submitted details are invalid. Please check them and try again."
            }
            other => classify_error_message(&other.to_string()),
        }
    }
}

/// Maps raw error text from any layer to a message fit for a toast.
pub fn classify_error_message(text: &str) -> &'static str {
    let lower = text.to_ascii_lowercase();
    if lower.contains("unauthorized")
        || lower.contains("401")
        || lower.contains("invalid_grant")
        || lower.contains("token has been expired or revoked")
    {
        "Your YouTube connection has expired. Please reconnect your channel."
    } else if lower.contains("forbidden")
        || lower.contains("403")
        || lower.contains("insufficient")
        || lower.contains("permission")
    {
        "Access was denied. Make sure the connected account has permission for this channel."
    } else if lower.contains("rate limit")
        || lower.contains("429")
        || lower.contains("quota")
        || lower.contains("too many requests")
    {
        "You've hit a usage limit. Please wait a moment and try again."
    } else if lower.contains("not found") || lower.contains("404") {
        "We couldn't find that item. It may have been archived or removed."
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("transport")
    {
        "We couldn't reach the service. Check your connection and try again."
    } else if lower.contains("configuration") || lower.contains("api key") {
        "This feature isn't configured yet. Add the missing settings and try again."
    } else {
        "Something went wrong. Please try again."
    }
}
