//! Error type for Product API calls.

use thiserror::Error;

const BODY_PREVIEW_LIMIT: usize = 200;

/// Errors surfaced by [`crate::ProductClient`].
///
/// A missing product is not a distinct variant: a `404` is reported through
/// [`ApiError::RequestFailed`] like any other non-2xx status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed with status code {status}")]
    RequestFailed { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse JSON response (status {status}): {source}. body preview: {body_preview}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
        body_preview: String,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid authorization token: {reason}")]
    InvalidToken { reason: String },

    #[error("product id must not be empty")]
    EmptyProductId,
}

impl ApiError {
    /// Create a request failed error for a non-2xx response.
    pub fn request_failed(status: u16, body: impl Into<String>) -> Self {
        Self::RequestFailed { status, body: body.into() }
    }

    /// Create a decode error, keeping a whitespace-collapsed preview of the body.
    pub fn decode(status: u16, source: serde_json::Error, body: &str) -> Self {
        Self::Decode {
            status,
            source,
            body_preview: truncate_preview(body, BODY_PREVIEW_LIMIT),
        }
    }

    /// Create an invalid base URL error.
    pub fn invalid_base_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBaseUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid token error.
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken { reason: reason.into() }
    }

    /// HTTP status attached to the error, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } | Self::Decode { status, .. } => Some(*status),
            Self::Transport(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// True for a `RequestFailed` carrying `404`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RequestFailed { status: 404, .. })
    }
}

fn truncate_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}
