//! Client configuration: base URL and bearer token.

use std::env;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use reqwest::header::HeaderValue;
use url::Url;

use crate::ApiError;

/// Environment variable holding the provider base URL.
pub const BASE_URL_ENV: &str = "PRODUCT_API_BASE_URL";
/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "PRODUCT_API_TOKEN";
/// Base URL used when [`BASE_URL_ENV`] is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Opaque bearer token attached to every request.
///
/// How the token is obtained is up to the caller; the client only checks that
/// it can be sent as a header value.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a caller-supplied token.
    pub fn new(token: impl Into<String>) -> Result<Self, ApiError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ApiError::invalid_token("token is empty"));
        }
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|error| ApiError::invalid_token(error.to_string()))?;
        Ok(Self(token))
    }

    /// Throwaway token made from the current UTC instant, e.g. `2019-01-14T11:34:18.045Z`.
    ///
    /// The example provider accepts any bearer value, so this is what local
    /// runs use when no token is configured.
    pub fn timestamp() -> Self {
        Self(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full `Authorization` header value.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Settings used to construct a [`crate::ProductClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: AuthToken,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: AuthToken) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }

    /// Read configuration from the environment.
    ///
    /// - `PRODUCT_API_BASE_URL`, falling back to [`DEFAULT_BASE_URL`]
    /// - `PRODUCT_API_TOKEN`, falling back to [`AuthToken::timestamp`]
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = non_empty_var(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let token = match non_empty_var(TOKEN_ENV) {
            Some(token) => AuthToken::new(token)?,
            None => AuthToken::timestamp(),
        };
        Ok(Self { base_url, token })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Validate a base URL and strip any trailing slash.
///
/// Rules:
/// - must parse as an absolute URL
/// - scheme must be `http` or `https`
/// - a host is required
pub(crate) fn normalize_base_url(base: &str) -> Result<String, ApiError> {
    let trimmed = base.trim();
    let parsed = Url::parse(trimmed).map_err(|error| ApiError::invalid_base_url(trimmed, error.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::invalid_base_url(
            trimmed,
            format!("scheme must be http or https; got '{}://'", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(ApiError::invalid_base_url(trimmed, "URL must include a host"));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}
