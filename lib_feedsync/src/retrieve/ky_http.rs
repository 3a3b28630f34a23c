//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with middleware support
//! for exponential backoff retries and standardized JSON response handling.
//!
//! Non-2xx responses are not errors at this layer: they come back as an
//! `ApiResponse` with `success == false` and the raw body, so callers can map
//! them to their own error kinds.

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Failures that prevented a request from producing a response.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed after retries: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// Tuning for an `ApiClient`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Retries on transient failures (connect errors, 5xx, 429).
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Headers sent with every request.
    pub default_headers: HeaderMap,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(10),
            default_headers: HeaderMap::new(),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and automatic retries.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// An optional Bearer token used for authorization.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client with the default retry policy and timeout.
    ///
    /// `base_url` must be absolute; keep the trailing slash so relative paths
    /// join beneath it.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, ApiError> {
        Self::with_options(base_url, auth_token, ClientOptions::default())
    }

    pub fn with_options(
        base_url: &str,
        auth_token: Option<String>,
        options: ClientOptions,
    ) -> Result<Self, ApiError> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .default_headers(options.default_headers)
            .build()?;
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins `path` to the base URL and appends `query` pairs, percent-encoded.
    pub fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Performs an HTTP request and handles the response.
    ///
    /// An empty success body deserializes as JSON `null`, so `T = ()` works for
    /// endpoints that answer with no content.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.build_url(path, query)?;
        log::debug!("{} {}", method, full_url);
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let text = response.text().await?;
            let data = if text.trim().is_empty() {
                serde_json::from_str::<T>("null")?
            } else {
                serde_json::from_str::<T>(&text)?
            };
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            // Capture the error body as a string for debugging
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_under_the_base() {
        let api = ApiClient::new("https://xyz.supabase.co/", None).unwrap();
        let url = api.build_url("rest/v1/content", &[]).unwrap();
        assert_eq!(url.as_str(), "https://xyz.supabase.co/rest/v1/content");
    }

    #[test]
    fn query_values_are_encoded() {
        let api = ApiClient::new("https://xyz.supabase.co/", None).unwrap();
        let url = api
            .build_url("rest/v1/follows", &[("creator_name", "eq.DJ Nova&Co")])
            .unwrap();
        assert_eq!(
            url.query_pairs().next().map(|(k, v)| (k.into_owned(), v.into_owned())),
            Some(("creator_name".to_string(), "eq.DJ Nova&Co".to_string()))
        );
        assert!(!url.as_str().contains("Nova&Co"));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(ApiError::Url(_))
        ));
    }
}
