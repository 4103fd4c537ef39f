//! GeminiClient - handles communication with the Gemini and Veo REST APIs.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;

use super::retry::{message_has_rate_limit_signature, RateLimitSignature};
use super::types::{
    ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, Operation, VideoInstance,
    VideoParameters, VideoRequest,
};

/// The environment variable name for the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Legacy variable name, read when `GEMINI_API_KEY` is not set.
pub const FALLBACK_API_KEY_ENV: &str = "API_KEY";

/// Default base URL for the Gemini API.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// API version path segment.
const API_VERSION: &str = "v1beta";

/// Header carrying the API key on JSON endpoints.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Default timeout for HTTP requests. Generated clips can take a while to
/// download.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Google API status string for quota exhaustion.
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Client for the Gemini text, speech and Veo video endpoints.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new GeminiClient by reading the API key from the environment.
    ///
    /// Reads `GEMINI_API_KEY`, falling back to `API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::MissingApiKey` if neither variable is set.
    pub fn new() -> Result<Self, GeminiError> {
        let api_key = std::env::var(GEMINI_API_KEY_ENV)
            .or_else(|_| std::env::var(FALLBACK_API_KEY_ENV))
            .map_err(|_| GeminiError::MissingApiKey)?;
        Self::with_api_key(api_key)
    }

    /// Create a new GeminiClient with an explicit API key.
    pub fn with_api_key(api_key: String) -> Result<Self, GeminiError> {
        Self::with_base_url(api_key, GEMINI_API_BASE_URL.to_string())
    }

    /// Create a new GeminiClient with a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, GeminiError> {
        if api_key.trim().is_empty() {
            return Err(GeminiError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Get the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/{}/models/{}:{}",
            self.base_url, API_VERSION, model, method
        )
    }

    /// Call `generateContent` on `model`.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::RateLimit` when the API is throttling,
    /// `GeminiError::Api` for any other error response, or
    /// `GeminiError::HttpError` if the request fails.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let url = self.model_url(model, "generateContent");
        log::debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| GeminiError::Decode(format!("generateContent response: {}", e)))
    }

    /// Submit a video generation job and return its long-running operation.
    pub async fn submit_video(
        &self,
        model: &str,
        prompt: &str,
        parameters: &VideoParameters,
    ) -> Result<Operation, GeminiError> {
        let url = self.model_url(model, "predictLongRunning");
        let request = VideoRequest {
            instances: vec![VideoInstance {
                prompt: prompt.to_string(),
            }],
            parameters: parameters.clone(),
        };

        log::info!("Submitting video generation to {}", model);
        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let operation: Operation = response
            .json()
            .await
            .map_err(|e| GeminiError::Decode(format!("operation: {}", e)))?;
        log::info!("Video operation started: {}", operation.name);
        Ok(operation)
    }

    /// Fetch the current state of a long-running operation by name.
    pub async fn get_operation(&self, name: &str) -> Result<Operation, GeminiError> {
        let url = format!("{}/{}/{}", self.base_url, API_VERSION, name);

        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| GeminiError::Decode(format!("operation: {}", e)))
    }

    /// Download a generated file, authenticating with a `key` query parameter.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::Download` with the status and response body if the
    /// server does not answer with a success status.
    pub async fn download(&self, uri: &str) -> Result<Vec<u8>, GeminiError> {
        let url = with_key_param(uri, &self.api_key);
        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GeminiError::Download {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            });
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        log::debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes)
    }
}

/// Append the API key as a query parameter.
fn with_key_param(uri: &str, api_key: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{}{}key={}", uri, separator, api_key)
}

/// Parse the Retry-After header value in seconds.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Map a non-success response to the matching error, passing success through.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GeminiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_secs = parse_retry_after(&response);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(classify_failure(status, retry_after_secs, body))
}

/// Classify an error response using the structured status where possible.
fn classify_failure(status: StatusCode, retry_after_secs: Option<u64>, body: String) -> GeminiError {
    let api_status = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error.status);

    if status == StatusCode::TOO_MANY_REQUESTS || api_status.as_deref() == Some(RESOURCE_EXHAUSTED)
    {
        log::warn!(
            "Rate limited by Gemini API ({}). Retry-After: {:?} seconds",
            status,
            retry_after_secs
        );
        return GeminiError::RateLimit {
            message: body,
            retry_after_secs,
        };
    }

    GeminiError::Api {
        status: status.as_u16(),
        body,
    }
}

/// Errors that can occur talking to the Gemini API.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limited (429 RESOURCE_EXHAUSTED): {message}")]
    RateLimit {
        /// Response body of the throttled request
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to download video. Status: {status} {reason}. Details: {body}")]
    Download {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RateLimitSignature for GeminiError {
    fn is_rate_limited(&self) -> bool {
        match self {
            GeminiError::RateLimit { .. } => true,
            GeminiError::Api { status, body } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
                    || message_has_rate_limit_signature(body)
            }
            _ => false,
        }
    }
}
