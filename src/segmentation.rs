//! Segmentation service boundary and the Photoroom HTTP client.
//!
//! A [`SegmentationService`] takes encoded image bytes and returns the same
//! image with its background made transparent. [`PhotoroomClient`] talks to
//! the Photoroom `segment` endpoint using [`reqwest`].

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::SegmentationConfig;
use crate::error::RemovalFailure;

/// Errors from the segmentation service layer.
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("segmentation API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The response body was not the expected payload.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<SegmentationError> for RemovalFailure {
    fn from(err: SegmentationError) -> Self {
        match err {
            SegmentationError::Request(e) if e.is_timeout() => Self::TimedOut,
            SegmentationError::Request(e) => Self::Transport(e.to_string()),
            SegmentationError::Api { code, message, .. } => Self::Service { code, message },
            SegmentationError::Decode(detail) => Self::MalformedPayload(detail),
        }
    }
}

/// A remote (or in-process) background-removal service.
#[async_trait]
pub trait SegmentationService: Send + Sync {
    /// Returns `image` with its background removed, as encoded image bytes.
    async fn segment(&self, image: &[u8]) -> Result<Vec<u8>, SegmentationError>;
}

// ============================================================================
// Photoroom
// ============================================================================

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    result_b64: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the Photoroom segmentation API.
pub struct PhotoroomClient {
    client: reqwest::Client,
    config: SegmentationConfig,
}

impl PhotoroomClient {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: SegmentationConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Segments an image the service fetches itself from `image_url`.
    pub async fn segment_url(&self, image_url: &str) -> Result<Vec<u8>, SegmentationError> {
        let form = Self::base_form().text("image_url", image_url.to_string());
        self.send(form).await
    }

    // ---- private helpers ----

    /// Fields shared by every request: transparent PNG, uncropped.
    fn base_form() -> Form {
        Form::new()
            .text("bg_color", "transparent")
            .text("format", "PNG")
            .text("crop", "false")
    }

    async fn send(&self, form: Form) -> Result<Vec<u8>, SegmentationError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let payload: SegmentResponse = response
            .json()
            .await
            .map_err(|e| SegmentationError::Decode(e.to_string()))?;
        decode_result(&payload.result_b64)
    }
}

#[async_trait]
impl SegmentationService for PhotoroomClient {
    async fn segment(&self, image: &[u8]) -> Result<Vec<u8>, SegmentationError> {
        let part = Part::bytes(image.to_vec()).file_name("image.png");
        let form = Self::base_form().part("image_file", part);

        tracing::debug!(
            bytes = image.len(),
            url = %self.config.api_url,
            "Sending segmentation request"
        );
        self.send(form).await
    }
}

/// Builds an API error from a non-2xx body, using `{error, message}` when
/// the body has that shape and the raw text otherwise.
fn api_error(status: u16, body: &str) -> SegmentationError {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error.unwrap_or_else(|| format!("http_{status}"));
    let message = parsed
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP error! status: {status}")
            } else {
                body.trim().to_string()
            }
        });
    SegmentationError::Api {
        status,
        code,
        message,
    }
}

fn decode_result(result_b64: &str) -> Result<Vec<u8>, SegmentationError> {
    if result_b64.is_empty() {
        return Err(SegmentationError::Decode("empty result_b64".into()));
    }
    STANDARD
        .decode(result_b64)
        .map_err(|e| SegmentationError::Decode(format!("result_b64: {e}")))
}
