//! Recognition backends.
//!
//! [`RecognitionAdapter`] is the seam between the retry engine and whatever
//! actually reads a page. [`HttpRecognitionAdapter`] talks to the bundled
//! recognition server over multipart HTTP; tests substitute scripted fakes.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::AdapterError;
use crate::model::{RecognitionResult, RecognizeOptions};

/// A backend that turns page image bytes into a [`RecognitionResult`].
#[async_trait]
pub trait RecognitionAdapter: Send + Sync {
    /// Recognize one page. A cancelled `cancel` token must abort the call
    /// promptly with an error the caller treats as cancellation, not
    /// failure.
    async fn process(
        &self,
        image: &[u8],
        options: &RecognizeOptions,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, AdapterError>;
}

// ── HTTP adapter ────────────────────────────────────────────────────────────

/// Adapter for the HTTP recognition endpoint.
///
/// Posts the page as a multipart form (`file` plus `prompt_type`) and
/// decodes the JSON body into a [`RecognitionResult`].
pub struct HttpRecognitionAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRecognitionAdapter {
    pub fn new(config: &PipelineConfig) -> Self {
        HttpRecognitionAdapter {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
        }
    }

    async fn post(
        &self,
        image: &[u8],
        options: &RecognizeOptions,
    ) -> Result<RecognitionResult, AdapterError> {
        let form = Form::new()
            .part(
                "file",
                Part::bytes(image.to_vec())
                    .file_name("image.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| AdapterError::Other(e.to_string()))?,
            )
            .text("prompt_type", options.prompt_type.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout
                } else {
                    AdapterError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => AdapterError::RateLimited,
                503 => AdapterError::QueueFull,
                code => AdapterError::Api { status: code, message },
            });
        }

        response
            .json::<RecognitionResult>()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl RecognitionAdapter for HttpRecognitionAdapter {
    async fn process(
        &self,
        image: &[u8],
        options: &RecognizeOptions,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, AdapterError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(endpoint = %self.endpoint, "recognition request cancelled");
                Err(AdapterError::Other("cancelled".to_string()))
            }
            result = self.post(image, options) => result,
        }
    }
}
