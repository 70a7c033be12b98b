//! HTTP implementation of the dubbing provider client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{DubbingProvider, ProviderError, RemoteStatus, SubmitRequest};

/// Connection settings for the dubbing service.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: Url,
    pub api_key: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Dubbing client speaking the provider's HTTP API with bearer auth.
pub struct HttpDubbingProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

impl HttpDubbingProvider {
    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| ProviderError::Permanent(format!("invalid endpoint {path}: {e}")))
    }

    fn map_transport_error(error: reqwest::Error) -> ProviderError {
        // Connection problems and timeouts are worth retrying; a request the
        // client itself could not construct is not.
        if error.is_builder() {
            ProviderError::Permanent(error.to_string())
        } else {
            ProviderError::Transient(error.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), retry_after, body))
    }
}

#[async_trait]
impl DubbingProvider for HttpDubbingProvider {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, ProviderError> {
        let file_name = request
            .input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment".to_string());
        let bytes = tokio::fs::read(&request.input_path)
            .await
            .map_err(|e| ProviderError::Permanent(format!("cannot read segment file: {e}")))?;

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("target_language", request.target_language.clone())
            .text("watermark", request.watermark.to_string());

        let url = self.endpoint("v1/dubbing")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.request_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        let response = Self::check_status(response).await?;

        let submit: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("malformed submit response: {e}")))?;
        debug!(remote_job_id = %submit.job_id, "Submitted segment for dubbing");
        Ok(submit.job_id)
    }

    async fn status(&self, remote_job_id: &str) -> Result<RemoteStatus, ProviderError> {
        let url = self.endpoint(&format!("v1/dubbing/{remote_job_id}"))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("malformed status response: {e}")))
    }

    async fn download(
        &self,
        remote_job_id: &str,
        audio_url: Option<String>,
        language: &str,
    ) -> Result<Bytes, ProviderError> {
        let url = match audio_url {
            Some(url) => Url::parse(&url)
                .map_err(|e| ProviderError::Permanent(format!("invalid audio url: {e}")))?,
            None => self.endpoint(&format!("v1/dubbing/{remote_job_id}/audio/{language}"))?,
        };

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        let response = Self::check_status(response).await?;

        response
            .bytes()
            .await
            .map_err(Self::map_transport_error)
    }
}
