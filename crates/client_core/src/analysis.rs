//! Boundary to the service that turns an image into a prediction or a
//! classification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{
    domain::{AnalysisMode, ImageHandle},
    error::{ErrorCode, ErrorInfo},
    protocol::{AnalysisResult, AnalyzeRequest},
};
use tracing::{debug, warn};
use url::Url;

use crate::error::WorkflowError;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Analyzes `image`; the returned variant must match `mode`.
    async fn submit(
        &self,
        image: &ImageHandle,
        mode: AnalysisMode,
    ) -> Result<AnalysisResult, WorkflowError>;
}

pub struct MissingAnalysisBackend;

#[async_trait]
impl AnalysisBackend for MissingAnalysisBackend {
    async fn submit(
        &self,
        _image: &ImageHandle,
        mode: AnalysisMode,
    ) -> Result<AnalysisResult, WorkflowError> {
        Err(WorkflowError::unavailable(format!(
            "no {mode} backend is configured"
        )))
    }
}

/// Talks to a remote `POST /analyze` endpoint.
pub struct HttpAnalysisBackend {
    http: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpAnalysisBackend {
    pub fn new(base_url: &Url) -> Result<Self, WorkflowError> {
        let endpoint = base_url
            .join("analyze")
            .map_err(|e| WorkflowError::unavailable(format!("invalid analysis url: {e}")))?;
        Ok(Self {
            http: Client::new(),
            endpoint,
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    fn transport_error(&self, err: reqwest::Error) -> WorkflowError {
        if err.is_timeout() {
            WorkflowError::Timeout(self.timeout)
        } else {
            WorkflowError::unavailable(format!("analysis service unreachable: {err}"))
        }
    }

    fn status_error(&self, status: StatusCode, body: &[u8]) -> WorkflowError {
        let info = serde_json::from_slice::<ErrorInfo>(body).unwrap_or_else(|_| {
            ErrorInfo::new(
                ErrorCode::from_http_status(status.as_u16()),
                format!("analysis service responded with {status}"),
            )
        });
        match info.code {
            ErrorCode::Validation => WorkflowError::Validation(info.message),
            ErrorCode::Timeout => WorkflowError::Timeout(self.timeout),
            ErrorCode::NotFound | ErrorCode::ServiceUnavailable => {
                WorkflowError::ServiceUnavailable(info.message)
            }
        }
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn submit(
        &self,
        image: &ImageHandle,
        mode: AnalysisMode,
    ) -> Result<AnalysisResult, WorkflowError> {
        let request = AnalyzeRequest {
            image_ref: image.origin_ref.clone(),
            mode,
        };
        debug!(endpoint = %self.endpoint, image_ref = %request.image_ref, %mode, "submitting analysis");

        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            let err = self.status_error(status, &body);
            warn!(%status, error = %err, "analysis request rejected");
            return Err(err);
        }

        serde_json::from_slice::<AnalysisResult>(&body)
            .map_err(|e| WorkflowError::unavailable(format!("malformed analysis payload: {e}")))
    }
}

#[cfg(test)]
#[path = "tests/analysis_tests.rs"]
mod tests;
