//! REST client for the telemetry/control API
//!
//! A single [`ApiClient`] serves as probe, node directory and metrics
//! reporter. Every response is wrapped in the [`ApiResponse`] envelope.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::{LinkStatus, MetricsReporter, NetworkProbe, NodeDirectory};
use crate::config::AdapterConfig;
use crate::edge::{EdgeNode, EdgeNodeMetrics};
use crate::metrics::SessionMetrics;

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without a trailing slash
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,

    /// Retry count for failed requests
    pub retry_count: u32,

    /// Retry delay
    pub retry_delay: Duration,
}

impl ClientConfig {
    /// Create a new client config
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(5),
            retry_count: 0,
            retry_delay: Duration::from_millis(250),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry count
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl From<&AdapterConfig> for ClientConfig {
    fn from(config: &AdapterConfig) -> Self {
        Self::new(config.api_base_url.clone()).with_timeout(config.request_timeout())
    }
}

// ============================================================================
// API Response Wrapper
// ============================================================================

/// Generic API response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful envelope around `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed envelope carrying `message`
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Unwrap the payload, turning `success: false` into an error
    pub fn into_data(self) -> Result<T, ClientError> {
        if !self.success {
            return Err(ClientError::Unavailable(
                self.error.unwrap_or_else(|| "request rejected".to_string()),
            ));
        }

        self.data
            .ok_or_else(|| ClientError::InvalidResponse("missing data".to_string()))
    }

    /// Check the envelope without requiring a payload
    pub fn into_unit(self) -> Result<(), ClientError> {
        if self.success {
            Ok(())
        } else {
            Err(ClientError::Unavailable(
                self.error.unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LatencyResponse {
    latency_ms: f64,
}

#[derive(Debug, Deserialize)]
struct BandwidthResponse {
    bandwidth_mbps: f64,
}

// ============================================================================
// API Client
// ============================================================================

/// HTTP client for the telemetry/control API
pub struct ApiClient {
    config: ClientConfig,
    http_client: Client,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    // Internal: GET request with retry
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiResponse<T>, ClientError> {
        let url = self.url(path);
        let mut last_error = None;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            match self.http_client.get(&url).send().await {
                Ok(response) => match Self::decode(response).await {
                    Ok(body) => return Ok(body),
                    Err(e) => last_error = Some(e),
                },
                Err(e) => last_error = Some(ClientError::from_reqwest(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::NetworkError("Unknown error".to_string())))
    }

    // Internal: POST request with retry
    async fn post_with_retry<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<R>, ClientError> {
        let url = self.url(path);
        let mut last_error = None;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            match self.http_client.post(&url).json(body).send().await {
                Ok(response) => match Self::decode(response).await {
                    Ok(body) => return Ok(body),
                    Err(e) => last_error = Some(e),
                },
                Err(e) => last_error = Some(ClientError::from_reqwest(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::NetworkError("Unknown error".to_string())))
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl NetworkProbe for ApiClient {
    async fn link_status(&self) -> Result<LinkStatus, ClientError> {
        self.get_with_retry::<LinkStatus>("/api/network/status")
            .await?
            .into_data()
    }

    async fn measure_latency(&self) -> Result<f64, ClientError> {
        let data = self
            .get_with_retry::<LatencyResponse>("/api/network/latency")
            .await?
            .into_data()?;
        Ok(data.latency_ms)
    }

    async fn measure_bandwidth(&self) -> Result<f64, ClientError> {
        let data = self
            .get_with_retry::<BandwidthResponse>("/api/network/bandwidth")
            .await?
            .into_data()?;
        Ok(data.bandwidth_mbps)
    }
}

#[async_trait]
impl NodeDirectory for ApiClient {
    async fn fetch_nodes(&self) -> Result<Vec<EdgeNode>, ClientError> {
        self.get_with_retry::<Vec<EdgeNode>>("/api/edge/nodes")
            .await?
            .into_data()
    }

    async fn check_node(&self, node: &EdgeNode) -> Result<f64, ClientError> {
        let started = Instant::now();
        self.get_with_retry::<serde_json::Value>(&format!("/api/edge/nodes/{}/health", node.id))
            .await?
            .into_unit()?;
        Ok(started.elapsed().as_secs_f64() * 1000.0)
    }

    async fn report_node_health(&self, metrics: &EdgeNodeMetrics) -> Result<(), ClientError> {
        self.post_with_retry::<_, serde_json::Value>(
            &format!("/api/edge/nodes/{}/health", metrics.node_id),
            metrics,
        )
        .await?
        .into_unit()
    }

    async fn connect_node(&self, node_id: &str) -> Result<(), ClientError> {
        self.post_with_retry::<_, serde_json::Value>(
            &format!("/api/edge/nodes/{node_id}/connect"),
            &serde_json::json!({ "node_id": node_id }),
        )
        .await?
        .into_unit()
    }
}

#[async_trait]
impl MetricsReporter for ApiClient {
    async fn report_session(&self, metrics: &SessionMetrics) -> Result<(), ClientError> {
        self.post_with_retry::<_, serde_json::Value>(
            &format!("/api/metrics/sessions/{}", metrics.session_id),
            metrics,
        )
        .await?
        .into_unit()
    }
}

// ============================================================================
// Client Errors
// ============================================================================

/// Client errors
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Initialization error
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// HTTP error
    #[error("HTTP error ({status}): {message}")]
    HttpError { status: u16, message: String },

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The API answered but reported the resource unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

impl ClientError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkError(e.to_string())
        }
    }

    /// Whether retrying later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::Unavailable(_) | Self::Timeout => true,
            Self::HttpError { status, .. } => *status >= 500 || *status == 429,
            Self::InitError(_) | Self::ParseError(_) | Self::InvalidResponse(_) => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
