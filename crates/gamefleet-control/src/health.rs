//! Per-instance health reporting.
//!
//! This module provides the `HealthReporter` trait used by the controller to
//! poll each instance's health endpoint, and the `HttpHealthReporter`
//! implementation that issues the actual HTTP calls.
//!
//! A failed report is an expected condition, not an exceptional one: the
//! caller treats the instance's capacity as 0 for aggregation and marks it
//! unresponsive. The reporter therefore returns a typed result and never
//! panics on failure modes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single successful health report from an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Capacity the instance advertises for future connections. Advisory;
    /// may be stale by up to one poll interval.
    pub available_capacity: u32,
    /// Whether the instance can be terminated without disrupting sessions.
    pub ready_to_close: bool,
}

/// Errors that can occur when polling an instance's health endpoint.
#[derive(Debug, Clone, Error)]
pub enum HealthCheckError {
    /// The endpoint could not be reached.
    #[error("health endpoint unreachable: {0}")]
    Unreachable(String),

    /// The request did not complete within the configured timeout.
    #[error("health check timed out: {0}")]
    Timeout(String),

    /// The endpoint responded with a non-success status.
    #[error("health endpoint {endpoint} returned status {status}")]
    Status {
        /// The endpoint that was polled.
        endpoint: String,
        /// The HTTP status code returned.
        status: u16,
    },

    /// The response body could not be parsed as a health report.
    #[error("malformed health response: {0}")]
    Malformed(String),
}

/// A specialized Result type for health polling.
pub type HealthResult = std::result::Result<HealthReport, HealthCheckError>;

/// The `HealthReporter` trait defines the per-instance health poll.
#[async_trait]
pub trait HealthReporter: Send + Sync {
    /// Poll the instance at `endpoint` (`host:port`) once.
    ///
    /// # Errors
    ///
    /// Returns a `HealthCheckError` on network failure, timeout, non-success
    /// status, or a malformed response body.
    async fn report(&self, endpoint: &str) -> HealthResult;
}

/// HTTP implementation of the health reporter.
///
/// Polls `http://{endpoint}/health/` and deserializes the JSON body.
#[derive(Debug, Clone)]
pub struct HttpHealthReporter {
    client: reqwest::Client,
}

impl HttpHealthReporter {
    /// Create a new HTTP health reporter with the given request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Create a new health reporter with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthReporter for HttpHealthReporter {
    async fn report(&self, endpoint: &str) -> HealthResult {
        let url = format!("http://{endpoint}/health/");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                HealthCheckError::Timeout(endpoint.to_string())
            } else {
                HealthCheckError::Unreachable(format!("{endpoint}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HealthCheckError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<HealthReport>()
            .await
            .map_err(|e| HealthCheckError::Malformed(e.to_string()))
    }
}

/// A scripted health reporter for testing the control loop without real
/// instances.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, HealthCheckError, HealthReporter, HealthResult};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// A mock health reporter driven by per-endpoint scripts.
    ///
    /// Scripted responses are consumed in order; once a script is exhausted,
    /// the fallback for that endpoint (if any) is returned. Endpoints without
    /// script or fallback report as unreachable.
    #[derive(Default)]
    pub struct MockHealthReporter {
        scripts: Mutex<HashMap<String, VecDeque<HealthResult>>>,
        fallbacks: Mutex<HashMap<String, HealthResult>>,
    }

    impl MockHealthReporter {
        /// Create a new mock reporter with no scripted responses.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a one-shot response for an endpoint.
        pub fn script(&self, endpoint: impl Into<String>, result: HealthResult) {
            self.scripts
                .lock()
                .entry(endpoint.into())
                .or_default()
                .push_back(result);
        }

        /// Set the response returned when an endpoint's script is exhausted.
        pub fn set_fallback(&self, endpoint: impl Into<String>, result: HealthResult) {
            self.fallbacks.lock().insert(endpoint.into(), result);
        }
    }

    #[async_trait]
    impl HealthReporter for MockHealthReporter {
        async fn report(&self, endpoint: &str) -> HealthResult {
            if let Some(queue) = self.scripts.lock().get_mut(endpoint) {
                if let Some(result) = queue.pop_front() {
                    return result;
                }
            }
            if let Some(result) = self.fallbacks.lock().get(endpoint) {
                return result.clone();
            }
            Err(HealthCheckError::Unreachable(format!(
                "{endpoint}: no scripted response"
            )))
        }
    }
}
