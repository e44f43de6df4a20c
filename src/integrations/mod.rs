//! External service integrations.
//!
//! Each client is a thin wrapper over a vendor REST API. All calls go through
//! [`Upstream::send_json`], which retries transient failures and trips a
//! per-service circuit breaker.

pub mod crm;
pub mod email;
pub mod gmail;
pub mod notion;
pub mod slack;

use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamBreaker};
use crate::errors::AppError;
use crate::retry::{with_retry, RetryPolicy};
use serde_json::Value;
use std::time::Duration;

/// Shared HTTP plumbing for one upstream service.
#[derive(Clone)]
pub struct Upstream {
    service: &'static str,
    client: reqwest::Client,
    retry: RetryPolicy,
    breaker: UpstreamBreaker,
}

impl Upstream {
    pub fn new(service: &'static str, retry: RetryPolicy) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create {} client: {}", service, e))
            })?;

        Ok(Self {
            service,
            client,
            retry,
            breaker: create_upstream_circuit_breaker(),
        })
    }

    /// Send a request built by `build`, retrying per the policy.
    ///
    /// `build` is invoked once per attempt. Non-2xx responses become
    /// [`AppError::ExternalApiError`] carrying the status; an empty body
    /// yields `Value::Null`.
    pub async fn send_json<F>(&self, operation: &str, build: F) -> Result<Value, AppError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let label = format!("{} {}", self.service, operation);
        with_retry(&self.retry, &label, || async {
            if !self.breaker.is_call_permitted() {
                tracing::warn!("Circuit open for {}, rejecting {}", self.service, operation);
                return Err(AppError::CircuitOpen(self.service));
            }

            let outcome = self.attempt(&build).await;
            match &outcome {
                Ok(_) => self.breaker.on_success(),
                // Client errors say nothing about upstream health
                Err(e) if e.is_retryable() => self.breaker.on_error(),
                Err(_) => self.breaker.on_success(),
            }
            outcome
        })
        .await
    }

    async fn attempt<F>(&self, build: &F) -> Result<Value, AppError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let response = build(&self.client).send().await.map_err(|e| {
            AppError::upstream(self.service, None, format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::upstream(
                self.service,
                Some(status.as_u16()),
                format!("returned {}: {}", status, error_text),
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            AppError::upstream(self.service, None, format!("failed to read body: {}", e))
        })?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::upstream(
                self.service,
                Some(status.as_u16()),
                format!("failed to parse response: {}", e),
            )
        })
    }
}

/// Read a string field from a JSON response, erroring if absent.
pub(crate) fn required_str(
    value: &Value,
    pointer: &str,
    service: &'static str,
) -> Result<String, AppError> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::warn!("Unexpected {} response format: {:?}", service, value);
            AppError::upstream(service, None, format!("response missing '{}'", pointer))
        })
}
