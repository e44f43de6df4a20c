use crate::errors::AppError;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Reports workflow failures to the error-monitoring sink.
///
/// Every report is logged; when `ERROR_REPORT_URL` is configured the event is
/// also POSTed there as JSON. Delivery failures are logged and swallowed.
#[derive(Clone)]
pub struct ErrorReporter {
    client: reqwest::Client,
    sink_url: Option<String>,
    service: String,
}

impl ErrorReporter {
    pub fn new(sink_url: Option<String>, service: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            sink_url,
            service: service.into(),
        }
    }

    /// Record a failure. Returns the generated event id.
    pub async fn capture(&self, error: &AppError, context: &str) -> Uuid {
        let event_id = Uuid::new_v4();
        tracing::error!(
            event_id = %event_id,
            context = context,
            "Workflow failure reported: {}",
            error
        );

        let Some(url) = &self.sink_url else {
            return event_id;
        };

        let event = json!({
            "event_id": event_id,
            "service": self.service,
            "context": context,
            "message": error.to_string(),
            "status": error.status_code().as_u16(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        match self.client.post(url).json(&event).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Error report {} delivered", event_id);
            }
            Ok(response) => {
                tracing::warn!(
                    "Error sink rejected report {}: {}",
                    event_id,
                    response.status()
                );
            }
            Err(e) => tracing::warn!("Failed to deliver error report {}: {}", event_id, e),
        }
        event_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_capture_posts_to_sink() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/errors"))
            .and(body_partial_json(json!({
                "service": "lead-automations",
                "context": "gmail webhook",
                "status": 500
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let reporter = ErrorReporter::new(
            Some(format!("{}/errors", server.uri())),
            "lead-automations",
        );
        let err = AppError::upstream("notion", Some(503), "unavailable");
        reporter.capture(&err, "gmail webhook").await;
    }

    #[tokio::test]
    async fn test_capture_without_sink_only_logs() {
        let reporter = ErrorReporter::new(None, "lead-automations");
        let err = AppError::InternalError("boom".into());
        let id = reporter.capture(&err, "test").await;
        assert_ne!(id, Uuid::nil());
    }
}
