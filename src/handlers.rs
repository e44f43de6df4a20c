use crate::config::Config;
use crate::errors::AppError;
use crate::integrations::crm::CrmClient;
use crate::integrations::email::EmailClient;
use crate::integrations::gmail::GmailClient;
use crate::integrations::notion::NotionClient;
use crate::integrations::slack::SlackClient;
use crate::monitoring::ErrorReporter;
use crate::routes::AUTOMATIONS;
use axum::{extract::State, http::StatusCode, Json};
use moka::future::Cache;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const SERVICE_NAME: &str = "lead-automations";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Structured-records store (leads, companies, contacts).
    pub notion: NotionClient,
    /// Team-chat channel.
    pub slack: SlackClient,
    /// Transactional email sender.
    pub email: EmailClient,
    /// CRM (optional; sync is skipped when absent).
    pub crm: Option<CrmClient>,
    /// Gmail API (optional; push notifications are ignored when absent).
    pub gmail: Option<GmailClient>,
    /// Error-monitoring sink.
    pub reporter: ErrorReporter,
    /// Gmail message ids already turned into leads (24 hour TTL).
    pub processed_messages: Cache<String, i64>,
    /// Recently handled webhook deliveries, keyed per source (10 minute TTL).
    /// Used to skip provider redeliveries of the same event.
    pub recent_events: Cache<String, i64>,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let processed_messages = Cache::builder()
            .time_to_live(Duration::from_secs(86400))
            .max_capacity(10_000)
            .build();

        let recent_events = Cache::builder()
            .time_to_live(Duration::from_secs(600))
            .max_capacity(10_000)
            .build();

        Ok(Self {
            notion: NotionClient::new(&config)?,
            slack: SlackClient::new(&config)?,
            email: EmailClient::new(&config)?,
            crm: CrmClient::from_config(&config)?,
            gmail: GmailClient::from_config(&config)?,
            reporter: ErrorReporter::new(config.error_report_url.clone(), SERVICE_NAME),
            processed_messages,
            recent_events,
            config,
        })
    }
}

/// GET /
pub async fn index() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "automations": "/automations"
        })),
    )
}

/// GET /automations
///
/// Lists the registered automation modules and their webhook endpoints.
pub async fn list_automations() -> Json<Value> {
    let modules: Vec<Value> = AUTOMATIONS
        .iter()
        .map(|module| {
            json!({
                "slug": module.slug,
                "name": module.name,
                "description": module.description,
                "health": format!("/automations/{}/health", module.slug),
                "webhooks": module
                    .webhooks
                    .iter()
                    .map(|w| format!("/automations/{}/webhooks/{}", module.slug, w))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    Json(json!({ "automations": modules }))
}

/// GET /automations/lead-management/health
///
/// Reports which optional integrations are enabled.
pub async fn lead_management_health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "module": "lead-management",
            "integrations": {
                "notion": true,
                "slack": true,
                "email": true,
                "crm": state.crm.is_some(),
                "gmail": state.gmail.is_some(),
                "calcom_signature": state.config.calcom_webhook_secret.is_some(),
                "slack_signature": state.config.slack_signing_secret.is_some(),
            }
        })),
    )
}
