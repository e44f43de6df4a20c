use crate::retry::RetryPolicy;
use std::time::Duration;

/// OAuth credentials and query settings for the Gmail push integration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub api_base_url: String,
    pub token_url: String,
    /// Gmail search query used to list candidate messages.
    pub query: String,
    /// Only messages whose subject contains this text (case-insensitive) become leads.
    pub subject_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub notion_token: String,
    pub notion_base_url: String,
    pub notion_leads_db: String,
    pub notion_companies_db: String,
    pub notion_contacts_db: String,
    pub slack_bot_token: String,
    pub slack_base_url: String,
    pub slack_channel_id: String,
    pub slack_signing_secret: Option<String>,
    pub email_api_key: String,
    pub email_base_url: String,
    pub email_from: String,
    pub scheduling_link: String,
    pub crm_token: Option<String>,
    pub crm_base_url: String,
    pub calcom_webhook_secret: Option<String>,
    pub gmail: Option<GmailConfig>,
    pub error_report_url: Option<String>,
    pub retry: RetryPolicy,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let retry = RetryPolicy::exponential(
            parsed_var("RETRY_MAX_ATTEMPTS", 3)?,
            Duration::from_millis(parsed_var("RETRY_MIN_DELAY_MS", 500)?),
            Duration::from_millis(parsed_var("RETRY_MAX_DELAY_MS", 5000)?),
        );

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            notion_token: required_var("NOTION_TOKEN")?,
            notion_base_url: url_var("NOTION_BASE_URL", "https://api.notion.com/v1")?,
            notion_leads_db: required_var("NOTION_LEADS_DATABASE_ID")?,
            notion_companies_db: required_var("NOTION_COMPANIES_DATABASE_ID")?,
            notion_contacts_db: required_var("NOTION_CONTACTS_DATABASE_ID")?,
            slack_bot_token: required_var("SLACK_BOT_TOKEN")?,
            slack_base_url: url_var("SLACK_BASE_URL", "https://slack.com/api")?,
            slack_channel_id: required_var("SLACK_CHANNEL_ID")?,
            slack_signing_secret: optional_var("SLACK_SIGNING_SECRET"),
            email_api_key: required_var("EMAIL_API_KEY")?,
            email_base_url: url_var("EMAIL_BASE_URL", "https://api.resend.com")?,
            email_from: required_var("EMAIL_FROM")?,
            scheduling_link: required_var("SCHEDULING_LINK").and_then(|link| {
                if !link.starts_with("http://") && !link.starts_with("https://") {
                    anyhow::bail!("SCHEDULING_LINK must start with http:// or https://");
                }
                Ok(link)
            })?,
            crm_token: optional_var("CRM_TOKEN"),
            crm_base_url: url_var("CRM_BASE_URL", "https://api.hubapi.com")?,
            calcom_webhook_secret: optional_var("CALCOM_WEBHOOK_SECRET"),
            gmail: gmail_from_env()?,
            error_report_url: optional_var("ERROR_REPORT_URL"),
            retry,
            rate_limit_per_second: parsed_var("RATE_LIMIT_PER_SECOND", 10)?,
            rate_limit_burst: parsed_var("RATE_LIMIT_BURST", 20)?,
        };

        // Log configuration shape (without sensitive values)
        tracing::debug!("Notion Base URL: {}", config.notion_base_url);
        tracing::debug!("Slack channel: {}", config.slack_channel_id);
        if config.slack_signing_secret.is_none() {
            tracing::warn!("SLACK_SIGNING_SECRET not set; Slack callbacks are not verified");
        }
        if config.calcom_webhook_secret.is_none() {
            tracing::warn!("CALCOM_WEBHOOK_SECRET not set; Cal.com webhooks are not verified");
        }
        if config.crm_token.is_none() {
            tracing::info!("CRM_TOKEN not set; CRM sync disabled");
        }
        if config.gmail.is_none() {
            tracing::info!("Gmail credentials not set; Gmail push webhook disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value.trim().to_string())
        })
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = optional_var(name).unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}

/// Gmail is enabled only when all three OAuth credentials are present.
fn gmail_from_env() -> anyhow::Result<Option<GmailConfig>> {
    let client_id = optional_var("GMAIL_CLIENT_ID");
    let client_secret = optional_var("GMAIL_CLIENT_SECRET");
    let refresh_token = optional_var("GMAIL_REFRESH_TOKEN");

    match (client_id, client_secret, refresh_token) {
        (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(Some(GmailConfig {
            client_id,
            client_secret,
            refresh_token,
            api_base_url: url_var(
                "GMAIL_API_BASE_URL",
                "https://gmail.googleapis.com/gmail/v1/users/me",
            )?,
            token_url: url_var("GMAIL_TOKEN_URL", "https://oauth2.googleapis.com/token")?,
            query: optional_var("GMAIL_QUERY").unwrap_or_else(|| "is:unread in:inbox".to_string()),
            subject_filter: optional_var("GMAIL_SUBJECT_FILTER"),
        })),
        (None, None, None) => Ok(None),
        _ => anyhow::bail!(
            "GMAIL_CLIENT_ID, GMAIL_CLIENT_SECRET and GMAIL_REFRESH_TOKEN must be set together"
        ),
    }
}
