#![allow(dead_code)]

use lead_automations::config::{Config, GmailConfig};
use lead_automations::handlers::AppState;
use lead_automations::retry::RetryPolicy;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LEADS_DB: &str = "leads-db";
pub const COMPANIES_DB: &str = "companies-db";
pub const CONTACTS_DB: &str = "contacts-db";

/// Config with every upstream pointed at `base` under its own prefix.
pub fn test_config(base: &str) -> Config {
    Config {
        port: 0,
        notion_token: "secret_notion".to_string(),
        notion_base_url: format!("{}/notion", base),
        notion_leads_db: LEADS_DB.to_string(),
        notion_companies_db: COMPANIES_DB.to_string(),
        notion_contacts_db: CONTACTS_DB.to_string(),
        slack_bot_token: "xoxb-test".to_string(),
        slack_base_url: format!("{}/slack", base),
        slack_channel_id: "C123".to_string(),
        slack_signing_secret: None,
        email_api_key: "re_test".to_string(),
        email_base_url: format!("{}/email", base),
        email_from: "Team <hello@agency.io>".to_string(),
        scheduling_link: "https://cal.com/agency/intro".to_string(),
        crm_token: None,
        crm_base_url: format!("{}/crm", base),
        calcom_webhook_secret: None,
        gmail: None,
        error_report_url: None,
        retry: RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(5)),
        rate_limit_per_second: 10,
        rate_limit_burst: 20,
    }
}

pub fn gmail_config(base: &str) -> GmailConfig {
    GmailConfig {
        client_id: "client".to_string(),
        client_secret: "client-secret".to_string(),
        refresh_token: "refresh".to_string(),
        api_base_url: format!("{}/gmail/users/me", base),
        token_url: format!("{}/oauth/token", base),
        query: "is:unread in:inbox".to_string(),
        subject_filter: None,
    }
}

pub fn test_state(config: Config) -> AppState {
    AppState::from_config(config).expect("state builds from test config")
}

/// A leads-database page as returned by the records store.
pub fn lead_page(id: &str, email: &str, status: &str, slack_ts: Option<&str>) -> Value {
    let mut page = json!({
        "object": "page",
        "id": id,
        "properties": {
            "Name": { "title": [{ "plain_text": "Ada Lovelace" }] },
            "Email": { "email": email },
            "Company": { "rich_text": [{ "plain_text": "Analytical Engines" }] },
            "Budget": { "select": { "name": "$5000 - $10000" } },
            "Status": { "select": { "name": status } },
            "Slack Thread": { "rich_text": [] }
        }
    });
    if let Some(ts) = slack_ts {
        page["properties"]["Slack Thread"]["rich_text"] = json!([{ "plain_text": ts }]);
    }
    page
}

pub fn query_results(pages: Vec<Value>) -> Value {
    json!({ "object": "list", "results": pages, "has_more": false })
}

/// Mount a database query answering with `pages`.
pub async fn mock_query(server: &MockServer, database: &str, pages: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path(format!("/notion/databases/{}/query", database)))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_results(pages)))
        .mount(server)
        .await;
}

/// Mount page creation in `database`, answering with `page_id`.
pub async fn mock_create_page(server: &MockServer, database: &str, page_id: &str) {
    Mock::given(method("POST"))
        .and(path("/notion/pages"))
        .and(body_partial_json(json!({ "parent": { "database_id": database } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": page_id })))
        .mount(server)
        .await;
}

pub async fn mock_slack_post(server: &MockServer, ts: &str) {
    Mock::given(method("POST"))
        .and(path("/slack/chat.postMessage"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "channel": "C123", "ts": ts })),
        )
        .mount(server)
        .await;
}
