use super::{required_str, Upstream};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Decision, Lead};
use serde_json::{json, Value};

pub const ACCEPT_ACTION_ID: &str = "accept_lead";
pub const REJECT_ACTION_ID: &str = "reject_lead";

/// Client for the Slack Web API (bot token).
#[derive(Clone)]
pub struct SlackClient {
    upstream: Upstream,
    base_url: String,
    token: String,
    channel_id: String,
}

impl SlackClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            upstream: Upstream::new("slack", config.retry.clone())?,
            base_url: config.slack_base_url.clone(),
            token: config.slack_bot_token.clone(),
            channel_id: config.slack_channel_id.clone(),
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Call a Web API method. Slack reports failures as `200 {"ok": false}`,
    /// which are turned into non-retryable upstream errors.
    async fn call(&self, method: &str, body: Value) -> Result<Value, AppError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .upstream
            .send_json(method, |http| http.post(&url).bearer_auth(&self.token).json(&body))
            .await?;

        if response.get("ok").and_then(|ok| ok.as_bool()) != Some(true) {
            let error = response
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown_error");
            return Err(AppError::upstream(
                "slack",
                Some(400),
                format!("{} failed: {}", method, error),
            ));
        }
        Ok(response)
    }

    /// Post to the configured channel, optionally as a thread reply.
    /// Returns the message timestamp.
    pub async fn post_message(
        &self,
        text: &str,
        blocks: Option<Value>,
        thread_ts: Option<&str>,
    ) -> Result<String, AppError> {
        let mut body = json!({ "channel": self.channel_id, "text": text });
        if let Some(blocks) = blocks {
            body["blocks"] = blocks;
        }
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let response = self.call("chat.postMessage", body).await?;
        let ts = required_str(&response, "/ts", "slack")?;
        tracing::info!("✓ Slack message posted: ts={}", ts);
        Ok(ts)
    }

    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Value,
    ) -> Result<(), AppError> {
        let body = json!({ "channel": channel, "ts": ts, "text": text, "blocks": blocks });
        self.call("chat.update", body).await?;
        tracing::debug!("Updated Slack message {} in {}", ts, channel);
        Ok(())
    }
}

fn lead_fields(lead: &Lead) -> Value {
    let or_na = |v: &Option<String>| v.clone().unwrap_or_else(|| "n/a".to_string());
    json!([
        { "type": "mrkdwn", "text": format!("*Email:*\n{}", lead.email) },
        { "type": "mrkdwn", "text": format!("*Company:*\n{}", or_na(&lead.company)) },
        { "type": "mrkdwn", "text": format!("*Budget:*\n{}", or_na(&lead.budget)) },
        { "type": "mrkdwn", "text": format!("*Timeline:*\n{}", or_na(&lead.timeline)) },
    ])
}

fn lead_summary_blocks(lead: &Lead, heading: &str) -> Vec<Value> {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("{} {}", heading, lead.display_name()) }
        }),
        json!({ "type": "section", "fields": lead_fields(lead) }),
    ];
    if let Some(project) = &lead.project {
        let excerpt: String = project.chars().take(2500).collect();
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Project:*\n{}", excerpt) }
        }));
    }
    blocks
}

/// Notification for a new lead, with accept/reject buttons carrying the page id.
pub fn lead_notification_blocks(lead: &Lead, page_id: &str) -> Value {
    let mut blocks = lead_summary_blocks(lead, "🎯 New lead:");
    blocks.push(json!({
        "type": "actions",
        "block_id": "lead_decision",
        "elements": [
            {
                "type": "button",
                "action_id": ACCEPT_ACTION_ID,
                "style": "primary",
                "text": { "type": "plain_text", "text": "Accept" },
                "value": page_id
            },
            {
                "type": "button",
                "action_id": REJECT_ACTION_ID,
                "style": "danger",
                "text": { "type": "plain_text", "text": "Reject" },
                "value": page_id
            }
        ]
    }));
    Value::Array(blocks)
}

/// The notification after a decision: same summary, buttons replaced by who decided.
pub fn decision_blocks(lead: &Lead, decision: Decision, user_id: &str) -> Value {
    let mut blocks = lead_summary_blocks(lead, "🎯 Lead:");
    let verdict = match decision {
        Decision::Accept => format!("✅ Accepted by <@{}>, scheduling link sent", user_id),
        Decision::Reject => format!("❌ Rejected by <@{}>", user_id),
    };
    blocks.push(json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": verdict }]
    }));
    Value::Array(blocks)
}

pub fn lead_notification_text(lead: &Lead) -> String {
    format!("New lead: {} ({})", lead.display_name(), lead.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadStatus;

    fn lead() -> Lead {
        Lead {
            page_id: Some("page-9".into()),
            email: "grace@navy.mil".into(),
            name: Some("Grace Hopper".into()),
            company: None,
            project: Some("Compiler".into()),
            budget: Some("$25000+".into()),
            timeline: None,
            status: LeadStatus::Review,
            booking_date: None,
            slack_thread_ts: None,
            source: None,
        }
    }

    #[test]
    fn test_notification_buttons_carry_page_id() {
        let blocks = lead_notification_blocks(&lead(), "page-9");
        let actions = blocks
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["type"] == "actions")
            .unwrap();
        assert_eq!(actions["elements"][0]["action_id"], ACCEPT_ACTION_ID);
        assert_eq!(actions["elements"][0]["value"], "page-9");
        assert_eq!(actions["elements"][1]["action_id"], REJECT_ACTION_ID);
    }

    #[test]
    fn test_decision_blocks_drop_buttons() {
        let blocks = decision_blocks(&lead(), Decision::Reject, "U42");
        let blocks = blocks.as_array().unwrap();
        assert!(blocks.iter().all(|b| b["type"] != "actions"));
        let context = blocks.last().unwrap();
        assert_eq!(context["elements"][0]["text"], "❌ Rejected by <@U42>");
    }
}
