use crate::parsing::extract_email;
use serde::{Deserialize, Serialize};

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

// ============ Gmail (Pub/Sub push) ============

/// Pub/Sub push envelope delivered for Gmail mailbox changes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PubSubPush {
    pub message: Option<PubSubMessage>,
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PubSubMessage {
    /// Base64 JSON `{"emailAddress": ..., "historyId": ...}`.
    pub data: Option<String>,
    #[serde(alias = "messageId")]
    pub message_id: Option<String>,
    #[serde(alias = "publishTime")]
    pub publish_time: Option<String>,
}

// ============ Test intake ============

/// Raw email fed straight into the intake workflow.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TestEmailPayload {
    pub from: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl TestEmailPayload {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if is_blank(&self.from) {
            missing.push("from".to_string());
        }
        if is_blank(&self.body) {
            missing.push("body".to_string());
        }
        missing
    }
}

// ============ Cal.com ============

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcomWebhook {
    pub trigger_event: Option<String>,
    pub created_at: Option<String>,
    pub payload: Option<CalcomBooking>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcomBooking {
    pub uid: Option<String>,
    pub title: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub attendees: Vec<CalcomAttendee>,
    pub reschedule_uid: Option<String>,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcomAttendee {
    pub email: Option<String>,
    pub name: Option<String>,
    pub time_zone: Option<String>,
}

impl CalcomBooking {
    /// First attendee that carries an email address.
    pub fn primary_attendee(&self) -> Option<&CalcomAttendee> {
        self.attendees.iter().find(|a| !is_blank(&a.email))
    }
}

// ============ Slack interactivity ============

/// Interactive-component callback (`payload` form field).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackInteraction {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: Option<SlackUser>,
    #[serde(default)]
    pub actions: Vec<SlackAction>,
    pub channel: Option<SlackChannel>,
    pub message: Option<SlackMessageRef>,
    pub container: Option<SlackContainer>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackUser {
    pub id: String,
    pub username: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackAction {
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackChannel {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackMessageRef {
    pub ts: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackContainer {
    pub channel_id: Option<String>,
    pub message_ts: Option<String>,
}

impl SlackInteraction {
    /// Channel and timestamp of the message the buttons were on.
    pub fn source_message(&self) -> Option<(String, String)> {
        let channel = self
            .container
            .as_ref()
            .and_then(|c| c.channel_id.clone())
            .or_else(|| self.channel.as_ref().map(|c| c.id.clone()))?;
        let ts = self
            .container
            .as_ref()
            .and_then(|c| c.message_ts.clone())
            .or_else(|| self.message.as_ref().map(|m| m.ts.clone()))?;
        Some((channel, ts))
    }
}

// ============ Notion marketplace ============

/// Template purchase notification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MarketplacePurchase {
    #[serde(alias = "acquisitionId", alias = "id")]
    pub acquisition_id: Option<String>,
    #[serde(alias = "customerEmail", alias = "email")]
    pub customer_email: Option<String>,
    #[serde(alias = "templateName", alias = "template")]
    pub template_name: Option<String>,
    #[serde(alias = "purchasedAt", alias = "timestamp")]
    pub purchased_at: Option<String>,
}

impl MarketplacePurchase {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if is_blank(&self.customer_email) {
            missing.push("customer_email".to_string());
        }
        if is_blank(&self.template_name) {
            missing.push("template_name".to_string());
        }
        missing
    }

    /// Normalized customer address, or `None` unless the whole field is one address.
    pub fn customer_address(&self) -> Option<String> {
        let raw = self.customer_email.as_deref()?.trim().to_lowercase();
        extract_email(&raw).filter(|address| *address == raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calcom_booking() {
        let json = r#"
        {
            "triggerEvent": "BOOKING_CREATED",
            "createdAt": "2026-02-01T10:00:00.000Z",
            "payload": {
                "uid": "bk_123",
                "title": "Intro call",
                "startTime": "2026-02-10T15:00:00Z",
                "endTime": "2026-02-10T15:30:00Z",
                "attendees": [
                    {"name": "No Email"},
                    {"email": "ana@studio.dev", "name": "Ana", "timeZone": "Europe/Lisbon"}
                ],
                "organizer": {"email": "team@agency.io"}
            }
        }
        "#;

        let hook: CalcomWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(hook.trigger_event.as_deref(), Some("BOOKING_CREATED"));
        let booking = hook.payload.unwrap();
        assert_eq!(booking.uid.as_deref(), Some("bk_123"));
        assert_eq!(
            booking.primary_attendee().and_then(|a| a.email.as_deref()),
            Some("ana@studio.dev")
        );
    }

    #[test]
    fn test_slack_source_message_prefers_container() {
        let json = r#"
        {
            "type": "block_actions",
            "user": {"id": "U1", "username": "sam"},
            "actions": [{"action_id": "accept_lead", "value": "page-1"}],
            "channel": {"id": "C-old"},
            "message": {"ts": "1.000"},
            "container": {"channel_id": "C1", "message_ts": "2.000"}
        }
        "#;

        let interaction: SlackInteraction = serde_json::from_str(json).unwrap();
        assert_eq!(
            interaction.source_message(),
            Some(("C1".to_string(), "2.000".to_string()))
        );
    }

    #[test]
    fn test_marketplace_aliases_and_missing_fields() {
        let purchase: MarketplacePurchase = serde_json::from_str(
            r#"{"acquisitionId": "acq_1", "customerEmail": "dev@globex.io"}"#,
        )
        .unwrap();
        assert_eq!(purchase.acquisition_id.as_deref(), Some("acq_1"));
        assert_eq!(purchase.customer_email.as_deref(), Some("dev@globex.io"));
        assert_eq!(purchase.missing_fields(), vec!["template_name".to_string()]);

        let empty = MarketplacePurchase::default();
        assert_eq!(
            empty.missing_fields(),
            vec!["customer_email".to_string(), "template_name".to_string()]
        );
    }

    #[test]
    fn test_marketplace_customer_address_must_be_a_whole_address() {
        let with_email = |email: &str| MarketplacePurchase {
            customer_email: Some(email.to_string()),
            ..Default::default()
        };

        assert_eq!(
            with_email("  Dev@Globex.io ").customer_address().as_deref(),
            Some("dev@globex.io")
        );
        assert_eq!(with_email("not an email").customer_address(), None);
        assert_eq!(with_email("Dev <dev@globex.io>").customer_address(), None);
        assert_eq!(MarketplacePurchase::default().customer_address(), None);
    }
}
