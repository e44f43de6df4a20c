use crate::errors::AppError;
use crate::handlers::AppState;
use crate::integrations::gmail::decode_push_data;
use crate::models::Decision;
use crate::signature::{verify_calcom, verify_slack};
use crate::webhook_models::{
    CalcomWebhook, MarketplacePurchase, PubSubPush, SlackInteraction, TestEmailPayload,
};
use crate::workflows::{
    decide_lead, handle_booking_event, handle_purchase, process_inbound_email, sync_mailbox,
    InboundEmail, Purchase,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

type WebhookResult = Result<(StatusCode, Json<Value>), AppError>;

/// Deserialize a raw JSON body so malformed payloads surface as 400.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Report server-side failures to the monitoring sink, then hand the error back.
async fn report(state: &AppState, error: AppError, context: &str) -> AppError {
    if error.status_code().is_server_error() {
        state.reporter.capture(&error, context).await;
    } else {
        tracing::warn!("{} rejected: {}", context, error);
    }
    error
}

/// Gmail Pub/Sub push.
///
/// Always answers 200 unless processing failed upstream, in which case the
/// 500 makes Pub/Sub redeliver.
pub async fn gmail_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> WebhookResult {
    let push: PubSubPush = parse_json(&body)?;
    let Some(data) = push.message.and_then(|m| m.data) else {
        return Err(AppError::MissingFields(vec!["message.data".to_string()]));
    };
    let notification = decode_push_data(&data)?;
    tracing::info!(
        "📬 Gmail push for {} (historyId={})",
        notification.email_address,
        notification.history_id
    );

    let Some(gmail) = state.gmail.as_ref() else {
        tracing::warn!("Gmail push received but Gmail is not configured, ignoring");
        return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))));
    };

    match sync_mailbox(&state, gmail).await {
        Ok(outcome) => Ok((
            StatusCode::OK,
            Json(json!({ "status": "processed", "result": outcome })),
        )),
        Err(e) => Err(report(&state, e, "gmail webhook").await),
    }
}

/// Cal.com booking lifecycle events.
pub async fn calcom_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    match &state.config.calcom_webhook_secret {
        Some(secret) => verify_calcom(&headers, &body, secret)?,
        None => tracing::debug!("CALCOM_WEBHOOK_SECRET not set, skipping signature check"),
    }

    let hook: CalcomWebhook = parse_json(&body)?;
    if hook.trigger_event.is_none() {
        return Err(AppError::MissingFields(vec!["triggerEvent".to_string()]));
    }

    match handle_booking_event(&state, &hook).await {
        Ok(outcome) => Ok((StatusCode::OK, Json(json!({ "status": "ok", "result": outcome })))),
        Err(e) => Err(report(&state, e, "calcom webhook").await),
    }
}

/// Slack interactive components (accept/reject buttons).
pub async fn slack_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    if let Some(secret) = &state.config.slack_signing_secret {
        verify_slack(&headers, &body, secret, Utc::now().timestamp())?;
    }

    let payload = url::form_urlencoded::parse(&body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| AppError::MissingFields(vec!["payload".to_string()]))?;
    let interaction: SlackInteraction = parse_json(payload.as_bytes())?;

    if interaction.kind != "block_actions" {
        tracing::debug!("Ignoring Slack interaction type '{}'", interaction.kind);
        return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))));
    }

    let Some((action, decision)) = interaction
        .actions
        .iter()
        .find_map(|a| Decision::from_action_id(&a.action_id).map(|d| (a, d)))
    else {
        tracing::debug!("Slack interaction without a lead decision, ignoring");
        return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))));
    };

    let page_id = action
        .value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::MissingFields(vec!["actions[].value".to_string()]))?;
    let user_id = interaction
        .user
        .as_ref()
        .map(|u| u.id.as_str())
        .unwrap_or("unknown");

    match decide_lead(&state, page_id, decision, user_id, interaction.source_message()).await {
        Ok(outcome) => Ok((StatusCode::OK, Json(json!({ "status": "ok", "result": outcome })))),
        Err(e) => Err(report(&state, e, "slack webhook").await),
    }
}

/// Notion template marketplace purchases.
pub async fn marketplace_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> WebhookResult {
    let purchase: MarketplacePurchase = parse_json(&body)?;
    let missing = purchase.missing_fields();
    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    let customer_email = purchase.customer_address().ok_or_else(|| {
        AppError::BadRequest("customer_email is not a valid email address".to_string())
    })?;

    let purchase = Purchase {
        acquisition_id: purchase.acquisition_id,
        customer_email,
        template_name: purchase.template_name.unwrap_or_default(),
        purchased_at: purchase.purchased_at.filter(|ts| !ts.trim().is_empty()),
    };

    match handle_purchase(&state, &purchase).await {
        Ok(outcome) => Ok((StatusCode::OK, Json(json!({ "status": "ok", "result": outcome })))),
        Err(e) => Err(report(&state, e, "marketplace webhook").await),
    }
}

/// Manual intake trigger: `{from, subject, body}`.
pub async fn test_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> WebhookResult {
    let payload: TestEmailPayload = parse_json(&body)?;
    let missing = payload.missing_fields();
    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    let email = InboundEmail {
        from: payload.from.unwrap_or_default(),
        subject: payload.subject.unwrap_or_default(),
        body: payload.body.unwrap_or_default(),
    };

    match process_inbound_email(&state, &email, "Test").await {
        Ok(outcome) => Ok((StatusCode::OK, Json(json!({ "status": "ok", "result": outcome })))),
        Err(e) => Err(report(&state, e, "test webhook").await),
    }
}
