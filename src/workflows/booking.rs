//! Scheduling-platform events → lead booking state.

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::integrations::notion::LeadPatch;
use crate::models::{Lead, LeadStatus};
use crate::webhook_models::{CalcomBooking, CalcomWebhook};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const BOOKING_CREATED: &str = "BOOKING_CREATED";
pub const BOOKING_CANCELLED: &str = "BOOKING_CANCELLED";
pub const BOOKING_RESCHEDULED: &str = "BOOKING_RESCHEDULED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookingEvent {
    Created,
    Cancelled,
    Rescheduled,
}

impl BookingEvent {
    fn parse(trigger: &str) -> Option<Self> {
        match trigger {
            BOOKING_CREATED => Some(Self::Created),
            BOOKING_CANCELLED => Some(Self::Cancelled),
            BOOKING_RESCHEDULED => Some(Self::Rescheduled),
            _ => None,
        }
    }
}

/// What the booking workflow did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BookingOutcome {
    Updated { lead_id: String, status: LeadStatus },
    /// Trigger we don't act on (PING, MEETING_ENDED, ...).
    Ignored { trigger: String },
    /// No attendee email or no lead for it.
    Skipped { reason: String },
    Duplicate,
}

/// Dedup key for provider redeliveries of the same event.
fn event_key(hook: &CalcomWebhook) -> Option<String> {
    let uid = hook.payload.as_ref()?.uid.as_deref()?;
    Some(format!(
        "calcom:{}:{}:{}",
        uid,
        hook.trigger_event.as_deref().unwrap_or_default(),
        hook.created_at.as_deref().unwrap_or_default()
    ))
}

fn parse_start(booking: &CalcomBooking) -> Result<Option<DateTime<Utc>>, AppError> {
    match booking.start_time.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| AppError::BadRequest(format!("Invalid startTime '{}': {}", raw, e))),
        None => Ok(None),
    }
}

pub async fn handle_booking_event(
    state: &AppState,
    hook: &CalcomWebhook,
) -> Result<BookingOutcome, AppError> {
    let trigger = hook.trigger_event.clone().unwrap_or_default();
    let Some(event) = BookingEvent::parse(&trigger) else {
        tracing::info!("Ignoring Cal.com trigger '{}'", trigger);
        return Ok(BookingOutcome::Ignored { trigger });
    };

    let key = event_key(hook);
    if let Some(key) = &key {
        if state.recent_events.contains_key(key) {
            tracing::info!("Skipping redelivered Cal.com event {}", key);
            return Ok(BookingOutcome::Duplicate);
        }
    }

    let Some(booking) = hook.payload.as_ref() else {
        return Err(AppError::MissingFields(vec!["payload".to_string()]));
    };
    let start = parse_start(booking)?;

    let Some(address) = booking
        .primary_attendee()
        .and_then(|a| a.email.as_deref())
        .map(|e| e.trim().to_lowercase())
    else {
        tracing::warn!("Cal.com {} without attendee email, skipping", trigger);
        return Ok(BookingOutcome::Skipped {
            reason: "no attendee email".to_string(),
        });
    };

    let Some(lead) = state
        .notion
        .find_lead_by_email(&address)
        .await
        .context("find lead for booking")?
    else {
        tracing::warn!("No lead found for booking attendee {}, skipping", address);
        return Ok(BookingOutcome::Skipped {
            reason: format!("no lead for {}", address),
        });
    };
    let lead_id = lead
        .page_id
        .clone()
        .ok_or_else(|| AppError::InternalError(format!("Lead {} has no page id", address)))?;

    let status = match event {
        BookingEvent::Created => {
            let patch = LeadPatch {
                status: Some(LeadStatus::Booked),
                booking_date: start,
                ..Default::default()
            };
            state
                .notion
                .update_lead(&lead_id, patch)
                .await
                .context("mark lead booked")?;
            confirm_in_channel(state, &lead, start).await;
            LeadStatus::Booked
        }
        BookingEvent::Cancelled => {
            state
                .notion
                .update_lead(&lead_id, LeadPatch::status(LeadStatus::Accepted))
                .await
                .context("revert cancelled booking")?;
            LeadStatus::Accepted
        }
        BookingEvent::Rescheduled => {
            let patch = LeadPatch {
                booking_date: start,
                ..Default::default()
            };
            state
                .notion
                .update_lead(&lead_id, patch)
                .await
                .context("reschedule booking")?;
            lead.status
        }
    };

    if let Some(key) = key {
        state
            .recent_events
            .insert(key, Utc::now().timestamp())
            .await;
    }

    tracing::info!("✓ Booking {} applied to lead {} ({})", trigger, lead_id, status);
    Ok(BookingOutcome::Updated { lead_id, status })
}

/// Best-effort chat confirmation, threaded under the lead notification when known.
async fn confirm_in_channel(state: &AppState, lead: &Lead, start: Option<DateTime<Utc>>) {
    let when = start
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "an unspecified time".to_string());
    let text = format!(
        "📅 {} ({}) booked a call for {}",
        lead.display_name(),
        lead.email,
        when
    );

    if let Err(e) = state
        .slack
        .post_message(&text, None, lead.slack_thread_ts.as_deref())
        .await
    {
        tracing::warn!("Failed to post booking confirmation for {}: {}", lead.email, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_event_parse() {
        assert_eq!(BookingEvent::parse("BOOKING_CREATED"), Some(BookingEvent::Created));
        assert_eq!(BookingEvent::parse("BOOKING_CANCELLED"), Some(BookingEvent::Cancelled));
        assert_eq!(
            BookingEvent::parse("BOOKING_RESCHEDULED"),
            Some(BookingEvent::Rescheduled)
        );
        assert_eq!(BookingEvent::parse("PING"), None);
    }

    #[test]
    fn test_event_key_includes_trigger_and_created_at() {
        let hook: CalcomWebhook = serde_json::from_str(
            r#"{"triggerEvent":"BOOKING_CREATED","createdAt":"t1","payload":{"uid":"bk_1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event_key(&hook).as_deref(),
            Some("calcom:bk_1:BOOKING_CREATED:t1")
        );

        let no_uid: CalcomWebhook =
            serde_json::from_str(r#"{"triggerEvent":"BOOKING_CREATED","payload":{}}"#).unwrap();
        assert_eq!(event_key(&no_uid), None);
    }

    #[test]
    fn test_parse_start() {
        let booking = CalcomBooking {
            start_time: Some("2026-02-10T15:00:00+01:00".into()),
            ..Default::default()
        };
        let start = parse_start(&booking).unwrap().unwrap();
        assert_eq!(start.to_rfc3339(), "2026-02-10T14:00:00+00:00");

        let bad = CalcomBooking {
            start_time: Some("tomorrow".into()),
            ..Default::default()
        };
        assert!(matches!(parse_start(&bad), Err(AppError::BadRequest(_))));
    }
}
