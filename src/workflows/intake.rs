//! Lead intake: inbound email → company, contact, lead record, chat notification.

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::integrations::gmail::GmailClient;
use crate::integrations::notion::LeadPatch;
use crate::integrations::slack::{lead_notification_blocks, lead_notification_text};
use crate::models::{CompanyRecord, ContactRecord, Lead, LeadStatus, NameSource, ParsedLead};
use crate::parsing::{email_domain, is_consumer_domain, parse_lead_email};
use chrono::Utc;
use serde::Serialize;

/// A raw email to turn into a lead.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    pub from: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub lead_id: String,
    pub email: String,
    /// False when a lead with this email already existed.
    pub created: bool,
    pub status: LeadStatus,
    pub company_id: Option<String>,
    pub contact_id: String,
    pub slack_ts: Option<String>,
    pub parsed: ParsedLead,
}

/// Run the intake workflow for one email.
///
/// Steps: parse → upsert company (when named) → upsert contact →
/// find-or-create lead → post chat notification → store thread ts.
/// Each external call retries on its own; a failure part-way leaves
/// the earlier writes in place.
pub async fn process_inbound_email(
    state: &AppState,
    email: &InboundEmail,
    source: &str,
) -> Result<IntakeOutcome, AppError> {
    let parsed = parse_lead_email(&email.from, &email.subject, &email.body);
    let address = parsed.email.clone().ok_or_else(|| {
        AppError::BadRequest("No email address found in message".to_string())
    })?;

    tracing::info!("📨 Lead intake for {} (source={})", address, source);

    // 1. Company
    let company_id = match &parsed.company {
        Some(name) => {
            let domain = email_domain(&address).filter(|d| !is_consumer_domain(d));
            let company = CompanyRecord {
                name: name.clone(),
                domain,
            };
            let upserted = state
                .notion
                .upsert_company(&company)
                .await
                .context("upsert company")?;
            Some(upserted.page_id)
        }
        None => None,
    };

    // 2. Contact
    let contact = ContactRecord {
        email: address.clone(),
        name: parsed.name.clone(),
        company_page_id: company_id.clone(),
        source: source.to_string(),
        notes: None,
    };
    let contact = state
        .notion
        .upsert_contact(&contact)
        .await
        .context("upsert contact")?;

    // 3. Lead (query-then-create; concurrent intakes for one email can race)
    let (mut lead, created) = match state
        .notion
        .find_lead_by_email(&address)
        .await
        .context("find lead")?
    {
        Some(existing) => (refresh_existing_lead(state, existing, &parsed).await?, false),
        None => (create_lead(state, &address, &parsed, source).await?, true),
    };
    let lead_id = lead.page_id.clone().ok_or_else(|| {
        AppError::InternalError(format!("Lead for {} has no page id", address))
    })?;

    // 4. Notify
    let slack_ts = notify_channel(state, &mut lead, &lead_id, created).await?;

    tracing::info!(
        "✓ Lead intake complete: lead={}, created={}, status={}",
        lead_id,
        created,
        lead.status
    );

    Ok(IntakeOutcome {
        lead_id,
        email: address,
        created,
        status: lead.status,
        company_id,
        contact_id: contact.page_id,
        slack_ts,
        parsed,
    })
}

async fn create_lead(
    state: &AppState,
    address: &str,
    parsed: &ParsedLead,
    source: &str,
) -> Result<Lead, AppError> {
    let mut lead = Lead {
        page_id: None,
        email: address.to_string(),
        name: parsed.name.clone(),
        company: parsed.company.clone(),
        project: parsed.project.clone(),
        budget: parsed.budget_range.clone(),
        timeline: parsed.timeline.clone(),
        status: LeadStatus::New,
        booking_date: None,
        slack_thread_ts: None,
        source: Some(source.to_string()),
    };
    let page_id = state
        .notion
        .create_lead(&lead)
        .await
        .context("create lead")?;
    lead.page_id = Some(page_id);
    Ok(lead)
}

/// Overwrite the details of a returning lead with whatever the new email provides.
async fn refresh_existing_lead(
    state: &AppState,
    mut lead: Lead,
    parsed: &ParsedLead,
) -> Result<Lead, AppError> {
    // A name guessed from the address never replaces a stored one
    let name = match parsed.name_source {
        Some(NameSource::Label | NameSource::Sender) => parsed.name.clone(),
        _ => None,
    };
    let patch = LeadPatch {
        name,
        company: parsed.company.clone(),
        project: parsed.project.clone(),
        budget: parsed.budget_range.clone(),
        timeline: parsed.timeline.clone(),
        ..Default::default()
    };

    let page_id = lead.page_id.clone().unwrap_or_default();
    tracing::info!("Lead {} already exists ({})", lead.email, page_id);
    if patch.is_empty() {
        return Ok(lead);
    }
    state
        .notion
        .update_lead(&page_id, patch.clone())
        .await
        .context("refresh lead")?;

    lead.name = patch.name.or(lead.name);
    lead.company = patch.company.or(lead.company);
    lead.project = patch.project.or(lead.project);
    lead.budget = patch.budget.or(lead.budget);
    lead.timeline = patch.timeline.or(lead.timeline);
    Ok(lead)
}

/// Post the decision prompt for open leads; for decided leads just note the
/// new inquiry (threaded when possible). Open leads move to `review`.
async fn notify_channel(
    state: &AppState,
    lead: &mut Lead,
    lead_id: &str,
    created: bool,
) -> Result<Option<String>, AppError> {
    if lead.status.awaits_decision() {
        let text = lead_notification_text(lead);
        let blocks = lead_notification_blocks(lead, lead_id);
        let ts = state
            .slack
            .post_message(&text, Some(blocks), None)
            .await
            .context("post lead notification")?;

        state
            .notion
            .update_lead(
                lead_id,
                LeadPatch {
                    status: Some(LeadStatus::Review),
                    slack_thread_ts: Some(ts.clone()),
                    ..Default::default()
                },
            )
            .await
            .context("store notification thread")?;
        lead.status = LeadStatus::Review;
        lead.slack_thread_ts = Some(ts.clone());
        return Ok(Some(ts));
    }

    debug_assert!(!created, "new leads always await a decision");
    let text = format!(
        "📨 {} ({}) sent another inquiry. Current status: {}",
        lead.display_name(),
        lead.email,
        lead.status
    );
    let ts = state
        .slack
        .post_message(&text, None, lead.slack_thread_ts.as_deref())
        .await
        .context("post returning-lead note")?;
    Ok(Some(ts))
}

/// Result of handling one Gmail push notification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MailboxSyncOutcome {
    pub processed: Vec<String>,
    pub already_seen: usize,
    pub filtered: usize,
    pub failed: usize,
}

/// Pull candidate messages from Gmail and run intake on the unseen ones.
///
/// A message is remembered once its intake succeeds, so a redelivered push
/// does not create a second notification. The first failure is returned
/// after all messages were attempted so the push gets redelivered.
pub async fn sync_mailbox(
    state: &AppState,
    gmail: &GmailClient,
) -> Result<MailboxSyncOutcome, AppError> {
    let ids = gmail.list_message_ids().await.context("list gmail messages")?;
    let mut outcome = MailboxSyncOutcome::default();
    let mut first_error: Option<AppError> = None;

    for id in ids {
        if state.processed_messages.contains_key(&id) {
            outcome.already_seen += 1;
            continue;
        }

        let message = match gmail.get_message(&id).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to fetch Gmail message {}: {}", id, e);
                outcome.failed += 1;
                first_error.get_or_insert(e);
                continue;
            }
        };

        if let Some(filter) = gmail.subject_filter() {
            if !message
                .subject
                .to_lowercase()
                .contains(&filter.to_lowercase())
            {
                tracing::debug!("Skipping Gmail message {} (subject filter)", id);
                state
                    .processed_messages
                    .insert(id, Utc::now().timestamp())
                    .await;
                outcome.filtered += 1;
                continue;
            }
        }

        let inbound = InboundEmail {
            from: message.from,
            subject: message.subject,
            body: message.body,
        };
        match process_inbound_email(state, &inbound, "Email").await {
            Ok(_) => {
                state
                    .processed_messages
                    .insert(id.clone(), Utc::now().timestamp())
                    .await;
                if let Err(e) = gmail.mark_read(&id).await {
                    tracing::warn!("Failed to mark Gmail message {} as read: {}", id, e);
                }
                outcome.processed.push(id);
            }
            Err(AppError::BadRequest(reason)) => {
                // Not a lead email; never retry it
                tracing::info!("Gmail message {} is not a lead: {}", id, reason);
                state
                    .processed_messages
                    .insert(id, Utc::now().timestamp())
                    .await;
                outcome.filtered += 1;
            }
            Err(e) => {
                tracing::error!("Lead intake failed for Gmail message {}: {}", id, e);
                outcome.failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}
