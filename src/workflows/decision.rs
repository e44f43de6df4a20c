//! Accept/reject decisions taken from the chat channel.

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::integrations::email::scheduling_email;
use crate::integrations::notion::LeadPatch;
use crate::integrations::slack::decision_blocks;
use crate::models::{Decision, LeadStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Applied {
        lead_id: String,
        status: LeadStatus,
        email_id: Option<String>,
    },
    /// Lead had already left `new`/`review`; nothing was written or sent.
    AlreadyDecided { lead_id: String, status: LeadStatus },
}

/// Apply `decision` to the lead stored at `page_id`.
///
/// The status is written before the scheduling email goes out, so a repeated
/// click sees the lead as decided and never sends a second email.
pub async fn decide_lead(
    state: &AppState,
    page_id: &str,
    decision: Decision,
    user_id: &str,
    source_message: Option<(String, String)>,
) -> Result<DecisionOutcome, AppError> {
    let mut lead = state
        .notion
        .get_lead(page_id)
        .await
        .with_context(|| format!("load lead {}", page_id))?;

    if !lead.status.awaits_decision() {
        tracing::info!(
            "Lead {} already {}, ignoring {:?} from {}",
            page_id,
            lead.status,
            decision,
            user_id
        );
        return Ok(DecisionOutcome::AlreadyDecided {
            lead_id: page_id.to_string(),
            status: lead.status,
        });
    }

    let status = decision.resulting_status();
    state
        .notion
        .update_lead(page_id, LeadPatch::status(status))
        .await
        .context("record decision")?;
    lead.status = status;
    tracing::info!("Lead {} {} by {}", page_id, status, user_id);

    let email_id = match decision {
        Decision::Accept => {
            let email = scheduling_email(&lead, &state.config.scheduling_link);
            state
                .email
                .send(&email)
                .await
                .context("send scheduling email")?
        }
        Decision::Reject => None,
    };

    if let Some((channel, ts)) = source_message {
        let text = format!("{} {}", lead.display_name(), status);
        let blocks = decision_blocks(&lead, decision, user_id);
        if let Err(e) = state
            .slack
            .update_message(&channel, &ts, &text, blocks)
            .await
        {
            tracing::warn!("Failed to update Slack message {} for lead {}: {}", ts, page_id, e);
        }
    }

    Ok(DecisionOutcome::Applied {
        lead_id: page_id.to_string(),
        status,
        email_id,
    })
}
