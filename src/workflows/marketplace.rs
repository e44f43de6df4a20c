//! Template marketplace purchases → records store, CRM, welcome email.

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::integrations::crm::{CrmClient, CrmContact};
use crate::integrations::email::welcome_email;
use crate::models::{CompanyRecord, ContactRecord};
use crate::parsing::{company_from_email, name_from_email};
use chrono::Utc;
use serde::Serialize;

/// A validated purchase.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub acquisition_id: Option<String>,
    pub customer_email: String,
    pub template_name: String,
    pub purchased_at: Option<String>,
}

impl Purchase {
    fn notes(&self) -> String {
        match &self.purchased_at {
            Some(at) => format!("Purchased template: {} on {}", self.template_name, at),
            None => format!("Purchased template: {}", self.template_name),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketplaceOutcome {
    pub duplicate: bool,
    pub name: String,
    pub company: Option<String>,
    pub company_id: Option<String>,
    pub contact_id: Option<String>,
    pub crm_synced: bool,
    pub welcome_sent: bool,
}

pub async fn handle_purchase(
    state: &AppState,
    purchase: &Purchase,
) -> Result<MarketplaceOutcome, AppError> {
    let dedup_key = purchase
        .acquisition_id
        .as_ref()
        .map(|id| format!("marketplace:{}", id));
    if let Some(key) = &dedup_key {
        if state.recent_events.contains_key(key) {
            tracing::info!("Skipping redelivered marketplace acquisition {}", key);
            return Ok(MarketplaceOutcome {
                duplicate: true,
                ..Default::default()
            });
        }
    }

    let email = purchase.customer_email.trim().to_lowercase();
    let name = name_from_email(&email);
    let company = company_from_email(&email);
    tracing::info!(
        "🛒 Marketplace purchase: {} bought '{}' (company={:?})",
        email,
        purchase.template_name,
        company.as_ref().map(|c| &c.name)
    );

    let company_id = match &company {
        Some(company) => Some(
            state
                .notion
                .upsert_company(company)
                .await
                .context("upsert marketplace company")?
                .page_id,
        ),
        None => None,
    };

    let contact = ContactRecord {
        email: email.clone(),
        name: Some(name.clone()),
        company_page_id: company_id.clone(),
        source: "Notion Marketplace".to_string(),
        notes: Some(purchase.notes()),
    };
    let contact_id = state
        .notion
        .upsert_contact(&contact)
        .await
        .context("upsert marketplace contact")?
        .page_id;

    let crm_synced = match &state.crm {
        Some(crm) => match sync_to_crm(crm, &email, &name, company.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("CRM sync failed for {}: {}", email, e);
                false
            }
        },
        None => {
            tracing::debug!("CRM not configured, skipping sync for {}", email);
            false
        }
    };

    let welcome = welcome_email(&email, &name, &purchase.template_name);
    let welcome_sent = match state.email.send(&welcome).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Welcome email to {} failed: {}", email, e);
            false
        }
    };

    if let Some(key) = dedup_key {
        state
            .recent_events
            .insert(key, Utc::now().timestamp())
            .await;
    }

    Ok(MarketplaceOutcome {
        duplicate: false,
        name,
        company: company.map(|c| c.name),
        company_id,
        contact_id: Some(contact_id),
        crm_synced,
        welcome_sent,
    })
}

async fn sync_to_crm(
    crm: &CrmClient,
    email: &str,
    name: &str,
    company: Option<&CompanyRecord>,
) -> Result<(), AppError> {
    let contact = CrmContact {
        email: email.to_string(),
        name: Some(name.to_string()),
        company: company.map(|c| c.name.clone()),
        lifecycle_stage: Some("customer".to_string()),
    };
    let contact_id = crm.upsert_contact(&contact).await?.page_id;

    if let Some(company) = company {
        let company_id = crm.upsert_company(company).await?.page_id;
        crm.associate_contact_with_company(&contact_id, &company_id)
            .await?;
    }
    Ok(())
}
