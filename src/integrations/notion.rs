use super::{required_str, Upstream};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{CompanyRecord, ContactRecord, Lead, LeadStatus, Upserted};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

const NOTION_VERSION: &str = "2022-06-28";
/// Notion rejects rich-text segments longer than this.
const MAX_TEXT_LEN: usize = 2000;

// Property names in the Notion databases.
pub const PROP_NAME: &str = "Name";
pub const PROP_EMAIL: &str = "Email";
pub const PROP_COMPANY: &str = "Company";
pub const PROP_PROJECT: &str = "Project";
pub const PROP_BUDGET: &str = "Budget";
pub const PROP_TIMELINE: &str = "Timeline";
pub const PROP_STATUS: &str = "Status";
pub const PROP_BOOKING_DATE: &str = "Booking Date";
pub const PROP_SLACK_THREAD: &str = "Slack Thread";
pub const PROP_SOURCE: &str = "Source";
pub const PROP_DOMAIN: &str = "Domain";
pub const PROP_NOTES: &str = "Notes";

// ============ Property builders ============

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_LEN).collect()
}

pub fn title(text: &str) -> Value {
    json!({ "title": [{ "text": { "content": truncate(text) } }] })
}

pub fn rich_text(text: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": truncate(text) } }] })
}

pub fn email(address: &str) -> Value {
    json!({ "email": address })
}

pub fn select(name: &str) -> Value {
    // Select option names cannot contain commas
    json!({ "select": { "name": name.replace(',', "") } })
}

pub fn date(value: &DateTime<Utc>) -> Value {
    json!({ "date": { "start": value.to_rfc3339() } })
}

pub fn relation(page_ids: &[&str]) -> Value {
    let ids: Vec<Value> = page_ids.iter().map(|id| json!({ "id": id })).collect();
    json!({ "relation": ids })
}

// ============ Property readers ============

fn plain_text(items: Option<&Value>) -> Option<String> {
    let text: String = items?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("plain_text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn read_title(page: &Value, property: &str) -> Option<String> {
    plain_text(page.pointer(&format!("/properties/{}/title", property)))
}

pub fn read_rich_text(page: &Value, property: &str) -> Option<String> {
    plain_text(page.pointer(&format!("/properties/{}/rich_text", property)))
}

pub fn read_email(page: &Value, property: &str) -> Option<String> {
    page.pointer(&format!("/properties/{}/email", property))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

pub fn read_select(page: &Value, property: &str) -> Option<String> {
    page.pointer(&format!("/properties/{}/select/name", property))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

pub fn read_date(page: &Value, property: &str) -> Option<DateTime<Utc>> {
    let raw = page
        .pointer(&format!("/properties/{}/date/start", property))
        .and_then(|v| v.as_str())?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Convert a leads-database page into a [`Lead`].
pub fn page_to_lead(page: &Value) -> Result<Lead, AppError> {
    let page_id = required_str(page, "/id", "notion")?;
    let email = read_email(page, PROP_EMAIL).ok_or_else(|| {
        AppError::InternalError(format!("Lead page {} has no email", page_id))
    })?;

    let status = match read_select(page, PROP_STATUS) {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!("Lead page {}: {}, treating as new", page_id, e);
            LeadStatus::New
        }),
        None => LeadStatus::New,
    };

    Ok(Lead {
        page_id: Some(page_id),
        email,
        name: read_title(page, PROP_NAME),
        company: read_rich_text(page, PROP_COMPANY),
        project: read_rich_text(page, PROP_PROJECT),
        budget: read_select(page, PROP_BUDGET),
        timeline: read_rich_text(page, PROP_TIMELINE),
        status,
        booking_date: read_date(page, PROP_BOOKING_DATE),
        slack_thread_ts: read_rich_text(page, PROP_SLACK_THREAD),
        source: read_select(page, PROP_SOURCE),
    })
}

/// Full property set for a new lead page.
pub fn lead_properties(lead: &Lead) -> Value {
    let mut props = Map::new();
    props.insert(PROP_NAME.into(), title(lead.display_name()));
    props.insert(PROP_EMAIL.into(), email(&lead.email));
    props.insert(PROP_STATUS.into(), select(lead.status.as_str()));
    if let Some(company) = &lead.company {
        props.insert(PROP_COMPANY.into(), rich_text(company));
    }
    if let Some(project) = &lead.project {
        props.insert(PROP_PROJECT.into(), rich_text(project));
    }
    if let Some(budget) = &lead.budget {
        props.insert(PROP_BUDGET.into(), select(budget));
    }
    if let Some(timeline) = &lead.timeline {
        props.insert(PROP_TIMELINE.into(), rich_text(timeline));
    }
    if let Some(booking_date) = &lead.booking_date {
        props.insert(PROP_BOOKING_DATE.into(), date(booking_date));
    }
    if let Some(ts) = &lead.slack_thread_ts {
        props.insert(PROP_SLACK_THREAD.into(), rich_text(ts));
    }
    if let Some(source) = &lead.source {
        props.insert(PROP_SOURCE.into(), select(source));
    }
    Value::Object(props)
}

/// Partial update of a lead page; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct LeadPatch {
    pub status: Option<LeadStatus>,
    pub booking_date: Option<DateTime<Utc>>,
    pub slack_thread_ts: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub project: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
}

impl LeadPatch {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.booking_date.is_none()
            && self.slack_thread_ts.is_none()
            && self.name.is_none()
            && self.company.is_none()
            && self.project.is_none()
            && self.budget.is_none()
            && self.timeline.is_none()
    }

    pub fn into_properties(self) -> Value {
        let mut props = Map::new();
        if let Some(status) = self.status {
            props.insert(PROP_STATUS.into(), select(status.as_str()));
        }
        if let Some(booking_date) = &self.booking_date {
            props.insert(PROP_BOOKING_DATE.into(), date(booking_date));
        }
        if let Some(ts) = &self.slack_thread_ts {
            props.insert(PROP_SLACK_THREAD.into(), rich_text(ts));
        }
        if let Some(name) = &self.name {
            props.insert(PROP_NAME.into(), title(name));
        }
        if let Some(company) = &self.company {
            props.insert(PROP_COMPANY.into(), rich_text(company));
        }
        if let Some(project) = &self.project {
            props.insert(PROP_PROJECT.into(), rich_text(project));
        }
        if let Some(budget) = &self.budget {
            props.insert(PROP_BUDGET.into(), select(budget));
        }
        if let Some(timeline) = &self.timeline {
            props.insert(PROP_TIMELINE.into(), rich_text(timeline));
        }
        Value::Object(props)
    }
}

/// Client for the Notion databases backing leads, companies and contacts.
#[derive(Clone)]
pub struct NotionClient {
    upstream: Upstream,
    base_url: String,
    token: String,
    leads_db: String,
    companies_db: String,
    contacts_db: String,
}

impl NotionClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            upstream: Upstream::new("notion", config.retry.clone())?,
            base_url: config.notion_base_url.clone(),
            token: config.notion_token.clone(),
            leads_db: config.notion_leads_db.clone(),
            companies_db: config.notion_companies_db.clone(),
            contacts_db: config.notion_contacts_db.clone(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    /// Query a database, returning the matching pages.
    pub async fn query_database(
        &self,
        database_id: &str,
        filter: Value,
    ) -> Result<Vec<Value>, AppError> {
        let url = format!("{}/databases/{}/query", self.base_url, database_id);
        let body = json!({ "filter": filter, "page_size": 10 });

        let response = self
            .upstream
            .send_json("query database", |http| {
                self.authorized(http.post(&url)).json(&body)
            })
            .await?;

        Ok(response
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Create a page in `database_id`, returning its id.
    pub async fn create_page(
        &self,
        database_id: &str,
        properties: Value,
    ) -> Result<String, AppError> {
        let url = format!("{}/pages", self.base_url);
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });

        let response = self
            .upstream
            .send_json("create page", |http| {
                self.authorized(http.post(&url)).json(&body)
            })
            .await?;

        let page_id = required_str(&response, "/id", "notion")?;
        tracing::info!("✓ Notion page created: {}", page_id);
        Ok(page_id)
    }

    pub async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), AppError> {
        let url = format!("{}/pages/{}", self.base_url, page_id);
        let body = json!({ "properties": properties });

        self.upstream
            .send_json("update page", |http| {
                self.authorized(http.patch(&url)).json(&body)
            })
            .await?;

        tracing::debug!("Updated Notion page {}", page_id);
        Ok(())
    }

    pub async fn get_page(&self, page_id: &str) -> Result<Value, AppError> {
        let url = format!("{}/pages/{}", self.base_url, page_id);
        self.upstream
            .send_json("get page", |http| self.authorized(http.get(&url)))
            .await
    }

    /// Find a company by name, creating it if absent.
    pub async fn upsert_company(&self, company: &CompanyRecord) -> Result<Upserted, AppError> {
        let filter = json!({ "property": PROP_NAME, "title": { "equals": company.name } });
        if let Some(page) = self
            .query_database(&self.companies_db, filter)
            .await?
            .first()
        {
            let page_id = required_str(page, "/id", "notion")?;
            tracing::debug!("Company '{}' already exists: {}", company.name, page_id);
            return Ok(Upserted {
                page_id,
                created: false,
            });
        }

        let mut props = Map::new();
        props.insert(PROP_NAME.into(), title(&company.name));
        if let Some(domain) = &company.domain {
            props.insert(PROP_DOMAIN.into(), rich_text(domain));
        }
        let page_id = self
            .create_page(&self.companies_db, Value::Object(props))
            .await?;
        tracing::info!("Created company '{}'", company.name);
        Ok(Upserted {
            page_id,
            created: true,
        })
    }

    /// Find a contact by email, creating it if absent. An existing contact
    /// gets its company relation filled in when one is supplied.
    pub async fn upsert_contact(&self, contact: &ContactRecord) -> Result<Upserted, AppError> {
        let filter = json!({ "property": PROP_EMAIL, "email": { "equals": contact.email } });
        if let Some(page) = self
            .query_database(&self.contacts_db, filter)
            .await?
            .first()
        {
            let page_id = required_str(page, "/id", "notion")?;
            if let Some(company_id) = &contact.company_page_id {
                let mut props = Map::new();
                props.insert(PROP_COMPANY.into(), relation(&[company_id.as_str()]));
                self.update_page(&page_id, Value::Object(props)).await?;
            }
            tracing::debug!("Contact {} already exists: {}", contact.email, page_id);
            return Ok(Upserted {
                page_id,
                created: false,
            });
        }

        let display_name = contact.name.as_deref().unwrap_or(&contact.email);
        let mut props = Map::new();
        props.insert(PROP_NAME.into(), title(display_name));
        props.insert(PROP_EMAIL.into(), email(&contact.email));
        props.insert(PROP_SOURCE.into(), select(&contact.source));
        if let Some(company_id) = &contact.company_page_id {
            props.insert(PROP_COMPANY.into(), relation(&[company_id.as_str()]));
        }
        if let Some(notes) = &contact.notes {
            props.insert(PROP_NOTES.into(), rich_text(notes));
        }
        let page_id = self
            .create_page(&self.contacts_db, Value::Object(props))
            .await?;
        tracing::info!("Created contact {}", contact.email);
        Ok(Upserted {
            page_id,
            created: true,
        })
    }

    pub async fn find_lead_by_email(&self, address: &str) -> Result<Option<Lead>, AppError> {
        let filter = json!({ "property": PROP_EMAIL, "email": { "equals": address } });
        match self.query_database(&self.leads_db, filter).await?.first() {
            Some(page) => Ok(Some(page_to_lead(page)?)),
            None => Ok(None),
        }
    }

    pub async fn get_lead(&self, page_id: &str) -> Result<Lead, AppError> {
        let page = self.get_page(page_id).await?;
        page_to_lead(&page)
    }

    pub async fn create_lead(&self, lead: &Lead) -> Result<String, AppError> {
        self.create_page(&self.leads_db, lead_properties(lead)).await
    }

    pub async fn update_lead(&self, page_id: &str, patch: LeadPatch) -> Result<(), AppError> {
        self.update_page(page_id, patch.into_properties()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Value {
        json!({
            "id": "page-1",
            "properties": {
                "Name": { "title": [{ "plain_text": "Ada " }, { "plain_text": "Lovelace" }] },
                "Email": { "email": "ada@engine.io" },
                "Status": { "select": { "name": "review" } },
                "Budget": { "select": { "name": "$1000 - $5000" } },
                "Slack Thread": { "rich_text": [{ "plain_text": "1700000000.000100" }] },
                "Booking Date": { "date": { "start": "2026-03-01T15:00:00.000Z" } },
                "Project": { "rich_text": [] }
            }
        })
    }

    #[test]
    fn test_page_to_lead_reads_properties() {
        let lead = page_to_lead(&sample_page()).unwrap();
        assert_eq!(lead.page_id.as_deref(), Some("page-1"));
        assert_eq!(lead.email, "ada@engine.io");
        assert_eq!(lead.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(lead.status, LeadStatus::Review);
        assert_eq!(lead.budget.as_deref(), Some("$1000 - $5000"));
        assert_eq!(lead.slack_thread_ts.as_deref(), Some("1700000000.000100"));
        assert!(lead.booking_date.is_some());
        assert_eq!(lead.project, None);
    }

    #[test]
    fn test_page_without_email_is_rejected() {
        let page = json!({ "id": "page-2", "properties": {} });
        assert!(page_to_lead(&page).is_err());
    }

    #[test]
    fn test_patch_only_contains_set_fields() {
        let props = LeadPatch::status(LeadStatus::Accepted).into_properties();
        let obj = props.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(props["Status"]["select"]["name"], "accepted");
    }

    #[test]
    fn test_select_strips_commas_and_text_is_truncated() {
        assert_eq!(select("$1,000 - $5,000")["select"]["name"], "$1000 - $5000");
        let long = "x".repeat(MAX_TEXT_LEN + 50);
        let value = rich_text(&long);
        let content = value["rich_text"][0]["text"]["content"].as_str().unwrap();
        assert_eq!(content.len(), MAX_TEXT_LEN);
    }
}
