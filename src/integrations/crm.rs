use super::{required_str, Upstream};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{CompanyRecord, Upserted};
use serde_json::{json, Map, Value};

/// Client for the CRM objects API (contacts and companies).
#[derive(Clone)]
pub struct CrmClient {
    upstream: Upstream,
    base_url: String,
    token: String,
}

/// Contact fields synced to the CRM.
#[derive(Debug, Clone, PartialEq)]
pub struct CrmContact {
    pub email: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub lifecycle_stage: Option<String>,
}

fn split_name(name: &str) -> (String, Option<String>) {
    let mut parts = name.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());
    (first, last)
}

impl CrmClient {
    /// Returns `None` when no CRM token is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
        let Some(token) = config.crm_token.clone() else {
            return Ok(None);
        };
        Ok(Some(Self {
            upstream: Upstream::new("crm", config.retry.clone())?,
            base_url: config.crm_base_url.clone(),
            token,
        }))
    }

    async fn search(
        &self,
        object: &str,
        property: &str,
        value: &str,
    ) -> Result<Option<String>, AppError> {
        let url = format!("{}/crm/v3/objects/{}/search", self.base_url, object);
        let body = json!({
            "filterGroups": [{
                "filters": [{ "propertyName": property, "operator": "EQ", "value": value }]
            }],
            "limit": 1
        });

        let response = self
            .upstream
            .send_json("search", |http| {
                http.post(&url).bearer_auth(&self.token).json(&body)
            })
            .await?;

        Ok(response
            .pointer("/results/0/id")
            .and_then(|id| id.as_str())
            .map(str::to_string))
    }

    async fn create(&self, object: &str, properties: Value) -> Result<String, AppError> {
        let url = format!("{}/crm/v3/objects/{}", self.base_url, object);
        let body = json!({ "properties": properties });
        let response = self
            .upstream
            .send_json("create", |http| {
                http.post(&url).bearer_auth(&self.token).json(&body)
            })
            .await?;
        required_str(&response, "/id", "crm")
    }

    async fn update(&self, object: &str, id: &str, properties: Value) -> Result<(), AppError> {
        let url = format!("{}/crm/v3/objects/{}/{}", self.base_url, object, id);
        let body = json!({ "properties": properties });
        self.upstream
            .send_json("update", |http| {
                http.patch(&url).bearer_auth(&self.token).json(&body)
            })
            .await?;
        Ok(())
    }

    /// Upsert a company keyed by domain (or by name when there is no domain).
    pub async fn upsert_company(&self, company: &CompanyRecord) -> Result<Upserted, AppError> {
        let (key, value) = match &company.domain {
            Some(domain) => ("domain", domain.as_str()),
            None => ("name", company.name.as_str()),
        };

        if let Some(id) = self.search("companies", key, value).await? {
            tracing::debug!("CRM company '{}' exists: {}", company.name, id);
            return Ok(Upserted {
                page_id: id,
                created: false,
            });
        }

        let mut props = Map::new();
        props.insert("name".into(), json!(company.name));
        if let Some(domain) = &company.domain {
            props.insert("domain".into(), json!(domain));
        }
        let id = self.create("companies", Value::Object(props)).await?;
        tracing::info!("✓ CRM company created: {} ({})", company.name, id);
        Ok(Upserted {
            page_id: id,
            created: true,
        })
    }

    /// Upsert a contact keyed by email.
    pub async fn upsert_contact(&self, contact: &CrmContact) -> Result<Upserted, AppError> {
        let mut props = Map::new();
        props.insert("email".into(), json!(contact.email));
        if let Some(name) = &contact.name {
            let (first, last) = split_name(name);
            props.insert("firstname".into(), json!(first));
            if let Some(last) = last {
                props.insert("lastname".into(), json!(last));
            }
        }
        if let Some(company) = &contact.company {
            props.insert("company".into(), json!(company));
        }
        if let Some(stage) = &contact.lifecycle_stage {
            props.insert("lifecyclestage".into(), json!(stage));
        }

        if let Some(id) = self.search("contacts", "email", &contact.email).await? {
            self.update("contacts", &id, Value::Object(props)).await?;
            tracing::debug!("CRM contact {} updated: {}", contact.email, id);
            return Ok(Upserted {
                page_id: id,
                created: false,
            });
        }

        let id = self.create("contacts", Value::Object(props)).await?;
        tracing::info!("✓ CRM contact created: {} ({})", contact.email, id);
        Ok(Upserted {
            page_id: id,
            created: true,
        })
    }

    /// Link a contact to a company with the default association type.
    pub async fn associate_contact_with_company(
        &self,
        contact_id: &str,
        company_id: &str,
    ) -> Result<(), AppError> {
        let url = format!(
            "{}/crm/v4/objects/contacts/{}/associations/default/companies/{}",
            self.base_url, contact_id, company_id
        );
        self.upstream
            .send_json("associate", |http| http.put(&url).bearer_auth(&self.token))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Ada Lovelace"), ("Ada".to_string(), Some("Lovelace".to_string())));
        assert_eq!(
            split_name("Mary Ann Evans"),
            ("Mary".to_string(), Some("Ann Evans".to_string()))
        );
        assert_eq!(split_name("Cher"), ("Cher".to_string(), None));
    }
}
