use super::{required_str, Upstream};
use crate::config::{Config, GmailConfig};
use crate::errors::AppError;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use moka::future::Cache;
use moka::Expiry;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const TOKEN_CACHE_KEY: &str = "access_token";
/// Assumed lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
/// Tokens are dropped from the cache this long before they expire.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// Decoded `message.data` of a Gmail Pub/Sub push.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxNotification {
    pub email_address: String,
    #[serde(deserialize_with = "history_id_from_any")]
    pub history_id: String,
}

fn history_id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // Gmail sends historyId as a number; tolerate strings too
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        other => Err(serde::de::Error::custom(format!(
            "historyId must be a number or string, got {}",
            other
        ))),
    }
}

/// Decode the base64 `data` field of a Pub/Sub push envelope.
pub fn decode_push_data(data: &str) -> Result<MailboxNotification, AppError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::BadRequest(format!("message.data is not valid base64: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::BadRequest(format!("message.data is not a Gmail notification: {}", e))
    })
}

/// The parts of a Gmail message needed for lead intake.
#[derive(Debug, Clone, PartialEq)]
pub struct GmailMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

fn decode_body_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Depth-first search for the first part with `mime_type` and inline data.
fn find_part_body(part: &Value, mime_type: &str) -> Option<String> {
    let part_type = part.get("mimeType").and_then(|m| m.as_str()).unwrap_or("");
    if part_type.eq_ignore_ascii_case(mime_type) {
        if let Some(body) = part.pointer("/body/data").and_then(|d| d.as_str()) {
            return decode_body_data(body);
        }
    }
    part.get("parts")?
        .as_array()?
        .iter()
        .find_map(|child| find_part_body(child, mime_type))
}

fn header(payload: &Value, name: &str) -> Option<String> {
    payload
        .get("headers")?
        .as_array()?
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(|n| n.as_str())
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.get("value"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Extract sender, subject and body from a `format=full` message resource.
/// Plain text is preferred over HTML; the snippet is the last resort.
pub fn parse_message(message: &Value) -> Result<GmailMessage, AppError> {
    let id = required_str(message, "/id", "gmail")?;
    let payload = message.get("payload").cloned().unwrap_or(Value::Null);

    let body = find_part_body(&payload, "text/plain")
        .or_else(|| find_part_body(&payload, "text/html"))
        .or_else(|| {
            message
                .get("snippet")
                .and_then(|s| s.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default();

    Ok(GmailMessage {
        id,
        from: header(&payload, "From").unwrap_or_default(),
        subject: header(&payload, "Subject").unwrap_or_default(),
        body,
    })
}

/// Client for the Gmail API using an OAuth refresh token.
#[derive(Clone)]
pub struct GmailClient {
    upstream: Upstream,
    settings: GmailConfig,
    token_cache: Cache<&'static str, CachedToken>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    ttl: Duration,
}

/// Expires each cached token after its own lifetime.
struct TokenExpiry;

impl Expiry<&'static str, CachedToken> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &&'static str,
        value: &CachedToken,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// How long a token issued with `expires_in` may be served from the cache.
/// `None` when it is too short-lived to cache at all.
fn cache_lifetime(expires_in: Option<u64>) -> Option<Duration> {
    let lifetime = expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    lifetime
        .checked_sub(TOKEN_REFRESH_MARGIN_SECS)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl GmailClient {
    /// Returns `None` when Gmail credentials are not configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
        let Some(settings) = config.gmail.clone() else {
            return Ok(None);
        };

        let token_cache = Cache::builder()
            .expire_after(TokenExpiry)
            .max_capacity(1)
            .build();

        Ok(Some(Self {
            upstream: Upstream::new("gmail", config.retry.clone())?,
            settings,
            token_cache,
        }))
    }

    pub fn subject_filter(&self) -> Option<&str> {
        self.settings.subject_filter.as_deref()
    }

    async fn access_token(&self) -> Result<String, AppError> {
        if let Some(cached) = self.token_cache.get(TOKEN_CACHE_KEY).await {
            return Ok(cached.access_token);
        }

        let form = [
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("refresh_token", self.settings.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .upstream
            .send_json("refresh token", |http| {
                http.post(&self.settings.token_url).form(&form)
            })
            .await?;

        let token: TokenResponse = serde_json::from_value(response).map_err(|e| {
            AppError::upstream("gmail", None, format!("invalid token response: {}", e))
        })?;
        tracing::debug!(
            "Refreshed Gmail access token (expires_in={:?})",
            token.expires_in
        );
        match cache_lifetime(token.expires_in) {
            Some(ttl) => {
                self.token_cache
                    .insert(
                        TOKEN_CACHE_KEY,
                        CachedToken {
                            access_token: token.access_token.clone(),
                            ttl,
                        },
                    )
                    .await;
            }
            None => tracing::debug!("Gmail access token too short-lived to cache"),
        }
        Ok(token.access_token)
    }

    /// Ids of messages matching the configured query, newest first.
    pub async fn list_message_ids(&self) -> Result<Vec<String>, AppError> {
        let token = self.access_token().await?;
        let url = format!("{}/messages", self.settings.api_base_url);
        let query = [("q", self.settings.query.as_str()), ("maxResults", "10")];

        let response = self
            .upstream
            .send_json("list messages", |http| {
                http.get(&url).bearer_auth(&token).query(&query)
            })
            .await?;

        Ok(response
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn get_message(&self, id: &str) -> Result<GmailMessage, AppError> {
        let token = self.access_token().await?;
        let url = format!("{}/messages/{}", self.settings.api_base_url, id);

        let response = self
            .upstream
            .send_json("get message", |http| {
                http.get(&url).bearer_auth(&token).query(&[("format", "full")])
            })
            .await?;
        parse_message(&response)
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), AppError> {
        let token = self.access_token().await?;
        let url = format!("{}/messages/{}/modify", self.settings.api_base_url, id);
        let body = json!({ "removeLabelIds": ["UNREAD"] });

        self.upstream
            .send_json("modify message", |http| {
                http.post(&url).bearer_auth(&token).json(&body)
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_lifetime_follows_expires_in() {
        assert_eq!(cache_lifetime(Some(3599)), Some(Duration::from_secs(3539)));
        assert_eq!(cache_lifetime(None), Some(Duration::from_secs(3540)));
        assert_eq!(cache_lifetime(Some(60)), None);
        assert_eq!(cache_lifetime(Some(30)), None);
    }

    #[test]
    fn test_decode_push_data() {
        let data = STANDARD.encode(r#"{"emailAddress":"inbox@studio.dev","historyId":9876543}"#);
        let notification = decode_push_data(&data).unwrap();
        assert_eq!(notification.email_address, "inbox@studio.dev");
        assert_eq!(notification.history_id, "9876543");
    }

    #[test]
    fn test_decode_push_data_rejects_garbage() {
        assert!(decode_push_data("%%%").is_err());
        let not_json = STANDARD.encode("hello");
        assert!(decode_push_data(&not_json).is_err());
    }

    #[test]
    fn test_parse_message_prefers_plain_text() {
        let plain = URL_SAFE_NO_PAD.encode("Name: Ana\nBudget: $3000");
        let html = URL_SAFE_NO_PAD.encode("<p>Name: Ana</p>");
        let message = json!({
            "id": "msg-1",
            "snippet": "Name: Ana",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    { "name": "From", "value": "Ana Lima <ana@studio.dev>" },
                    { "name": "subject", "value": "New inquiry" }
                ],
                "parts": [
                    { "mimeType": "text/html", "body": { "data": html } },
                    { "mimeType": "text/plain", "body": { "data": plain } }
                ]
            }
        });

        let parsed = parse_message(&message).unwrap();
        assert_eq!(parsed.id, "msg-1");
        assert_eq!(parsed.from, "Ana Lima <ana@studio.dev>");
        assert_eq!(parsed.subject, "New inquiry");
        assert_eq!(parsed.body, "Name: Ana\nBudget: $3000");
    }

    #[test]
    fn test_parse_message_falls_back_to_snippet() {
        let message = json!({ "id": "msg-2", "snippet": "hello", "payload": { "headers": [] } });
        assert_eq!(parse_message(&message).unwrap().body, "hello");
    }
}
