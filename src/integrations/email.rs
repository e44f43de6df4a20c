use super::Upstream;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::Lead;
use serde::Serialize;
use serde_json::json;

/// A transactional email ready to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Client for the transactional email API (`POST /emails`).
#[derive(Clone)]
pub struct EmailClient {
    upstream: Upstream,
    base_url: String,
    api_key: String,
    from: String,
}

impl EmailClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            upstream: Upstream::new("email", config.retry.clone())?,
            base_url: config.email_base_url.clone(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
        })
    }

    /// Send an email, returning the provider's message id when present.
    pub async fn send(&self, email: &OutboundEmail) -> Result<Option<String>, AppError> {
        let url = format!("{}/emails", self.base_url);
        let body = json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
            "text": email.text,
        });

        tracing::info!("Sending email '{}' to {}", email.subject, email.to);
        let response = self
            .upstream
            .send_json("send email", |http| {
                http.post(&url).bearer_auth(&self.api_key).json(&body)
            })
            .await?;

        let id = response.get("id").and_then(|v| v.as_str()).map(str::to_string);
        tracing::info!("✓ Email sent to {} (id={:?})", email.to, id);
        Ok(id)
    }
}

fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Email sent to an accepted lead inviting them to book a call.
pub fn scheduling_email(lead: &Lead, scheduling_link: &str) -> OutboundEmail {
    let greeting = lead
        .name
        .as_deref()
        .map(first_name)
        .unwrap_or("there")
        .to_string();

    let text = format!(
        "Hi {greeting},\n\nThanks for reaching out about your project. We'd love to learn more.\n\
         Pick a time that works for you here: {scheduling_link}\n\nTalk soon!"
    );
    let html = format!(
        "<p>Hi {name},</p>\
         <p>Thanks for reaching out about your project. We'd love to learn more.</p>\
         <p><a href=\"{link}\">Pick a time that works for you</a></p>\
         <p>Talk soon!</p>",
        name = escape_html(&greeting),
        link = escape_html(scheduling_link),
    );

    OutboundEmail {
        to: lead.email.clone(),
        subject: "Let's schedule a call about your project".to_string(),
        html,
        text,
    }
}

/// Welcome email after a marketplace template purchase.
pub fn welcome_email(to: &str, name: &str, template_name: &str) -> OutboundEmail {
    let greeting = first_name(name);
    let text = format!(
        "Hi {greeting},\n\nThanks for getting {template_name}! \
         If you have questions setting it up, just reply to this email.\n\nEnjoy!"
    );
    let html = format!(
        "<p>Hi {name},</p>\
         <p>Thanks for getting <strong>{template}</strong>! \
         If you have questions setting it up, just reply to this email.</p>\
         <p>Enjoy!</p>",
        name = escape_html(greeting),
        template = escape_html(template_name),
    );

    OutboundEmail {
        to: to.to_string(),
        subject: format!("Welcome to {}", template_name),
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadStatus;

    #[test]
    fn test_scheduling_email_uses_first_name_and_link() {
        let lead = Lead {
            page_id: None,
            email: "ana@studio.dev".into(),
            name: Some("Ana Lima".into()),
            company: None,
            project: None,
            budget: None,
            timeline: None,
            status: LeadStatus::Accepted,
            booking_date: None,
            slack_thread_ts: None,
            source: None,
        };
        let email = scheduling_email(&lead, "https://cal.com/team/intro");
        assert_eq!(email.to, "ana@studio.dev");
        assert!(email.text.starts_with("Hi Ana,"));
        assert!(email.html.contains("href=\"https://cal.com/team/intro\""));
    }

    #[test]
    fn test_welcome_email_escapes_template_name() {
        let email = welcome_email("x@y.io", "Sam", "CRM <Pro>");
        assert_eq!(email.subject, "Welcome to CRM <Pro>");
        assert!(email.html.contains("CRM &lt;Pro&gt;"));
    }
}
