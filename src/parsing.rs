//! Extraction helpers for unstructured lead emails.
//!
//! Inbound inquiries arrive as free-form emails (often website contact-form
//! notifications) with "Label: value" lines. These helpers pull out the
//! email address, sender name, labelled fields and budget amounts, and derive
//! display names and companies from bare email addresses.

use crate::models::{CompanyRecord, NameSource, ParsedLead};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}")
        .expect("email regex is valid")
});

static SENDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"?([^"<]*?)"?\s*<([^>]+)>\s*$"#).expect("sender regex is valid")
});

static LABELED_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[*_]*([A-Za-z][A-Za-z /\-]{0,40}?)[*_]*\s*:[*_]*\s*(.*?)\s*$")
        .expect("labelled line regex is valid")
});

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d+))?\s*([kK])?").expect("amount regex is valid")
});

static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:style|script)[^>]*>.*?</(?:style|script)>")
        .expect("block tag regex is valid")
});

static LINE_BREAK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</tr\s*>|</li\s*>").expect("break regex is valid")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex is valid"));

static INLINE_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+").expect("space regex is valid"));

/// Consumer mailbox providers; addresses on these never imply a company.
pub const CONSUMER_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "yahoo.co.uk",
    "ymail.com",
    "hotmail.com",
    "hotmail.co.uk",
    "outlook.com",
    "live.com",
    "msn.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "pm.me",
    "gmx.com",
    "gmx.de",
    "mail.com",
    "yandex.com",
    "zoho.com",
    "hey.com",
    "fastmail.com",
    "qq.com",
    "163.com",
];

/// Two-label public suffixes where the organisation name sits one label further left.
const COMPOUND_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "com.au", "net.au", "co.nz", "co.jp", "com.br", "co.za", "co.in",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Email,
    Name,
    Company,
    Project,
    Budget,
    Timeline,
}

fn field_for_label(label: &str) -> Option<Field> {
    let label = label.trim().to_ascii_lowercase();
    let field = match label.as_str() {
        "email" | "email address" | "e-mail" | "your email" => Field::Email,
        "name" | "full name" | "your name" | "contact name" => Field::Name,
        "company" | "company name" | "organization" | "organisation" | "business" => {
            Field::Company
        }
        "project" | "project description" | "project details" | "message" | "details"
        | "description" | "about the project" => Field::Project,
        "budget" | "estimated budget" | "project budget" | "budget range" => Field::Budget,
        "timeline" | "timeframe" | "deadline" | "project timeline" | "start date" => {
            Field::Timeline
        }
        _ => return None,
    };
    Some(field)
}

/// Normalize an email body into plain text.
///
/// Strips HTML tags (turning block-level breaks into newlines), decodes the
/// common entities, trims each line and collapses runs of blank lines.
pub fn clean_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = BLOCK_TAG_RE.replace_all(&text, "");
    let text = LINE_BREAK_TAG_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = INLINE_SPACE_RE.replace_all(line.trim(), " ").to_string();
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// First email address found in `text`, lowercased.
pub fn extract_email(text: &str) -> Option<String> {
    EMAIL_RE.find(text).map(|m| m.as_str().to_lowercase())
}

/// Split a `From` header into display name and address.
///
/// Handles `Name <e@x.com>`, `"Name" <e@x.com>` and a bare address.
pub fn parse_sender(from: &str) -> (Option<String>, Option<String>) {
    if let Some(caps) = SENDER_RE.captures(from) {
        let name = caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|n| !n.is_empty() && !n.contains('@'));
        let email = caps.get(2).and_then(|m| extract_email(m.as_str()));
        return (name, email);
    }
    (None, extract_email(from))
}

/// Parse the first currency amount in `text`.
///
/// Accepts thousands separators, decimals and a `k` suffix:
/// `"$1,500"` → 1500, `"1.5k"` → 1500.
pub fn parse_amount(text: &str) -> Option<f64> {
    let caps = AMOUNT_RE.captures(text)?;
    let whole = caps.get(1)?.as_str().replace(',', "");
    let mut amount: f64 = match caps.get(2) {
        Some(frac) => format!("{}.{}", whole, frac.as_str()).parse().ok()?,
        None => whole.parse().ok()?,
    };
    if caps.get(3).is_some() {
        amount *= 1000.0;
    }
    Some(amount)
}

/// Map a budget amount onto the range labels used in the leads database.
pub fn budget_range(amount: f64) -> &'static str {
    if amount < 1000.0 {
        "Under $1000"
    } else if amount < 5000.0 {
        "$1000 - $5000"
    } else if amount < 10000.0 {
        "$5000 - $10000"
    } else if amount < 25000.0 {
        "$10000 - $25000"
    } else {
        "$25000+"
    }
}

/// Collect the known labelled fields. The first occurrence of a label wins;
/// project descriptions continue over following unlabelled lines.
fn labeled_fields(text: &str) -> HashMap<Field, String> {
    let mut fields: HashMap<Field, String> = HashMap::new();
    let mut current: Option<Field> = None;

    for line in text.lines() {
        if let Some(caps) = LABELED_LINE_RE.captures(line) {
            if let Some(field) = field_for_label(&caps[1]) {
                let value = caps[2].trim().to_string();
                if fields.contains_key(&field) {
                    current = None;
                } else {
                    fields.insert(field, value);
                    current = Some(field);
                }
                continue;
            }
        }

        match current {
            Some(Field::Project) if !line.is_empty() => {
                if let Some(project) = fields.get_mut(&Field::Project) {
                    if !project.is_empty() {
                        project.push('\n');
                    }
                    project.push_str(line);
                }
            }
            _ => current = None,
        }
    }

    fields.retain(|_, v| !v.trim().is_empty());
    fields
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Heuristic display name from an address: `john.doe42@x.com` → "John Doe".
pub fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let local = local.split('+').next().unwrap_or(local);

    let parts: Vec<String> = local
        .split(['.', '_', '-'])
        .map(|p| p.trim_matches(|c: char| c.is_ascii_digit()))
        .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_alphabetic()))
        .map(title_case)
        .collect();

    if parts.is_empty() {
        local.to_string()
    } else {
        parts.join(" ")
    }
}

/// Domain part of an address, lowercased.
pub fn email_domain(email: &str) -> Option<String> {
    let (_, domain) = email.rsplit_once('@')?;
    let domain = domain.trim().trim_end_matches('.').to_lowercase();
    if domain.is_empty() || !domain.contains('.') {
        return None;
    }
    Some(domain)
}

pub fn is_consumer_domain(domain: &str) -> bool {
    CONSUMER_EMAIL_DOMAINS.contains(&domain)
}

/// Candidate company for a business address; `None` for consumer domains.
///
/// `jane@mail.acme-corp.co.uk` → "Acme Corp" (domain `mail.acme-corp.co.uk`).
pub fn company_from_email(email: &str) -> Option<CompanyRecord> {
    let domain = email_domain(email)?;
    if is_consumer_domain(&domain) {
        return None;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let suffix_len = if labels.len() >= 3
        && COMPOUND_SUFFIXES.contains(&labels[labels.len() - 2..].join(".").as_str())
    {
        2
    } else {
        1
    };
    let org_label = labels.get(labels.len().checked_sub(suffix_len + 1)?)?;

    let name = org_label
        .split(['-', '_'])
        .filter(|p| !p.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        return None;
    }

    Some(CompanyRecord {
        name,
        domain: Some(domain),
    })
}

/// Extract lead fields from a raw email.
///
/// Email: labelled `Email:` line, then the sender address, then any address
/// in the body. Name: labelled `Name:` line, then the sender display name,
/// then a name derived from the address.
pub fn parse_lead_email(from: &str, subject: &str, body: &str) -> ParsedLead {
    let text = clean_text(body);
    let fields = labeled_fields(&text);
    let (sender_name, sender_email) = parse_sender(from);

    let email = fields
        .get(&Field::Email)
        .and_then(|v| extract_email(v))
        .or(sender_email)
        .or_else(|| extract_email(&text));

    let (name, name_source) = match (fields.get(&Field::Name), sender_name) {
        (Some(label), _) => (Some(label.clone()), Some(NameSource::Label)),
        (None, Some(sender)) => (Some(sender), Some(NameSource::Sender)),
        (None, None) => match email.as_deref() {
            Some(address) => (Some(name_from_email(address)), Some(NameSource::Address)),
            None => (None, None),
        },
    };

    let budget_raw = fields.get(&Field::Budget);
    let budget_amount = budget_raw.and_then(|b| parse_amount(b));
    let budget_range = match (budget_amount, budget_raw) {
        (Some(amount), _) => Some(budget_range(amount).to_string()),
        (None, Some(raw)) => Some(raw.clone()),
        (None, None) => None,
    };

    tracing::debug!(
        "Parsed lead email (subject={:?}): email={:?}, fields={}",
        subject,
        email,
        fields.len()
    );

    ParsedLead {
        email,
        name,
        name_source,
        company: fields.get(&Field::Company).cloned(),
        project: fields.get(&Field::Project).cloned(),
        budget_amount,
        budget_range,
        timeline: fields.get(&Field::Timeline).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_with_display_name() {
        let (name, email) = parse_sender("Name <e@x.com>");
        assert_eq!(name.as_deref(), Some("Name"));
        assert_eq!(email.as_deref(), Some("e@x.com"));

        let (name, email) = parse_sender("\"Jane Doe\" <Jane.Doe@Example.org>");
        assert_eq!(name.as_deref(), Some("Jane Doe"));
        assert_eq!(email.as_deref(), Some("jane.doe@example.org"));

        let (name, email) = parse_sender("solo@example.com");
        assert_eq!(name, None);
        assert_eq!(email.as_deref(), Some("solo@example.com"));
    }

    #[test]
    fn test_clean_text_strips_html() {
        let html = "<html><style>p{color:red}</style><p>Name: Ana&nbsp;Lima</p><p>Budget:   $2,000</p><br><br></html>";
        assert_eq!(clean_text(html), "Name: Ana Lima\nBudget: $2,000");
    }

    #[test]
    fn test_clean_text_collapses_blank_lines() {
        let raw = "  first  \r\n\r\n\r\n   second\t\tline \n\n";
        assert_eq!(clean_text(raw), "first\n\nsecond line");
    }

    #[test]
    fn test_amount_formats() {
        assert_eq!(parse_amount("$1500"), Some(1500.0));
        assert_eq!(parse_amount("$1,500"), Some(1500.0));
        assert_eq!(parse_amount("USD 12,000.50"), Some(12000.5));
        assert_eq!(parse_amount("1.5k"), Some(1500.0));
        assert_eq!(parse_amount("$2000 - $5000"), Some(2000.0));
        assert_eq!(parse_amount("not sure yet"), None);
    }

    #[test]
    fn test_budget_range_boundaries() {
        assert_eq!(budget_range(999.0), "Under $1000");
        assert_eq!(budget_range(1000.0), "$1000 - $5000");
        assert_eq!(budget_range(1500.0), "$1000 - $5000");
        assert_eq!(budget_range(5000.0), "$5000 - $10000");
        assert_eq!(budget_range(10000.0), "$10000 - $25000");
        assert_eq!(budget_range(25000.0), "$25000+");
    }

    #[test]
    fn test_project_spans_following_lines() {
        let body = "Project: Rebuild our store\nwith a new checkout\n\nTimeline: Q3";
        let parsed = parse_lead_email("a@b.io", "Inquiry", body);
        assert_eq!(
            parsed.project.as_deref(),
            Some("Rebuild our store\nwith a new checkout")
        );
        assert_eq!(parsed.timeline.as_deref(), Some("Q3"));
    }

    #[test]
    fn test_unparseable_budget_keeps_raw_label() {
        let parsed = parse_lead_email("a@b.io", "", "Budget: Let's discuss");
        assert_eq!(parsed.budget_amount, None);
        assert_eq!(parsed.budget_range.as_deref(), Some("Let's discuss"));
    }

    #[test]
    fn test_name_from_email() {
        assert_eq!(name_from_email("john.doe42@x.com"), "John Doe");
        assert_eq!(name_from_email("mary_ann+news@x.com"), "Mary Ann");
        assert_eq!(name_from_email("12345@x.com"), "12345");
    }

    #[test]
    fn test_company_from_business_domain() {
        let company = company_from_email("jane@mail.acme-corp.co.uk").unwrap();
        assert_eq!(company.name, "Acme Corp");
        assert_eq!(company.domain.as_deref(), Some("mail.acme-corp.co.uk"));

        assert_eq!(company_from_email("ops@globex.io").unwrap().name, "Globex");
    }

    #[test]
    fn test_consumer_domains_yield_no_company() {
        assert!(company_from_email("user@gmail.com").is_none());
        assert!(company_from_email("someone@Outlook.com").is_none());
        assert!(company_from_email("broken-address").is_none());
    }
}
