use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============ Lead ============

/// Lifecycle status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Review,
    Accepted,
    Rejected,
    Booked,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Review => "review",
            LeadStatus::Accepted => "accepted",
            LeadStatus::Rejected => "rejected",
            LeadStatus::Booked => "booked",
        }
    }

    /// Whether an accept/reject decision can still be taken.
    pub fn awaits_decision(&self) -> bool {
        matches!(self, LeadStatus::New | LeadStatus::Review)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(LeadStatus::New),
            "review" => Ok(LeadStatus::Review),
            "accepted" => Ok(LeadStatus::Accepted),
            "rejected" => Ok(LeadStatus::Rejected),
            "booked" => Ok(LeadStatus::Booked),
            other => Err(format!("unknown lead status '{}'", other)),
        }
    }
}

/// A prospective customer tracked from inbound email through booking.
///
/// Persisted as a page in the leads database of the records store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Records-store page id (absent until created).
    pub page_id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub project: Option<String>,
    /// Budget range label, e.g. "$1000 - $5000".
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub status: LeadStatus,
    pub booking_date: Option<DateTime<Utc>>,
    /// Timestamp of the chat notification, used to thread follow-ups.
    pub slack_thread_ts: Option<String>,
    pub source: Option<String>,
}

impl Lead {
    /// Name to show in notifications; falls back to the email address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// Where a parsed lead name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// A `Name:` line in the body.
    Label,
    /// The display name of the `From` header.
    Sender,
    /// Derived from the local part of the address.
    Address,
}

/// Fields extracted from an inbound lead email.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedLead {
    pub email: Option<String>,
    pub name: Option<String>,
    pub name_source: Option<NameSource>,
    pub company: Option<String>,
    pub project: Option<String>,
    pub budget_amount: Option<f64>,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
}

/// Decision taken on a lead from the chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn resulting_status(&self) -> LeadStatus {
        match self {
            Decision::Accept => LeadStatus::Accepted,
            Decision::Reject => LeadStatus::Rejected,
        }
    }

    pub fn from_action_id(action_id: &str) -> Option<Self> {
        match action_id {
            "accept_lead" => Some(Decision::Accept),
            "reject_lead" => Some(Decision::Reject),
            _ => None,
        }
    }
}

// ============ Company / Contact ============

/// A company to upsert in the records store, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyRecord {
    pub name: String,
    pub domain: Option<String>,
}

/// A contact to upsert in the records store, keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRecord {
    pub email: String,
    pub name: Option<String>,
    /// Page id of the related company, if any.
    pub company_page_id: Option<String>,
    pub source: String,
    pub notes: Option<String>,
}

/// Outcome of a find-or-create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Upserted {
    pub page_id: String,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            LeadStatus::New,
            LeadStatus::Review,
            LeadStatus::Accepted,
            LeadStatus::Rejected,
            LeadStatus::Booked,
        ] {
            assert_eq!(status.as_str().parse::<LeadStatus>(), Ok(status));
        }
        assert_eq!("Accepted".parse::<LeadStatus>(), Ok(LeadStatus::Accepted));
        assert!("archived".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn test_only_open_leads_await_decision() {
        assert!(LeadStatus::New.awaits_decision());
        assert!(LeadStatus::Review.awaits_decision());
        assert!(!LeadStatus::Accepted.awaits_decision());
        assert!(!LeadStatus::Rejected.awaits_decision());
        assert!(!LeadStatus::Booked.awaits_decision());
    }

    #[test]
    fn test_decision_from_action_id() {
        assert_eq!(Decision::from_action_id("accept_lead"), Some(Decision::Accept));
        assert_eq!(Decision::from_action_id("reject_lead"), Some(Decision::Reject));
        assert_eq!(Decision::from_action_id("snooze"), None);
    }
}
