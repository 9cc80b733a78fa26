use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Sent,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "SENT",
            SendStatus::Failed => "FAILED",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "SENT" => Some(SendStatus::Sent),
            "FAILED" => Some(SendStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
}

/// Subject/body pair with `{{token}}` placeholders and the tokens it declares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Campaign {
    pub id: String,
    pub user_id: String,
    pub template_id: String,
    pub industry: String,
    pub is_active: bool,
    /// 0 = Sunday.
    pub weekday: u8,
    pub hour: u8,
    /// Cap on sends per target; `None` means unlimited.
    pub max_sends: Option<i64>,
}

/// Campaign joined with everything needed to render its emails.
#[derive(Debug, Clone)]
pub struct CampaignBundle {
    pub campaign: Campaign,
    pub template: EmailTemplate,
    pub owner: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enrichment {
    pub id: String,
    pub company_id: String,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutreachTarget {
    pub id: String,
    pub campaign_id: String,
    pub company_id: String,
    pub send_count: i64,
    pub last_sent_at: Option<DateTime<Utc>>,
}

/// Target joined with its company and the company's first enrichment.
#[derive(Debug, Clone)]
pub struct TargetContext {
    pub target: OutreachTarget,
    pub company: Company,
    pub enrichment: Option<Enrichment>,
}

impl TargetContext {
    /// Recipient address, if the enrichment resolved a usable one.
    pub fn recipient(&self) -> Option<&str> {
        self.enrichment
            .as_ref()
            .and_then(|e| e.owner_email.as_deref())
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailLog {
    pub id: String,
    pub campaign_id: String,
    pub company_id: String,
    pub recipient: String,
    pub subject: String,
    pub status: SendStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
