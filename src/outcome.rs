//! Append-only record of send attempts.
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::error;

use crate::db;
use crate::model::{new_id, EmailLog, SendStatus};

impl EmailLog {
    pub fn sent(
        campaign_id: &str,
        company_id: &str,
        recipient: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self::entry(campaign_id, company_id, recipient, subject, SendStatus::Sent, None, at)
    }

    pub fn failed(
        campaign_id: &str,
        company_id: &str,
        recipient: &str,
        subject: &str,
        error_message: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self::entry(
            campaign_id,
            company_id,
            recipient,
            subject,
            SendStatus::Failed,
            Some(error_message),
            at,
        )
    }

    fn entry(
        campaign_id: &str,
        company_id: &str,
        recipient: &str,
        subject: &str,
        status: SendStatus,
        error_message: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            company_id: company_id.to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            status,
            error_message,
            created_at: at,
        }
    }
}

/// Persist one entry. Failures are reported and dropped; a lost record never
/// aborts dispatch.
pub async fn log(pool: &SqlitePool, entry: &EmailLog) {
    if let Err(err) = db::insert_email_log(pool, entry).await {
        error!(
            ?err,
            campaign_id = %entry.campaign_id,
            company_id = %entry.company_id,
            status = entry.status.as_str(),
            "failed to write email log"
        );
    }
}
