use super::model::{NewCampaign, NewCompany, NewTemplate};
use crate::model::{
    new_id, Campaign, CampaignBundle, Company, EmailLog, EmailTemplate, Enrichment,
    OutreachTarget, SendStatus, TargetContext, User,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and request creation of the file. Leaves in-memory URLs
/// untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn create_user(pool: &Pool, email: &str, full_name: Option<&str>) -> Result<String> {
    let id = new_id();
    sqlx::query("INSERT INTO users (id, email, full_name) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(email)
        .bind(full_name)
        .execute(pool)
        .await
        .with_context(|| format!("failed to create user {email}"))?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn insert_template(pool: &Pool, template: &NewTemplate) -> Result<String> {
    let id = new_id();
    let variables = serde_json::to_string(&template.variables)?;
    sqlx::query(
        "INSERT INTO email_templates (id, name, subject, body, variables) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&template.name)
    .bind(&template.subject)
    .bind(&template.body)
    .bind(variables)
    .execute(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn insert_campaign(pool: &Pool, campaign: &NewCampaign) -> Result<String> {
    if campaign.weekday > 6 {
        return Err(anyhow!("weekday {} out of range 0..=6", campaign.weekday));
    }
    if campaign.hour > 23 {
        return Err(anyhow!("hour {} out of range 0..=23", campaign.hour));
    }
    let id = new_id();
    sqlx::query(
        "INSERT INTO campaigns (id, user_id, template_id, industry, is_active, weekday, hour, max_sends) \
         VALUES (?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&campaign.user_id)
    .bind(&campaign.template_id)
    .bind(&campaign.industry)
    .bind(i64::from(campaign.weekday))
    .bind(i64::from(campaign.hour))
    .bind(campaign.max_sends)
    .execute(pool)
    .await
    .context("failed to insert campaign")?;
    Ok(id)
}

/// Soft (de)activation. Returns false if no campaign has that id.
#[instrument(skip_all)]
pub async fn set_campaign_active(pool: &Pool, campaign_id: &str, active: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE campaigns SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

fn campaign_from_row(row: &SqliteRow) -> Result<Campaign> {
    let weekday: i64 = row.get("weekday");
    let hour: i64 = row.get("hour");
    Ok(Campaign {
        id: row.get("id"),
        user_id: row.get("user_id"),
        template_id: row.get("template_id"),
        industry: row.get("industry"),
        is_active: row.get("is_active"),
        weekday: u8::try_from(weekday).context("weekday out of range")?,
        hour: u8::try_from(hour).context("hour out of range")?,
        max_sends: row.get("max_sends"),
    })
}

#[instrument(skip_all)]
pub async fn list_campaigns(pool: &Pool, user_id: Option<&str>) -> Result<Vec<Campaign>> {
    let rows = sqlx::query(
        "SELECT id, user_id, template_id, industry, is_active, weekday, hour, max_sends \
         FROM campaigns WHERE (? IS NULL OR user_id = ?) ORDER BY created_at, rowid",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(campaign_from_row).collect()
}

/// Ids of active campaigns, optionally restricted to one owner.
#[instrument(skip_all)]
pub async fn active_campaign_ids(pool: &Pool, user_id: Option<&str>) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT id FROM campaigns WHERE is_active = 1 AND (? IS NULL OR user_id = ?) ORDER BY created_at, rowid",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Campaign with its template and owner, or `None` if the id is unknown.
#[instrument(skip_all)]
pub async fn fetch_campaign_bundle(pool: &Pool, campaign_id: &str) -> Result<Option<CampaignBundle>> {
    let row = sqlx::query(
        "SELECT c.id, c.user_id, c.template_id, c.industry, c.is_active, c.weekday, c.hour, c.max_sends, \
                t.name AS template_name, t.subject, t.body, t.variables, \
                u.email AS owner_email, u.full_name AS owner_full_name \
         FROM campaigns c \
         JOIN email_templates t ON t.id = c.template_id \
         JOIN users u ON u.id = c.user_id \
         WHERE c.id = ?",
    )
    .bind(campaign_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let campaign = campaign_from_row(&row)?;
    let variables: String = row.get("variables");
    let variables: Vec<String> = serde_json::from_str(&variables)
        .with_context(|| format!("template {} has malformed variables", campaign.template_id))?;

    let template = EmailTemplate {
        id: campaign.template_id.clone(),
        name: row.get("template_name"),
        subject: row.get("subject"),
        body: row.get("body"),
        variables,
    };
    let owner = User {
        id: campaign.user_id.clone(),
        email: row.get("owner_email"),
        full_name: row.get("owner_full_name"),
    };
    Ok(Some(CampaignBundle {
        campaign,
        template,
        owner,
    }))
}

#[instrument(skip_all)]
pub async fn insert_company(pool: &Pool, company: &NewCompany) -> Result<String> {
    let id = new_id();
    sqlx::query("INSERT INTO companies (id, name, website, industry) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&company.name)
        .bind(&company.website)
        .bind(&company.industry)
        .execute(pool)
        .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn insert_enrichment(
    pool: &Pool,
    company_id: &str,
    owner_name: Option<&str>,
    owner_email: Option<&str>,
) -> Result<String> {
    let id = new_id();
    sqlx::query(
        "INSERT INTO enrichments (id, company_id, owner_name, owner_email) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(company_id)
    .bind(owner_name)
    .bind(owner_email)
    .execute(pool)
    .await
    .with_context(|| format!("failed to enrich company {company_id}"))?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn add_target(pool: &Pool, campaign_id: &str, company_id: &str) -> Result<String> {
    let id = new_id();
    sqlx::query("INSERT INTO outreach_targets (id, campaign_id, company_id) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(campaign_id)
        .bind(company_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to add company {company_id} to campaign {campaign_id}"))?;
    Ok(id)
}

/// All targets of a campaign with their company and the company's first
/// enrichment record (insertion order).
#[instrument(skip_all)]
pub async fn fetch_targets(pool: &Pool, campaign_id: &str) -> Result<Vec<TargetContext>> {
    let rows = sqlx::query(
        "SELECT t.id, t.campaign_id, t.company_id, t.send_count, t.last_sent_at, \
                c.name AS company_name, c.website, c.industry, \
                e.id AS enrichment_id, e.owner_name, e.owner_email \
         FROM outreach_targets t \
         JOIN companies c ON c.id = t.company_id \
         LEFT JOIN enrichments e ON e.rowid = ( \
             SELECT e2.rowid FROM enrichments e2 WHERE e2.company_id = t.company_id \
             ORDER BY e2.rowid ASC LIMIT 1) \
         WHERE t.campaign_id = ? \
         ORDER BY t.created_at, t.rowid",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<TargetContext> {
            let company_id: String = row.get("company_id");
            let target = OutreachTarget {
                id: row.get("id"),
                campaign_id: row.get("campaign_id"),
                company_id: company_id.clone(),
                send_count: row.get("send_count"),
                last_sent_at: row.try_get::<Option<DateTime<Utc>>, _>("last_sent_at")?,
            };
            let company = Company {
                id: company_id.clone(),
                name: row.get("company_name"),
                website: row.get("website"),
                industry: row.get("industry"),
            };
            let enrichment = row
                .get::<Option<String>, _>("enrichment_id")
                .map(|id| Enrichment {
                    id,
                    company_id,
                    owner_name: row.get("owner_name"),
                    owner_email: row.get("owner_email"),
                });
            Ok(TargetContext {
                target,
                company,
                enrichment,
            })
        })
        .collect()
}

/// Take a send lease on a target. Succeeds only if the counter still equals
/// `expected_send_count` and no unexpired lease is held.
#[instrument(skip_all)]
pub async fn claim_target(
    pool: &Pool,
    target_id: &str,
    expected_send_count: i64,
    now: DateTime<Utc>,
    lease_seconds: i64,
) -> Result<bool> {
    let now_ts = now.timestamp();
    let res = sqlx::query(
        "UPDATE outreach_targets SET lease_expires_at = ? \
         WHERE id = ? AND send_count = ? AND (lease_expires_at IS NULL OR lease_expires_at <= ?)",
    )
    .bind(now_ts + lease_seconds)
    .bind(target_id)
    .bind(expected_send_count)
    .bind(now_ts)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Advance the counters after a successful send and drop the lease.
/// Returns false if the counter moved since it was read.
#[instrument(skip_all)]
pub async fn record_send(
    pool: &Pool,
    target_id: &str,
    expected_send_count: i64,
    sent_at: DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE outreach_targets SET send_count = send_count + 1, last_sent_at = ?, lease_expires_at = NULL \
         WHERE id = ? AND send_count = ?",
    )
    .bind(sent_at)
    .bind(target_id)
    .bind(expected_send_count)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn release_target(pool: &Pool, target_id: &str) -> Result<()> {
    sqlx::query("UPDATE outreach_targets SET lease_expires_at = NULL WHERE id = ?")
        .bind(target_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_email_log(pool: &Pool, entry: &EmailLog) -> Result<()> {
    sqlx::query(
        "INSERT INTO email_logs (id, campaign_id, company_id, recipient, subject, status, error_message, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.campaign_id)
    .bind(&entry.company_id)
    .bind(&entry.recipient)
    .bind(&entry.subject)
    .bind(entry.status.as_str())
    .bind(&entry.error_message)
    .bind(entry.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent log entries first, optionally for one campaign.
#[instrument(skip_all)]
pub async fn recent_logs(
    pool: &Pool,
    campaign_id: Option<&str>,
    limit: i64,
) -> Result<Vec<EmailLog>> {
    let rows = sqlx::query(
        "SELECT id, campaign_id, company_id, recipient, subject, status, error_message, created_at \
         FROM email_logs WHERE (? IS NULL OR campaign_id = ?) \
         ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(campaign_id)
    .bind(campaign_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<EmailLog> {
            let status: String = row.get("status");
            Ok(EmailLog {
                id: row.get("id"),
                campaign_id: row.get("campaign_id"),
                company_id: row.get("company_id"),
                recipient: row.get("recipient"),
                subject: row.get("subject"),
                status: SendStatus::parse_status(&status)
                    .ok_or_else(|| anyhow!("unknown email log status {}", status))?,
                error_message: row.get("error_message"),
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
