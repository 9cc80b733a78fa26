#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use outreach_dispatch::db::{self, NewCampaign, NewCompany, NewTemplate};
use outreach_dispatch::dispatch::DispatchSettings;
use outreach_dispatch::mailer::model::OutgoingEmail;
use outreach_dispatch::mailer::{EmailSender, SendError};

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn settings() -> DispatchSettings {
    DispatchSettings {
        from: "Exit School <outreach@example.com>".into(),
        reply_to: "team@example.com".into(),
        send_delay: Duration::ZERO,
        cooldown: chrono::Duration::days(7),
        lease_seconds: 300,
        clock: FixedOffset::east_opt(0).unwrap(),
    }
}

/// 2024-01-02 is a Tuesday.
pub fn tuesday(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, hour, minute, 0).unwrap()
}

/// Records every email; recipients listed in `fail_for` get a 500.
#[derive(Clone, Default)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    at: Arc<Mutex<Vec<Instant>>>,
    fail_for: Arc<Mutex<HashMap<String, String>>>,
}

impl RecordingSender {
    pub async fn fail_recipient(&self, recipient: &str, body: &str) {
        self.fail_for
            .lock()
            .await
            .insert(recipient.to_string(), body.to_string());
    }

    pub async fn calls(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }

    /// When each provider call started, in call order.
    pub async fn call_times(&self) -> Vec<Instant> {
        self.at.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, SendError> {
        self.at.lock().await.push(Instant::now());
        self.sent.lock().await.push(email.clone());
        let to = email.to.first().cloned().unwrap_or_default();
        if let Some(body) = self.fail_for.lock().await.get(&to) {
            return Err(SendError::Rejected {
                status: 500,
                body: body.clone(),
            });
        }
        Ok(format!("msg-{}", to))
    }
}

pub struct Seed {
    pub user_id: String,
    pub campaign_id: String,
}

/// Owner + template + campaign (Tuesday 10:00, given cap).
pub async fn seed_campaign(pool: &sqlx::SqlitePool, max_sends: Option<i64>) -> Seed {
    let user_id = db::create_user(pool, &format!("{}@owner.test", uuid::Uuid::new_v4()), Some("Olive Owner"))
        .await
        .unwrap();
    let template_id = db::insert_template(
        pool,
        &NewTemplate {
            name: "intro".into(),
            subject: "Quick question for {{company_name}}".into(),
            body: "Hi {{owner_name}},\n\nI help {{industry}} owners like {{company_name}} ({{website}}).\n\nBest,\n{{sender_name}}".into(),
            variables: vec![
                "company_name".into(),
                "owner_name".into(),
                "industry".into(),
                "website".into(),
                "sender_name".into(),
            ],
        },
    )
    .await
    .unwrap();
    let campaign_id = db::insert_campaign(
        pool,
        &NewCampaign {
            user_id: user_id.clone(),
            template_id,
            industry: "HVAC".into(),
            weekday: 2,
            hour: 10,
            max_sends,
        },
    )
    .await
    .unwrap();
    Seed {
        user_id,
        campaign_id,
    }
}

/// Company (+ enrichment when `email` is set) attached to the campaign.
/// Returns (target id, company id).
pub async fn seed_target(
    pool: &sqlx::SqlitePool,
    campaign_id: &str,
    name: &str,
    email: Option<&str>,
) -> (String, String) {
    let company_id = db::insert_company(
        pool,
        &NewCompany {
            name: name.into(),
            website: Some(format!("https://{}.test", name.to_lowercase())),
            industry: None,
        },
    )
    .await
    .unwrap();
    if let Some(email) = email {
        db::insert_enrichment(pool, &company_id, Some("Ann Owner"), Some(email))
            .await
            .unwrap();
    }
    let target_id = db::add_target(pool, campaign_id, &company_id).await.unwrap();
    (target_id, company_id)
}

pub async fn set_counters(
    pool: &sqlx::SqlitePool,
    target_id: &str,
    send_count: i64,
    last_sent_at: Option<DateTime<Utc>>,
) {
    sqlx::query("UPDATE outreach_targets SET send_count = ?, last_sent_at = ? WHERE id = ?")
        .bind(send_count)
        .bind(last_sent_at)
        .bind(target_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn send_count(pool: &sqlx::SqlitePool, target_id: &str) -> i64 {
    sqlx::query_scalar("SELECT send_count FROM outreach_targets WHERE id = ?")
        .bind(target_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn log_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM email_logs")
        .fetch_one(pool)
        .await
        .unwrap()
}
