//! Campaign dispatch: gate, render, send and record, one target at a time.
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::db;
use crate::mailer::model::OutgoingEmail;
use crate::mailer::EmailSender;
use crate::model::{CampaignBundle, EmailLog, TargetContext};
use crate::outcome;
use crate::schedule::{self, Eligibility};
use crate::template;

/// Failures that abort a whole dispatch call.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load campaign {campaign_id}: {cause:#}")]
    LoadCampaign {
        campaign_id: String,
        cause: anyhow::Error,
    },
    #[error("failed to load targets of campaign {campaign_id}: {cause:#}")]
    LoadTargets {
        campaign_id: String,
        cause: anyhow::Error,
    },
    #[error("failed to list active campaigns: {0:#}")]
    ListCampaigns(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub from: String,
    pub reply_to: String,
    /// Pause between two provider calls within one run.
    pub send_delay: Duration,
    pub cooldown: chrono::Duration,
    pub lease_seconds: i64,
    pub clock: FixedOffset,
}

impl DispatchSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            from: cfg.email.from.clone(),
            reply_to: cfg.email.reply_to.clone(),
            send_delay: Duration::from_millis(cfg.dispatch.send_delay_ms),
            cooldown: chrono::Duration::days(cfg.dispatch.cooldown_days),
            lease_seconds: cfg.dispatch.lease_seconds,
            clock: schedule::schedule_clock(cfg.app.utc_offset_minutes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CapReached,
    CoolingDown,
    NoRecipient,
    /// Another run holds the target or already advanced its counter.
    Contended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Sent { message_id: String },
    Failed(String),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent: u64,
    pub failed: u64,
}

impl DispatchSummary {
    pub fn record(&mut self, outcome: &TargetOutcome) {
        match outcome {
            TargetOutcome::Sent { .. } => self.sent += 1,
            TargetOutcome::Failed(_) => self.failed += 1,
            TargetOutcome::Skipped(_) => {}
        }
    }

    pub fn merge(&mut self, other: DispatchSummary) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Which campaigns a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignScope {
    /// One campaign; when `owner` is set the campaign must belong to it.
    One {
        campaign_id: String,
        owner: Option<String>,
    },
    /// Every active campaign of one user.
    Owner(String),
    All,
}

impl CampaignScope {
    pub fn from_ids(campaign_id: Option<String>, user_id: Option<String>) -> Self {
        match (campaign_id, user_id) {
            (Some(campaign_id), owner) => CampaignScope::One { campaign_id, owner },
            (None, Some(user_id)) => CampaignScope::Owner(user_id),
            (None, None) => CampaignScope::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub campaigns: usize,
    pub summary: DispatchSummary,
}

/// Process one campaign. Missing, inactive or not-due campaigns yield zero
/// counts without writing anything.
pub async fn process_campaign(
    pool: &SqlitePool,
    sender: &dyn EmailSender,
    settings: &DispatchSettings,
    campaign_id: &str,
    immediate: bool,
    now: DateTime<Utc>,
) -> Result<DispatchSummary, DispatchError> {
    Dispatcher::new(pool, sender, settings)
        .campaign(campaign_id, None, immediate, now)
        .await
}

/// State shared by every campaign of one run. The send delay is measured
/// from the previous provider call, whichever campaign made it.
struct Dispatcher<'a> {
    pool: &'a SqlitePool,
    sender: &'a dyn EmailSender,
    settings: &'a DispatchSettings,
    last_send: Option<Instant>,
}

impl<'a> Dispatcher<'a> {
    fn new(
        pool: &'a SqlitePool,
        sender: &'a dyn EmailSender,
        settings: &'a DispatchSettings,
    ) -> Self {
        Self {
            pool,
            sender,
            settings,
            last_send: None,
        }
    }

    #[instrument(skip(self, now))]
    async fn campaign(
        &mut self,
        campaign_id: &str,
        owner: Option<&str>,
        immediate: bool,
        now: DateTime<Utc>,
    ) -> Result<DispatchSummary, DispatchError> {
        let bundle = db::fetch_campaign_bundle(self.pool, campaign_id)
            .await
            .map_err(|cause| DispatchError::LoadCampaign {
                campaign_id: campaign_id.to_string(),
                cause,
            })?;

        let Some(bundle) = bundle else {
            info!("campaign not found; nothing to send");
            return Ok(DispatchSummary::default());
        };
        if owner.is_some_and(|o| o != bundle.campaign.user_id) {
            info!("campaign belongs to another user; nothing to send");
            return Ok(DispatchSummary::default());
        }
        if !bundle.campaign.is_active {
            debug!("campaign inactive; skipping");
            return Ok(DispatchSummary::default());
        }
        if !immediate && !schedule::is_due(&bundle.campaign, now, &self.settings.clock) {
            debug!(
                weekday = bundle.campaign.weekday,
                hour = bundle.campaign.hour,
                "campaign not due"
            );
            return Ok(DispatchSummary::default());
        }

        let targets = db::fetch_targets(self.pool, campaign_id)
            .await
            .map_err(|cause| DispatchError::LoadTargets {
                campaign_id: campaign_id.to_string(),
                cause,
            })?;

        let mut summary = DispatchSummary::default();
        for target in &targets {
            let outcome = self.target(&bundle, target, immediate, now).await;
            summary.record(&outcome);
        }

        info!(
            targets = targets.len(),
            sent = summary.sent,
            failed = summary.failed,
            "campaign processed"
        );
        Ok(summary)
    }

    async fn target(
        &mut self,
        bundle: &CampaignBundle,
        ctx: &TargetContext,
        immediate: bool,
        now: DateTime<Utc>,
    ) -> TargetOutcome {
        let (pool, settings) = (self.pool, self.settings);
        let campaign = &bundle.campaign;
        let target = &ctx.target;

        match schedule::is_eligible(target, campaign, immediate, now, settings.cooldown) {
            Eligibility::Eligible => {}
            Eligibility::CapReached => return TargetOutcome::Skipped(SkipReason::CapReached),
            Eligibility::CoolingDown => return TargetOutcome::Skipped(SkipReason::CoolingDown),
        }

        let Some(recipient) = ctx.recipient() else {
            info!(
                target_id = %target.id,
                company = %ctx.company.name,
                "no recipient email for company; skipping"
            );
            return TargetOutcome::Skipped(SkipReason::NoRecipient);
        };

        let vars = template::outreach_variables(
            campaign,
            &bundle.owner,
            &ctx.company,
            ctx.enrichment.as_ref(),
        );
        let rendered = template::render(&bundle.template, &vars, &settings.reply_to);

        match db::claim_target(pool, &target.id, target.send_count, now, settings.lease_seconds)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(target_id = %target.id, "target held by another run; skipping");
                return TargetOutcome::Skipped(SkipReason::Contended);
            }
            Err(err) => {
                error!(?err, target_id = %target.id, "failed to claim target");
                let reason = format!("could not reserve target: {err:#}");
                outcome::log(
                    pool,
                    &EmailLog::failed(
                        &campaign.id,
                        &ctx.company.id,
                        recipient,
                        &rendered.subject,
                        reason.clone(),
                        Utc::now(),
                    ),
                )
                .await;
                return TargetOutcome::Failed(reason);
            }
        }

        let email = OutgoingEmail {
            from: settings.from.clone(),
            to: vec![recipient.to_string()],
            subject: rendered.subject.clone(),
            html: rendered.html_body,
            reply_to: settings.reply_to.clone(),
        };

        self.throttle().await;
        match self.sender.send(&email).await {
            Ok(message_id) => {
                let sent_at = Utc::now();
                outcome::log(
                    pool,
                    &EmailLog::sent(&campaign.id, &ctx.company.id, recipient, &email.subject, sent_at),
                )
                .await;
                match db::record_send(pool, &target.id, target.send_count, sent_at).await {
                    Ok(true) => {}
                    Ok(false) => warn!(target_id = %target.id, "send counter moved during dispatch"),
                    Err(err) => {
                        error!(?err, target_id = %target.id, "failed to update send counters")
                    }
                }
                info!(target_id = %target.id, %recipient, %message_id, "email sent");
                TargetOutcome::Sent { message_id }
            }
            Err(err) => {
                warn!(%err, target_id = %target.id, %recipient, "email send failed");
                let reason = err.to_string();
                outcome::log(
                    pool,
                    &EmailLog::failed(
                        &campaign.id,
                        &ctx.company.id,
                        recipient,
                        &email.subject,
                        reason.clone(),
                        Utc::now(),
                    ),
                )
                .await;
                if let Err(err) = db::release_target(pool, &target.id).await {
                    warn!(?err, target_id = %target.id, "failed to release target lease");
                }
                TargetOutcome::Failed(reason)
            }
        }
    }

    /// Wait out the send delay since the previous provider call, then mark
    /// this call as the latest one.
    async fn throttle(&mut self) {
        if let Some(last) = self.last_send {
            tokio::time::sleep_until(last + self.settings.send_delay).await;
        }
        self.last_send = Some(Instant::now());
    }
}

/// Process every campaign in `scope` and sum the results. The first fatal
/// error aborts the run. The send delay applies across campaign boundaries.
#[instrument(skip(pool, sender, settings, now))]
pub async fn run(
    pool: &SqlitePool,
    sender: &dyn EmailSender,
    settings: &DispatchSettings,
    scope: &CampaignScope,
    immediate: bool,
    now: DateTime<Utc>,
) -> Result<RunReport, DispatchError> {
    let mut dispatcher = Dispatcher::new(pool, sender, settings);
    let mut report = RunReport::default();

    let ids = match scope {
        CampaignScope::One { campaign_id, owner } => {
            report.summary = dispatcher
                .campaign(campaign_id, owner.as_deref(), immediate, now)
                .await?;
            report.campaigns = 1;
            return Ok(report);
        }
        CampaignScope::Owner(user_id) => db::active_campaign_ids(pool, Some(user_id.as_str())).await,
        CampaignScope::All => db::active_campaign_ids(pool, None).await,
    }
    .map_err(DispatchError::ListCampaigns)?;

    for id in &ids {
        let summary = dispatcher.campaign(id, None, immediate, now).await?;
        report.summary.merge(summary);
    }
    report.campaigns = ids.len();
    Ok(report)
}

/// In-process stand-in for an external cron: one full run per tick.
pub async fn run_periodic(
    pool: SqlitePool,
    sender: std::sync::Arc<dyn EmailSender>,
    settings: std::sync::Arc<DispatchSettings>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match run(
            &pool,
            sender.as_ref(),
            &settings,
            &CampaignScope::All,
            false,
            Utc::now(),
        )
        .await
        {
            Ok(report) => info!(
                campaigns = report.campaigns,
                sent = report.summary.sent,
                failed = report.summary.failed,
                "scheduled dispatch finished"
            ),
            Err(err) => error!(%err, "scheduled dispatch failed"),
        }
    }
}
