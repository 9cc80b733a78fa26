use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use outreach_dispatch::config;
use outreach_dispatch::db;
use outreach_dispatch::dispatch::{self, CampaignScope, DispatchSettings};
use outreach_dispatch::mailer::{EmailSender, ResendClient};
use outreach_dispatch::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about = "Email campaign dispatcher")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP trigger (and the periodic trigger if configured)
    Serve,
    /// Run one dispatch pass and exit
    Run {
        #[arg(long)]
        campaign: Option<String>,
        #[arg(long)]
        user: Option<String>,
        /// Ignore send windows, cooldowns and caps
        #[arg(long)]
        immediate: bool,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if matches!(args.command, Command::ExampleConfig) {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let sender: Arc<dyn EmailSender> = Arc::new(ResendClient::from_config(&cfg)?);
    let settings = Arc::new(DispatchSettings::from_config(&cfg));

    match args.command {
        Command::Serve => {
            if let Some(period) = cfg.tick_interval() {
                info!(?period, "starting periodic dispatch");
                tokio::spawn(dispatch::run_periodic(
                    pool.clone(),
                    sender.clone(),
                    settings.clone(),
                    period,
                ));
            }
            let addr: SocketAddr = cfg
                .app
                .listen_addr
                .parse()
                .context("invalid app.listen_addr")?;
            server::serve(
                addr,
                AppState {
                    pool,
                    sender,
                    settings,
                },
            )
            .await
        }
        Command::Run {
            campaign,
            user,
            immediate,
        } => {
            let scope = CampaignScope::from_ids(campaign, user);
            let report =
                dispatch::run(&pool, sender.as_ref(), &settings, &scope, immediate, Utc::now())
                    .await?;
            println!(
                "campaigns={} sent={} failed={}",
                report.campaigns, report.summary.sent, report.summary.failed
            );
            Ok(())
        }
        Command::ExampleConfig => Ok(()),
    }
}
