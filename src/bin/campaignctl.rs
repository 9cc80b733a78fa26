use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use outreach_dispatch::config;
use outreach_dispatch::db::{self, NewCampaign, NewCompany, NewTemplate};
use outreach_dispatch::model::EmailTemplate;

#[derive(Debug, Parser)]
#[command(author, version, about = "Manage campaigns, templates and outreach targets")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a campaign owner
    User {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Add an email template from subject/body files
    Template {
        #[arg(long)]
        name: String,
        #[arg(long)]
        subject: String,
        /// Plain-text body file; paragraphs separated by blank lines
        #[arg(long)]
        body_file: PathBuf,
        /// Declared placeholder names, comma separated
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
    },
    #[command(subcommand)]
    Campaign(CampaignCmd),
    /// Add a company
    Company {
        #[arg(long)]
        name: String,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        industry: Option<String>,
    },
    /// Attach owner contact data to a company
    Enrich {
        #[arg(long)]
        company: String,
        #[arg(long)]
        owner_name: Option<String>,
        #[arg(long)]
        owner_email: Option<String>,
    },
    #[command(subcommand)]
    Target(TargetCmd),
    /// Show recent send attempts
    Logs {
        #[arg(long)]
        campaign: Option<String>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum CampaignCmd {
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        template: String,
        #[arg(long)]
        industry: String,
        /// 0 = Sunday
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=6))]
        weekday: u8,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=23))]
        hour: u8,
        #[arg(long)]
        max_sends: Option<i64>,
    },
    List {
        #[arg(long)]
        user: Option<String>,
    },
    Activate {
        id: String,
    },
    Deactivate {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum TargetCmd {
    Add {
        #[arg(long)]
        campaign: String,
        #[arg(long)]
        company: String,
    },
    List {
        #[arg(long)]
        campaign: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let app = config::load_app(Some(&args.config))?;
    app.ensure_dirs()?;

    let pool = db::init_pool(&app.database_url()).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::User { email, name } => {
            let id = db::create_user(&pool, &email, name.as_deref()).await?;
            println!("{id}");
        }
        Command::Template {
            name,
            subject,
            body_file,
            variables,
        } => {
            let body = std::fs::read_to_string(&body_file)
                .with_context(|| format!("failed to read {}", body_file.display()))?;
            let preview = EmailTemplate {
                id: String::new(),
                name: name.clone(),
                subject: subject.clone(),
                body: body.clone(),
                variables: variables.clone(),
            };
            for token in preview.undeclared_placeholders() {
                warn!(%token, "placeholder used but not declared; it will render verbatim unless supplied");
            }
            let id = db::insert_template(
                &pool,
                &NewTemplate {
                    name,
                    subject,
                    body,
                    variables,
                },
            )
            .await?;
            println!("{id}");
        }
        Command::Campaign(CampaignCmd::Add {
            user,
            template,
            industry,
            weekday,
            hour,
            max_sends,
        }) => {
            let id = db::insert_campaign(
                &pool,
                &NewCampaign {
                    user_id: user,
                    template_id: template,
                    industry,
                    weekday,
                    hour,
                    max_sends,
                },
            )
            .await?;
            println!("{id}");
        }
        Command::Campaign(CampaignCmd::List { user }) => {
            for c in db::list_campaigns(&pool, user.as_deref()).await? {
                println!(
                    "{}\t{}\tactive={}\tweekday={}\thour={}\tmax_sends={}",
                    c.id,
                    c.industry,
                    c.is_active,
                    c.weekday,
                    c.hour,
                    c.max_sends
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "-".into())
                );
            }
        }
        Command::Campaign(CampaignCmd::Activate { id }) => set_active(&pool, &id, true).await?,
        Command::Campaign(CampaignCmd::Deactivate { id }) => set_active(&pool, &id, false).await?,
        Command::Company {
            name,
            website,
            industry,
        } => {
            let id = db::insert_company(
                &pool,
                &NewCompany {
                    name,
                    website,
                    industry,
                },
            )
            .await?;
            println!("{id}");
        }
        Command::Enrich {
            company,
            owner_name,
            owner_email,
        } => {
            let id = db::insert_enrichment(
                &pool,
                &company,
                owner_name.as_deref(),
                owner_email.as_deref(),
            )
            .await?;
            println!("{id}");
        }
        Command::Target(TargetCmd::Add { campaign, company }) => {
            let id = db::add_target(&pool, &campaign, &company).await?;
            println!("{id}");
        }
        Command::Target(TargetCmd::List { campaign }) => {
            for t in db::fetch_targets(&pool, &campaign).await? {
                println!(
                    "{}\t{}\t{}\tsends={}\tlast={}",
                    t.target.id,
                    t.company.name,
                    t.recipient().unwrap_or("-"),
                    t.target.send_count,
                    t.target
                        .last_sent_at
                        .map(|ts| ts.to_rfc3339())
                        .unwrap_or_else(|| "-".into())
                );
            }
        }
        Command::Logs { campaign, limit } => {
            for l in db::recent_logs(&pool, campaign.as_deref(), limit).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    l.created_at.to_rfc3339(),
                    l.status.as_str(),
                    l.recipient,
                    l.subject,
                    l.error_message.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

async fn set_active(pool: &db::Pool, id: &str, active: bool) -> Result<()> {
    if !db::set_campaign_active(pool, id, active).await? {
        return Err(anyhow!("campaign {} not found", id));
    }
    println!("{id} active={active}");
    Ok(())
}
