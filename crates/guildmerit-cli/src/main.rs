mod config;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use crate::config::AppConfig;
use guildmerit_core::journal::ACTOR_CHAT_USER;
use guildmerit_core::{
    AuditEvent, AuditFilter, RunMode, UserMetrics, contribution_metrics, filter_audit_events,
    format_audit_csv, format_audit_markdown, rank_by_activity,
};
use guildmerit_db::{SqlStorage, audit_events, create_pool, events, identity_links, run_migrations};
use guildmerit_discord::DiscordClient;
use guildmerit_engine::{Adapters, FileReportSink, Orchestrator};
use guildmerit_github::GithubApiClient;
use serde::Serialize;
use sqlx::{Any, Pool};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "guildmerit-cli")]
#[command(about = "Score GitHub contributions and plan Discord roles and issue assignments")]
#[command(version = VERSION)]
struct Cli {
    /// Path to the TOML configuration file (default: ./guildmerit.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingest/score/plan/apply cycle and print its summary as JSON
    RunOnce {
        /// Override runtime.mode (dry-run, observer, active)
        #[arg(long)]
        mode: Option<RunMode>,
    },

    /// Manage verified Discord <-> GitHub identity links
    Identity {
        #[command(subcommand)]
        command: IdentityCommands,
    },

    /// Export the audit journal
    ExportAudit {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Only events whose actor or GitHub user matches
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        event_type: Option<String>,

        /// Inclusive lower bound (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_timestamp)]
        from: Option<DateTime<Utc>>,

        /// Inclusive upper bound (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_timestamp)]
        to: Option<DateTime<Utc>>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print read-only activity metrics for stored events, ranked by score
    Metrics {
        /// Window length in days (default: scoring.period_days)
        #[arg(long)]
        days: Option<u32>,

        /// Only this GitHub user
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum IdentityCommands {
    /// Link a Discord user id to a GitHub login
    Link {
        #[arg(long)]
        chat_user_id: String,

        github_user: String,

        /// Record the link without marking it verified
        #[arg(long)]
        unverified: bool,
    },

    /// List every stored identity link
    List,
}

#[derive(Serialize)]
struct RankedMetrics<'a> {
    rank: usize,
    #[serde(flatten)]
    metrics: &'a UserMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
    Md,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 timestamp or YYYY-MM-DD, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(config.runtime.log_level))
        .init();

    let pool = create_pool(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    run_migrations(&pool).await.context("Failed to run database migrations")?;

    match cli.command {
        Commands::RunOnce { mode } => run_once_command(&config, pool, mode).await,
        Commands::Identity { command } => identity_command(&pool, command).await,
        Commands::ExportAudit {
            format,
            user,
            event_type,
            from,
            to,
            output,
        } => {
            let filter = AuditFilter {
                user,
                event_type,
                from,
                to,
            };
            export_audit_command(&pool, &filter, format, output).await
        }
        Commands::Metrics { days, user } => {
            metrics_command(&config, &pool, days, user.as_deref()).await
        }
    }
}

async fn run_once_command(
    config: &AppConfig,
    pool: Pool<Any>,
    mode: Option<RunMode>,
) -> Result<()> {
    let engine_config = config.engine_config(mode);
    engine_config.validate().context("Invalid configuration")?;

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let github = Arc::new(
        GithubApiClient::new(
            &config.github.token,
            &config.github.org,
            config.github.api_url.as_deref(),
        )
        .context("Failed to create GitHub client")?
        .with_repo_filter(config.github.repos.clone()),
    );

    let discord = Arc::new(
        match config.discord.api_url.as_deref() {
            Some(url) => {
                DiscordClient::with_base_url(&config.discord.token, &config.discord.guild_id, url)
            }
            None => DiscordClient::new(&config.discord.token, &config.discord.guild_id),
        }
        .context("Failed to create Discord client")?,
    );

    let adapters = Adapters {
        storage: Arc::new(SqlStorage::new(pool)),
        chat_reader: discord.clone(),
        chat_writer: discord,
        code_reader: github.clone(),
        code_writer: github,
        report_sink: Arc::new(FileReportSink::new(&config.runtime.data_dir)),
    };

    let orchestrator = Orchestrator::new(engine_config, config.github.org.clone(), adapters);
    let report = orchestrator
        .run_once(Utc::now())
        .await
        .context("Cycle failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn identity_command(pool: &Pool<Any>, command: IdentityCommands) -> Result<()> {
    match command {
        IdentityCommands::Link {
            chat_user_id,
            github_user,
            unverified,
        } => {
            let now = Utc::now();
            let link =
                identity_links::link_identity(pool, &chat_user_id, &github_user, !unverified, now)
                    .await
                    .context("Failed to store identity link")?;

            let event =
                AuditEvent::new(now, ACTOR_CHAT_USER, chat_user_id.as_str(), "identity_linked")
                    .with("github_user", github_user.as_str())
                    .with("verified", link.verified);
            audit_events::append_audit_event(pool, &event)
                .await
                .context("Failed to record identity link in audit journal")?;

            info!("Linked Discord user {} to GitHub user {}", chat_user_id, github_user);
            println!("{}", serde_json::to_string_pretty(&link)?);
        }
        IdentityCommands::List => {
            let links = identity_links::list_identity_links(pool)
                .await
                .context("Failed to list identity links")?;
            println!("{}", serde_json::to_string_pretty(&links)?);
        }
    }
    Ok(())
}

async fn export_audit_command(
    pool: &Pool<Any>,
    filter: &AuditFilter,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let events = audit_events::list_audit_events(pool)
        .await
        .context("Failed to read audit journal")?;
    let selected = filter_audit_events(&events, filter);

    let rendered = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&selected)?,
        ExportFormat::Csv => format_audit_csv(&selected),
        ExportFormat::Md => format_audit_markdown(&selected),
    };

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Exported {} audit events to {}", selected.len(), path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

async fn metrics_command(
    config: &AppConfig,
    pool: &Pool<Any>,
    days: Option<u32>,
    user: Option<&str>,
) -> Result<()> {
    let period_end = Utc::now();
    let days = days.unwrap_or(config.scoring.period_days);
    let period_start = period_end - Duration::days(i64::from(days));

    let stored = events::list_events_since(pool, period_start)
        .await
        .context("Failed to read contribution events")?;
    let ranked = rank_by_activity(contribution_metrics(
        &stored,
        period_start,
        period_end,
        &config.scoring.weights,
    ));

    let selected: Vec<RankedMetrics> = ranked
        .iter()
        .enumerate()
        .filter(|(_, metrics)| user.is_none_or(|user| metrics.user == user))
        .map(|(index, metrics)| RankedMetrics {
            rank: index + 1,
            metrics,
        })
        .collect();

    info!("Computed metrics for {} users over {} days", ranked.len(), days);
    println!("{}", serde_json::to_string_pretty(&selected)?);
    Ok(())
}
