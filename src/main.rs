//! top-of-the-pile: binary entrypoint.
//! Loads config, wires the concrete collaborators and runs one pass.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use top_of_the_pile::config::AppConfig;
use top_of_the_pile::enrich::Enricher;
use top_of_the_pile::fetch::HttpBodyFetcher;
use top_of_the_pile::locations;
use top_of_the_pile::notify::{DispatchOutcome, Dispatcher, Mailer, Notification, SmtpMailer};
use top_of_the_pile::posting::PostingQuery;
use top_of_the_pile::search::JsonFeedAdapter;
use top_of_the_pile::store::{JsonFileStore, PostingStore};
use top_of_the_pile::sync::SyncEngine;
use top_of_the_pile::{ClassifierSet, Pipeline, Reporter, TracingReporter};

#[derive(Parser, Debug)]
#[command(name = "top-of-the-pile", version, about = "Job posting watcher")]
struct Cli {
    /// Config file (overrides $TOP_OF_THE_PILE_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync, classify and notify once.
    Run {
        /// Restrict this pass to the given locations.
        #[arg(long, num_args = 1..)]
        locations: Vec<String>,
    },
    /// Load and validate the config, then exit.
    Validate,
    /// List postings awaiting notification.
    Pending,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "top_of_the_pile={level},sync={level},enrich={level},notify={level},warn"
        ))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Stand-in when `[mail]` is absent: the batch is logged, never marked.
struct UnconfiguredMailer;

#[async_trait::async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(
        &self,
        notification: &Notification,
        _recipients: &[String],
    ) -> Result<(), top_of_the_pile::error::MailError> {
        Err(top_of_the_pile::error::MailError::Build(format!(
            "mail is not configured; '{}' not sent",
            notification.subject
        )))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; secrets override the config file.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cfg = AppConfig::load(cli.config.as_deref())?;
    cfg.validate()?;

    match cli.command {
        Command::Validate => {
            println!("config OK: {} term(s), {} profile(s)", cfg.search.terms.len(), cfg.profiles.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Pending => {
            let store = JsonFileStore::open(&cfg.store.path).await?;
            let pending = store.find_by_flags(PostingQuery::pending_notification()).await?;
            for p in &pending {
                println!("{}\t{}\t{}", p.posted_at.to_rfc3339(), p.title, p.url);
            }
            println!("{} posting(s) awaiting notification", pending.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { locations } => run_pass(&cfg, locations).await,
    }
}

async fn run_pass(cfg: &AppConfig, only: Vec<String>) -> Result<ExitCode> {
    let locations = if only.is_empty() {
        locations::load(&cfg.locations)?
    } else {
        only
    };
    let terms: Vec<String> = cfg
        .search
        .terms
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter);
    let store: Arc<dyn PostingStore> = Arc::new(
        JsonFileStore::open(&cfg.store.path)
            .await
            .with_context(|| format!("opening store {}", cfg.store.path.display()))?,
    );
    let search = Arc::new(
        JsonFeedAdapter::new(cfg.search.endpoint.clone(), cfg.search.page_size)
            .with_api_key(cfg.search.api_key.clone())
            .with_timeout(cfg.sync.timeout_secs),
    );
    let fetcher = Arc::new(HttpBodyFetcher::new().with_timeout(cfg.enrich.timeout_secs));
    let classifiers = ClassifierSet::from_profiles(&cfg.profiles).context("compiling classifier profiles")?;

    let (mailer, recipients, mail_timeout): (Arc<dyn Mailer>, Vec<String>, u64) = match &cfg.mail {
        Some(m) => {
            let smtp = SmtpMailer::new(
                &m.host,
                m.port,
                m.tls,
                m.credentials(),
                &m.from,
                Duration::from_secs(m.timeout_secs),
            )?;
            (Arc::new(smtp) as Arc<dyn Mailer>, m.to.clone(), m.timeout_secs)
        }
        None => {
            tracing::warn!("no [mail] section; matches stay pending");
            (Arc::new(UnconfiguredMailer) as Arc<dyn Mailer>, Vec::new(), 30)
        }
    };

    let pipeline = Pipeline::new(
        SyncEngine::new(store.clone(), search, reporter.clone(), cfg.sync.settings()),
        Enricher::new(
            store.clone(),
            fetcher,
            classifiers,
            reporter.clone(),
            cfg.enrich.settings(),
        ),
        Dispatcher::new(store, mailer, reporter.clone(), recipients)
            // Leave headroom over the transport's own timeout.
            .with_timeout(Duration::from_secs(mail_timeout + 5)),
        reporter,
        cfg.sync.concurrency,
    );

    tracing::info!(terms = terms.len(), locations = locations.len(), "starting pass");
    let report = pipeline.run_pass(&terms, &locations).await;

    tracing::info!(
        synced = report.synced.len(),
        failed = report.sync_failures.len(),
        "sync finished"
    );
    if let Ok(e) = &report.enrich {
        tracing::info!(processed = e.processed, matched = e.matched, failed = e.failed.len(), "enrichment finished");
    }
    match &report.dispatch {
        Ok(DispatchOutcome::Sent { count }) => tracing::info!(count, "pass complete"),
        Ok(DispatchOutcome::Nothing) => tracing::info!("pass complete; nothing new"),
        Err(e) => tracing::error!(error = %e, "dispatch failed"),
    }

    Ok(if report.needs_attention() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
