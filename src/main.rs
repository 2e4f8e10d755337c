use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use packledger::application::coordinator::BatchCoordinator;
use packledger::application::outcome::CycleAction;
use packledger::config::EngineConfig;
use packledger::domain::clock::{Clock, FixedClock, SystemClock};
use packledger::domain::ports::{LedgerStore, LedgerStoreRef, NotificationSinkRef};
use packledger::domain::subscription::maturation_from_hours;
use packledger::infrastructure::in_memory::InMemoryLedgerStore;
use packledger::infrastructure::notify::LogNotificationSink;
#[cfg(feature = "storage-rocksdb")]
use packledger::infrastructure::rocksdb::RocksDbLedgerStore;
use packledger::interfaces::csv::subscription_reader::SubscriptionReader;
use packledger::interfaces::csv::subscription_writer::SubscriptionWriter;
use packledger::interfaces::http::auth::AuthConfig;
use packledger::interfaces::http::server::{self, TriggerState};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "packledger", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import subscriptions, run one cycle and print the resulting state as CSV.
    Run {
        /// Subscriptions CSV to import before the cycle
        #[arg(long)]
        subscriptions: Option<PathBuf>,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// activate_pending, process_earnings or full_cycle
        #[arg(long, default_value_t = CycleAction::FullCycle)]
        action: CycleAction,

        /// Pin the clock to an RFC 3339 instant
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Serve the HTTP trigger endpoint.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        db_path: Option<PathBuf>,

        #[arg(long)]
        subscriptions: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            subscriptions,
            db_path,
            action,
            now,
            config,
        } => {
            let config = EngineConfig::load(config.as_deref()).into_diagnostic()?;
            init_tracing(&config.log_level);

            let store = open_store(db_path.or_else(|| config.storage.db_path.clone()))?;
            if let Some(csv) = subscriptions.or_else(|| config.storage.seed_csv.clone()) {
                import_subscriptions(&store, &csv, &config).await?;
            }

            let clock: Arc<dyn Clock> = match now {
                Some(instant) => Arc::new(FixedClock::new(instant)),
                None => Arc::new(SystemClock),
            };
            let coordinator = build_coordinator(store.clone(), clock, &config)?;

            let outcome = coordinator.run(action).await.into_diagnostic()?;
            tracing::info!(
                outcome = %serde_json::to_string(&outcome).into_diagnostic()?,
                "cycle outcome"
            );

            let subscriptions = store.all_subscriptions().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = SubscriptionWriter::new(stdout.lock());
            writer.write_subscriptions(subscriptions).into_diagnostic()?;
        }
        Command::Serve {
            config,
            db_path,
            subscriptions,
        } => {
            let config = EngineConfig::load(config.as_deref()).into_diagnostic()?;
            init_tracing(&config.log_level);
            tracing::debug!(?config, "configuration loaded");

            let store = open_store(db_path.or_else(|| config.storage.db_path.clone()))?;
            if let Some(csv) = subscriptions.or_else(|| config.storage.seed_csv.clone()) {
                import_subscriptions(&store, &csv, &config).await?;
            }

            let coordinator = build_coordinator(store, Arc::new(SystemClock), &config)?;
            let state = TriggerState {
                coordinator: Arc::new(coordinator),
                auth: AuthConfig {
                    bearer_token: config.trigger.bearer_token.clone(),
                },
            };
            server::serve(&config.trigger, state).await.into_diagnostic()?;
        }
    }

    Ok(())
}

fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDbLedgerStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}

/// Bad rows and already-known ids are logged and skipped.
async fn import_subscriptions(
    store: &LedgerStoreRef,
    path: &Path,
    config: &EngineConfig,
) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let default_maturation =
        maturation_from_hours(config.accrual.default_maturation_hours).into_diagnostic()?;
    let reader = SubscriptionReader::new(file);

    let mut imported = 0usize;
    for result in reader.subscriptions(default_maturation) {
        match result {
            Ok(subscription) => {
                let id = subscription.id;
                match store.insert_subscription(subscription).await {
                    Ok(()) => imported += 1,
                    Err(e) => tracing::warn!(subscription = %id, error = %e, "skipping subscription"),
                }
            }
            Err(e) => tracing::warn!(error = %e, "error reading subscription"),
        }
    }

    tracing::info!(imported, path = %path.display(), "subscriptions imported");
    Ok(())
}

fn build_coordinator(
    store: LedgerStoreRef,
    clock: Arc<dyn Clock>,
    config: &EngineConfig,
) -> Result<BatchCoordinator> {
    let sink: NotificationSinkRef = Arc::new(LogNotificationSink);
    let settings = config.engine_settings().into_diagnostic()?;
    Ok(BatchCoordinator::new(store, sink, clock, settings))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("packledger={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}
