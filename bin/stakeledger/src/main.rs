//! stakeledger - StakingEscrow / PolicyManager event indexer.
//!
//! # Usage
//!
//! ```bash
//! # Replay a decoded feed into Postgres
//! stakeledger --feed events.jsonl --staking-escrow 0xbbd3...
//!
//! # Tail a growing feed with environment overrides
//! FEED_PATH=/data/events.jsonl RPC_URL=http://localhost:8545 stakeledger --follow
//!
//! # Dry run without a database
//! stakeledger --memory --feed events.jsonl
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use stakeledger_core::error::IndexerError;
use stakeledger_core::metrics::init_metrics;
use stakeledger_core::models::Address;
use stakeledger_core::ports::{ChainState, Repositories};
use stakeledger_core::services::{IndexerConfig, IndexerService};
use stakeledger_ethereum::{FeedConfig, JsonlEventSource, RpcChainState, RpcChainStateConfig};
use stakeledger_handlers::{BundleRegistry, PolicyBundle, StakingBundle, StakingConfig};
use stakeledger_storage::{Database, DatabaseConfig, MemoryRepositories, PgRepositories};

/// stakeledger CLI - NuCypher staking indexer.
#[derive(Parser, Debug)]
#[command(name = "stakeledger")]
#[command(about = "stakeledger - StakingEscrow / PolicyManager event indexer")]
#[command(version)]
struct Cli {
    /// JSON-lines file of decoded contract logs.
    #[arg(long, env = "FEED_PATH", default_value = "events.jsonl")]
    feed: PathBuf,

    /// Keep tailing the feed at end of file.
    #[arg(long, env = "FEED_FOLLOW")]
    follow: bool,

    /// Ethereum JSON-RPC endpoint (archive node).
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// StakingEscrow contract address.
    #[arg(long, env = "STAKING_ESCROW_ADDRESS", value_parser = parse_address)]
    staking_escrow: Address,

    /// Network name; must match the feed and any indexed data.
    #[arg(long, env = "NETWORK", default_value = "mainnet")]
    network: String,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/stakeledger"
    )]
    database_url: String,

    /// Index into memory instead of Postgres (dry run).
    #[arg(long)]
    memory: bool,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Purge all indexed data from the database and exit.
    ///
    /// This deletes every entity and audit record and resets the indexer
    /// cursor. Schema, views and migrations are preserved.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,

    /// On CommitmentMade, refresh `staked` from `stakerInfo`.
    #[arg(long, env = "REFRESH_STAKED")]
    refresh_staked: bool,

    /// After sub-stake events, reconcile the count with `getSubStakesLength`.
    #[arg(long, env = "RECONCILE_SUBSTAKES")]
    reconcile_substakes: bool,
}

/// Parse a contract address.
fn parse_address(s: &str) -> Result<Address, String> {
    Address::from_hex(s).map_err(|e| format!("Invalid address '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting stakeledger");
    debug!(feed = %cli.feed.display(), follow = cli.follow, "Event feed");
    debug!(rpc_url = %cli.rpc_url, staking_escrow = %cli.staking_escrow, "Chain endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 📦 HANDLER BUNDLES
    // ─────────────────────────────────────────────────────────────────────────
    let chain: Arc<dyn ChainState> = Arc::new(
        RpcChainState::new(RpcChainStateConfig {
            rpc_url: cli.rpc_url.clone(),
            staking_escrow: cli.staking_escrow,
            ..Default::default()
        })
        .context("Failed to create RPC client")?,
    );
    let staking_config = StakingConfig {
        refresh_staked_on_commitment: cli.refresh_staked,
        reconcile_substakes: cli.reconcile_substakes,
    };

    let mut bundle_registry = BundleRegistry::new();
    bundle_registry.register(Box::new(StakingBundle::new(chain, staking_config)));
    bundle_registry.register(Box::new(PolicyBundle::new()));

    let source = Arc::new(JsonlEventSource::new(FeedConfig {
        path: cli.feed.clone(),
        chain_id: cli.network.clone(),
        follow: cli.follow,
        ..Default::default()
    }));
    let indexer_config = IndexerConfig {
        chain_id: cli.network.clone(),
        ..Default::default()
    };

    if cli.memory {
        info!("🧪 In-memory mode, nothing will be persisted");
        let repositories = Arc::new(MemoryRepositories::new());
        return run_indexer(
            indexer_config,
            source,
            repositories,
            bundle_registry,
            metrics_enabled,
            cli.metrics_port,
        )
        .await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");
    info!("🗄️  Connecting to database...");
    let db = Database::connect(&DatabaseConfig::for_indexer(&cli.database_url))
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run migrations")?;

    let applied = bundle_registry
        .run_migrations(db.pool())
        .await
        .context("Failed to run bundle migrations")?;
    info!(bundle_migrations = applied, "🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    let db = Arc::new(db);
    let repositories = Arc::new(PgRepositories::new(db.clone()));

    if cli.purge {
        let result = handle_purge(&db, repositories.as_ref(), &bundle_registry, cli.yes).await;
        db.close().await;
        return result;
    }

    let result = run_indexer(
        indexer_config,
        source,
        repositories,
        bundle_registry,
        metrics_enabled,
        cli.metrics_port,
    )
    .await;

    db.close().await;
    result
}

/// Run the indexer until the feed drains, it fails, or a shutdown signal.
async fn run_indexer<R: Repositories + 'static>(
    config: IndexerConfig,
    source: Arc<JsonlEventSource>,
    repositories: Arc<R>,
    bundle_registry: BundleRegistry,
    metrics_enabled: bool,
    metrics_port: u16,
) -> Result<()> {
    let kinds = bundle_registry.entity_kinds();
    info!(bundles = ?bundle_registry.bundle_names(), "📦 Handler bundles ready");
    let handlers = Arc::new(bundle_registry.into_handler_registry());

    let indexer = IndexerService::new(config, source, repositories.clone(), handlers);

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut indexer_handle = tokio::spawn(
        async move { indexer.run(shutdown_rx).await }.instrument(info_span!("indexer")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ stakeledger ready");
    if metrics_enabled {
        info!("   📊 Metrics:  http://localhost:{}/metrics", metrics_port);
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    let outcome = tokio::select! {
        joined = &mut indexer_handle => joined,
        _ = shutdown_signal() => {
            // ─────────────────────────────────────────────────────────────────
            // 🛑 SHUTDOWN
            // ─────────────────────────────────────────────────────────────────
            info!("🛑 Shutting down...");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(Duration::from_secs(30), &mut indexer_handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("⚠️  Indexer shutdown timed out");
                    indexer_handle.abort();
                    return Ok(());
                }
            }
        }
    };

    let result = match outcome.context("Indexer task panicked")? {
        Ok(()) | Err(IndexerError::ShutdownRequested) => Ok(()),
        Err(e) => {
            error!(error = ?e, "❌ Indexer error");
            Err(e.into())
        }
    };

    log_entity_counts(repositories.as_ref(), &kinds).await;
    info!("🛑 Shutdown complete");
    result
}

/// Log the number of stored entities per kind.
async fn log_entity_counts<R: Repositories>(repositories: &R, kinds: &[&'static str]) {
    for kind in kinds {
        match repositories.entities().count_entities(kind).await {
            Ok(count) => info!("   📊 {}: {}", kind, count),
            Err(e) => warn!(kind, error = %e, "⚠️  Failed to count entities"),
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "❌ Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "❌ Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(
    db: &Database,
    repositories: &PgRepositories,
    bundle_registry: &BundleRegistry,
    skip_confirmation: bool,
) -> Result<()> {
    let kinds = bundle_registry.entity_kinds();

    warn!("⚠️  PURGE MODE: This will delete ALL indexed data!");
    warn!("   - Entities: {}", kinds.join(", "));
    warn!("   - All audit event records");
    warn!("   - The indexer cursor will be reset");
    warn!("   - Schema, views and migrations will be preserved");
    log_entity_counts(repositories, &kinds).await;

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");
    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   📦 Entities removed: {}", stats.entities_removed);
    info!("   📣 Events removed: {}", stats.events_removed);
    info!("   The indexer will start from the beginning of the feed on next run");

    Ok(())
}
