use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;

use tfidx_chain_client::{ChainClient, RpcChainClient};
use tfidx_indexer::config::Config;
use tfidx_indexer::metrics;
use tfidx_indexer::scanner::{Scanner, ScannerSettings};
use tfidx_indexer::worker::{run_fetch_worker, WorkerPool};
use tfidx_primitives::{BlockNumber, ChainConstants, MintingPeriod, TimePeriod};
use tfidx_storage::Database;

use crate::cli::{Command, CLI};


mod cli;


fn main() -> anyhow::Result<()> {
    let args = CLI::parse();

    if let Some(Command::FetchWorker { endpoint }) = args.command {
        return fetch_worker_main(&endpoint)
    }

    init_tracing();

    let mut config = match args.config.as_deref() {
        Some(file) => Config::read(file).with_context(|| {
            format!("failed to read config from '{}'", file)
        })?,
        None => Config::default()
    };
    if let Some(endpoint) = args.endpoint.clone() {
        config.endpoint = Some(endpoint);
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(secs) = args.poll_interval_secs {
        config.poll_interval_secs = secs;
    }
    config.validate().context("invalid settings")?;

    let endpoint = config.endpoint.clone()
        .ok_or_else(|| anyhow!("no chain endpoint, pass --endpoint or set it in the config"))?;

    let db = Database::open(&args.database_dir).context("failed to open database")?;

    if args.reindex {
        info!("--reindex given, wiping the database");
        db.truncate()?;
    }

    if let Some((base, top)) = db.verify_progress().context("database is inconsistent")? {
        info!(base, top, "verified the processed-blocks ledger");
    }

    let db = Arc::new(db);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            if let Some(port) = args.prom_port {
                let mut registry = prometheus_client::registry::Registry::default();
                metrics::register_metrics(&mut registry);
                tokio::spawn(async move {
                    if let Err(err) = metrics::run_server(registry, port).await {
                        tracing::error!(error =? err, "metrics server failed");
                    }
                });
            }

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("received shutdown signal");
                let _ = shutdown_tx.send(true);
            });

            let start_height = match (db.resume_height(), args.start_height) {
                (Some(top), given) => {
                    if given.is_some() {
                        tracing::warn!(
                            resume_height = top,
                            "--start-height is ignored, the database already has progress"
                        );
                    }
                    // unused, the scanner resumes from the store
                    0
                },
                (None, Some(height)) => height,
                (None, None) => default_start_height(&endpoint).await?
            };

            let fetcher = WorkerPool::spawn(&endpoint, config.workers)?;

            let scanner = Scanner::new(db, fetcher, ScannerSettings {
                start_height,
                follow: !args.no_follow,
                poll_interval: Duration::from_secs(config.poll_interval_secs),
                backoff_ms: config.backoff_ms.clone(),
                max_fetch_attempts: config.max_fetch_attempts,
                max_commit_attempts: config.max_commit_attempts
            });

            scanner.run(shutdown_rx).await
        })
}


fn fetch_worker_main(endpoint: &str) -> anyhow::Result<()> {
    // workers log to stderr, stdout carries the response stream
    let env_filter = tracing_subscriber::EnvFilter::builder().parse_lossy(
        std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV)
            .unwrap_or("info".to_string()),
    );
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run_fetch_worker(endpoint))
}


/// Picks the default backfill start: the first block of the minting
/// period the chain head currently falls into.
///
/// The head height is correlated with wall-clock period bounds via the
/// head block's timestamp and the target block time, then clamped to
/// the epoch anchor.
async fn default_start_height(endpoint: &str) -> anyhow::Result<BlockNumber> {
    let client = RpcChainClient::from_url(endpoint)
        .context("invalid chain endpoint URL")?;

    let constants: ChainConstants = client.chain_constants().await
        .context("failed to fetch chain constants")?;
    let head = client.head_height().await
        .context("failed to fetch the chain head height")?;
    let head_block = client.get_block(head).await
        .with_context(|| format!("failed to fetch the head block {}", head))?;

    let now = head_block.timestamp_secs();
    let period = TimePeriod::containing(now);
    let blocks_back = (now - period.start).max(0) as u64 / constants.block_time_secs.max(1);
    let start = head
        .saturating_sub(blocks_back)
        .max(constants.epoch_anchor);

    let minting = MintingPeriod::containing(&constants, start);
    info!(
        head,
        start_height = start,
        period_id = minting.period_id,
        "no saved progress and no --start-height, starting from the current minting period"
    );

    Ok(start)
}


fn init_tracing() {
    use std::io::IsTerminal;

    let env_filter = tracing_subscriber::EnvFilter::builder().parse_lossy(
        std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV)
            .unwrap_or("info".to_string()),
    );

    if std::io::stdout().is_terminal() {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .compact()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(false)
            .init();
    }
}


async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
