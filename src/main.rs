//! bank_ledger - core ledger daemon
//!
//! Connects to Postgres, verifies the schema and runs the maintenance
//! scheduler until a shutdown signal arrives. Front ends embed the
//! library's handlers directly.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bank_ledger::audit::PgAuditSink;
use bank_ledger::jobs::{JobScheduler, JobSchedulerConfig};
use bank_ledger::notify::TracingGateway;
use bank_ledger::store::PgStore;
use bank_ledger::handlers::AdminHandler;
use bank_ledger::{db, Config, LedgerCore};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bank_ledger=debug,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.json_logs());

    tracing::info!(environment = %config.environment, "Starting bank_ledger");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let core = LedgerCore::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgAuditSink::new(pool.clone())),
        Arc::new(TracingGateway),
        config.policy(),
    );

    if let Some(bootstrap) = config.admin_bootstrap() {
        if AdminHandler::new(core.clone()).bootstrap_default(&bootstrap).await? {
            tracing::info!("Default admin created");
        }
    }

    let scheduler = JobScheduler::with_config(core, JobSchedulerConfig::from_config(&config));
    let jobs = scheduler.start();

    shutdown_signal().await;

    tracing::info!("Stopping maintenance jobs...");
    jobs.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
