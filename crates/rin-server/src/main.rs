mod api;
mod archive;
mod jobs;
mod scheduler;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};

#[derive(Debug, Parser)]
#[command(name = "rin-bot")]
#[command(about = "Discovers AI tool coupons, keeps them validated, and posts new ones to Discord")]
struct Cli {
    /// Run one scrape cycle and one cleanup cycle, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Arc::new(rin_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(env = %config.env, "rin-bot: starting");
    tracing::debug!(?config, "rin-bot: configuration loaded");

    rin_db::ensure_database_dir(&config.database_url)?;
    let pool_config = rin_db::PoolConfig::from_app_config(&config);
    let pool = rin_db::connect_pool(&config.database_url, pool_config).await?;
    rin_db::run_migrations(&pool).await?;

    let jobs = jobs::build_jobs(&pool, &config)?;

    if cli.once {
        let ok = scheduler::run_once(jobs, config.cycle_ceiling_multiplier).await;
        pool.close().await;
        if !ok {
            anyhow::bail!("one or more cycles did not complete");
        }
        return Ok(());
    }

    let scheduler = scheduler::Scheduler::start(jobs, config.cycle_ceiling_multiplier).await?;

    if config.api_enabled {
        let app = build_app(AppState { pool: pool.clone() });
        let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
        tracing::info!(addr = %config.bind_addr, "rin-bot: API listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    scheduler.shutdown(config.shutdown_grace()).await;
    pool.close().await;
    tracing::info!("rin-bot: stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
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
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
