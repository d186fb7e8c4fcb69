use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use school_admin_api::config::AppConfig;
use school_admin_api::database::{Database, PgTenantContext, Repositories};
use school_admin_api::{app, telemetry, AppState};

#[derive(Parser)]
#[command(name = "school-admin-api")]
#[command(about = "Multi-tenant school administration API server")]
#[command(version)]
struct Cli {
    #[arg(long, env = "CONFIG_FILE", help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Force JSON log output outside production")]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    // Load .env if present so local runs pick up JWT_SECRET, DB_PG_* etc.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("fatal: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    telemetry::init(&config.server, cli.json_logs || config.is_production())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
    info!("Starting school-admin-api in {:?} mode", config.server.env);

    let db = Database::connect(&config.db.pg)
        .await
        .context("failed to connect to database")?;
    db.health_check().await.context("database health check failed")?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);

    let state = AppState::new(
        config,
        Repositories::postgres(&db),
        Arc::new(PgTenantContext::new(db.clone())),
    )
    .context("failed to build application state")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("school-admin-api listening on http://{}", bind_addr);

    let server = axum::serve(listener, app(state)).with_graceful_shutdown(shutdown_signal());
    let mut served = tokio::spawn(async move { server.await });

    // Once a signal arrives, in-flight requests get `grace` to finish.
    let result = tokio::select! {
        joined = &mut served => joined.context("server task failed")?.context("server error"),
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_seconds = grace.as_secs(), "grace window elapsed; dropping remaining connections");
            served.abort();
            // Connections are dropped with the task, before the pool closes.
            if let Err(e) = served.await {
                if !e.is_cancelled() {
                    error!(error = %e, "server task failed during shutdown");
                }
            }
            Ok(())
        }
    };

    db.close().await;
    info!("shutdown complete");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
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
                error!(error = %e, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
