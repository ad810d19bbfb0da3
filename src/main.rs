use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sea_orm::DatabaseConnection;
use tokio::signal;
use tracing::{error, info};

use storefront_logistics as app;
use app::carrier::{CarrierClient, MelhorEnvioClient};
use app::scheduler::{SyncSchedule, SyncScheduler};
use app::services::shipment_sync::SyncOutcome;

#[derive(Parser)]
#[command(
    name = "storefront-logistics",
    about = "Carrier reconciliation and return labels for the storefront",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the shipment sync scheduler until interrupted
    Scheduler,
    /// Run one reconciliation batch and print its summary
    SyncOnce,
    /// Serve the admin HTTP API
    Serve(ServeArgs),
    /// Apply pending database migrations
    Migrate,
}

#[derive(Args)]
struct ServeArgs {
    /// Also run the sync scheduler in this process
    #[arg(long)]
    with_scheduler: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = app::config::load_config().context("failed to load configuration")?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = app::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    if cfg.auto_migrate && !matches!(cli.command, Commands::Migrate) {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    match cli.command {
        Commands::Migrate => {
            app::db::run_migrations(&db_pool).await?;
        }
        Commands::Scheduler => {
            let state = build_state(&cfg, &db_pool)?;
            let schedule = SyncSchedule::from_config(&cfg.sync)?;
            info!("Starting shipment sync scheduler");
            SyncScheduler::new(state.shipment_sync.clone(), schedule)
                .run_until(shutdown_signal())
                .await;
        }
        Commands::SyncOnce => {
            let state = build_state(&cfg, &db_pool)?;
            let outcome = state.shipment_sync.run_batch().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if let SyncOutcome::Failed { reason } = outcome {
                anyhow::bail!("shipment sync failed: {}", reason);
            }
        }
        Commands::Serve(args) => {
            let state = build_state(&cfg, &db_pool)?;
            let scheduler = if args.with_scheduler {
                let schedule = SyncSchedule::from_config(&cfg.sync)?;
                let scheduler = SyncScheduler::new(state.shipment_sync.clone(), schedule);
                Some(tokio::spawn(scheduler.run_until(shutdown_signal())))
            } else {
                None
            };

            let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
                .parse()
                .context("invalid host/port")?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("storefront-logistics listening on http://{}", addr);

            axum::serve(listener, app::app_router(state).into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if let Some(handle) = scheduler {
                handle.await?;
            }
        }
    }

    info!("Closing database pool");
    db_pool.close().await?;
    Ok(())
}

/// Builds the carrier client and services; fails without a carrier token.
fn build_state(
    cfg: &app::config::AppConfig,
    db_pool: &DatabaseConnection,
) -> anyhow::Result<app::AppState> {
    let carrier: Arc<dyn CarrierClient> = Arc::new(
        MelhorEnvioClient::from_config(&cfg.carrier).context("carrier client not configured")?,
    );
    Ok(app::AppState::new(
        Arc::new(db_pool.clone()),
        cfg.clone(),
        carrier,
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
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
    info!("Shutdown signal received");
}
