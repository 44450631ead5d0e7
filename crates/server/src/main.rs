//! Urumi server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use urumi_core::config::AppConfig;
use urumi_server::{AppState, create_router};

/// Urumi - e-commerce store provisioning control plane
#[derive(Parser, Debug)]
#[command(name = "urumid")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "URUMI_CONFIG", default_value = "config/server.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration (file is optional, env vars can provide/override
    // everything).
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        figment = figment.merge(Toml::file(&args.config));
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("URUMI_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!("{},tower_http=info", config.server.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.server.environment,
        "Urumi control plane starting"
    );

    urumi_server::metrics::register_metrics();

    // Initialize the state database
    let metadata = urumi_metadata::from_config(&config.database)
        .await
        .context("failed to initialize state database")?;
    metadata
        .health_check()
        .await
        .context("state database health check failed")?;
    tracing::info!("State database initialized");

    // Initialize the cluster gateway
    let gateway = urumi_kube::from_config(&config.cluster, config.provisioner.retry.to_policy())
        .context("failed to initialize cluster gateway")?;
    // A cluster that is down at boot can recover later; readiness
    // reports it until then.
    if let Err(err) = gateway.health_ping().await {
        tracing::warn!(error = %err, "Cluster gateway not reachable at startup");
    }

    // Create application state
    let state = AppState::new(config.clone(), metadata, gateway);

    // Records left in flight by a previous process are unrecoverable
    // without their worker; mark them failed and clean up.
    let recovered = state
        .provisioner
        .recover_orphaned_runs()
        .await
        .context("failed to recover orphaned provisioning runs")?;
    if recovered > 0 {
        tracing::warn!(recovered, "Marked orphaned provisioning runs as failed");
    }

    // Spawn the worker watchdog
    let _watchdog_handle = Arc::clone(&state.workers).spawn_watchdog();

    // Spawn the rate limiter sweep if limiting is enabled
    if let Some(interval) = state.rate_limit_cleanup_interval() {
        urumi_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // In-flight workers observe this at their next suspension point
        // and park their records at the last committed checkpoint.
        let _ = shutdown.send(true);
    })
    .await?;

    tracing::info!("Shut down; in-flight workers stopped at their last committed checkpoint");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM. In-flight workers are cancelled
/// cooperatively when the process exits; their records keep the last
/// committed checkpoint and are reaped at the next startup.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
