// Main entry point for the just-in-time access service

use anyhow::{Context, Result};
use clap::Parser;
use jit_access::server::{AccessService, ServiceSettings, ServiceState};
use jit_access::{kernel::ServiceDeps, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grants and revokes Active Directory access when Safeguard access requests open and close.
#[derive(Parser, Debug)]
#[command(name = "arsg-jit-access", version)]
struct Args {
    /// Validate configuration and both remote systems, then exit without listening
    #[arg(long)]
    test: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jit_access=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting Active Roles just-in-time access service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        appliance = %config.safeguard_appliance,
        directory = %config.active_roles_url,
        attribute = %config.access_attribute,
        "Configuration loaded"
    );

    let deps = ServiceDeps::from_config(&config).context("Failed to build remote clients")?;
    let mut service = AccessService::new(deps, ServiceSettings::from_config(&config, args.test));

    let state = service
        .start()
        .await
        .context("Failed to start access service")?;
    if state == ServiceState::TestStopped {
        tracing::info!("Startup validation passed");
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    if let Some(stats) = service.stop().await.context("Failed to stop access service")? {
        tracing::info!(handled = stats.handled(), failed = stats.failed, "Events handled");
    }

    Ok(())
}
