//! panelhubd - SimPanel hub daemon

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use anyhow::{Context, Result};
use clap::Parser;
use simpanel_hub::cli::Cli;
use simpanel_hub::{HubDaemon, notifier_for};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!("Starting panelhubd v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.load_config();
    let notifier = notifier_for(&config.dashboard).context("Failed to create dashboard client")?;
    if !config.dashboard.enabled {
        info!("Dashboard notifications disabled");
    }

    let daemon = HubDaemon::bind(config, notifier)
        .await
        .context("Failed to start hub")?;
    daemon.run().await
}
