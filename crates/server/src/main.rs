mod bootstrap;
mod discord;
mod health;
mod ingress;
mod mailer;
mod sheets;
mod telemetry;

use anyhow::Result;
use rostergate_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use rostergate_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be up before bootstrap emits its first event.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let bootstrap::Application { config, db_pool, landing, runner, ingress } =
        bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &config.server.bind_address,
        config.server.health_check_port,
        health::router(health::HealthState::new(db_pool.clone(), &config))
            .merge(ingress::router(ingress)),
    )
    .await?;

    match landing.bootstrap().await {
        Ok(bootstrap) => tracing::info!(
            event_name = "system.server.landing_ready",
            correlation_id = "bootstrap",
            channel_id = %bootstrap.channel.0,
            message_id = %bootstrap.message.0,
            verified_role = %bootstrap.verified_role,
            "landing channel prepared"
        ),
        Err(error) => tracing::warn!(
            event_name = "system.server.landing_failed",
            correlation_id = "bootstrap",
            error = %error,
            "landing channel could not be prepared; slash commands remain available"
        ),
    }

    let gateway = tokio::spawn(async move { runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        ingress_path = ingress::INGRESS_PATH,
        "rostergate-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "rostergate-server stopping"
    );

    gateway.abort();
    db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
