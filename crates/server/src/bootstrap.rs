use std::sync::Arc;
use std::time::Duration;

use rostergate_core::config::{AppConfig, ConfigError, LoadOptions};
use rostergate_core::verification::ports::SystemClock;
use rostergate_core::verification::{
    GuildGateway, NotificationSink, Provisioner, RosterSource, VerificationPolicy,
    VerificationPorts, VerificationService,
};
use rostergate_db::{connect_from_config, migrations, DbPool, SqlVerificationRepository};
use rostergate_gateway::commands::{CommandRouter, SlashCommandHandler};
use rostergate_gateway::cooldown::CooldownGate;
use rostergate_gateway::events::verification_dispatcher;
use rostergate_gateway::landing::{LandingSettings, LandingSurface};
use rostergate_gateway::socket::{GatewayRunner, ReconnectPolicy};
use rostergate_gateway::surface::ChatSurface;
use thiserror::Error;
use tracing::info;

use crate::discord::DiscordRest;
use crate::ingress::{self, ChannelTransport, IngressState};
use crate::mailer::HttpMailSink;
use crate::sheets::SheetsRosterSource;
use crate::telemetry::TracingAuditSink;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub landing: LandingSurface,
    pub runner: GatewayRunner,
    pub ingress: IngressState,
}

/// Outbound integrations; swapped for fakes in tests.
pub struct Adapters {
    pub roster: Arc<dyn RosterSource>,
    pub notifications: Arc<dyn NotificationSink>,
    pub guild: Arc<dyn GuildGateway>,
    pub surface: Arc<dyn ChatSurface>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("adapter setup failed: {0}")]
    Adapter(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let discord = Arc::new(
        DiscordRest::from_config(&config.gateway)
            .map_err(|error| BootstrapError::Adapter(error.to_string()))?,
    );
    let adapters = Adapters {
        roster: Arc::new(
            SheetsRosterSource::from_config(&config.roster)
                .map_err(|error| BootstrapError::Adapter(error.to_string()))?,
        ),
        notifications: Arc::new(
            HttpMailSink::from_config(&config.mail)
                .map_err(|error| BootstrapError::Adapter(error.to_string()))?,
        ),
        guild: discord.clone(),
        surface: discord,
    };

    let db_pool = open_database(&config).await?;
    Ok(assemble(config, db_pool, adapters))
}

pub async fn open_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );
    Ok(db_pool)
}

/// Wires the verification service, landing surface and gateway runner.
pub fn assemble(config: AppConfig, db_pool: DbPool, adapters: Adapters) -> Application {
    let policy = VerificationPolicy::from_config(&config);
    let provisioner =
        Arc::new(Provisioner::new(adapters.guild.clone(), policy.verified_role_name.clone()));
    let service = Arc::new(VerificationService::new(
        VerificationPorts {
            roster: adapters.roster,
            store: Arc::new(SqlVerificationRepository::new(db_pool.clone())),
            notifications: adapters.notifications,
            guild: adapters.guild,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
        },
        policy,
    ));

    let landing = LandingSurface::new(
        service.clone(),
        adapters.surface.clone(),
        provisioner,
        LandingSettings {
            channel_name: config.gateway.landing_channel.clone(),
            prompt_timeout: Duration::from_secs(config.verification.prompt_timeout_secs),
        },
    );
    let cooldown = CooldownGate::new(Duration::from_secs(config.verification.command_cooldown_secs));
    let dispatcher = verification_dispatcher(
        SlashCommandHandler::new(CommandRouter::new(service, cooldown)),
        &landing,
    );

    let (ingress, receiver) = ingress::channel(config.gateway.app_token.clone());
    let runner = GatewayRunner::new(
        Arc::new(ChannelTransport::new(receiver, adapters.surface)),
        dispatcher,
        ReconnectPolicy::default(),
    );

    Application { config, db_pool, landing, runner, ingress }
}
