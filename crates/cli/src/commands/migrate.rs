use crate::commands::CommandResult;
use rostergate_core::config::{AppConfig, LoadOptions};
use rostergate_db::repositories::verification::VerificationCounts;
use rostergate_db::{connect_from_config, migrations, SqlVerificationRepository};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let counts = SqlVerificationRepository::new(pool.clone())
            .counts()
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<VerificationCounts, (&'static str, String, u8)>(counts)
    });

    match result {
        Ok(counts) => CommandResult::success(
            "migrate",
            format!(
                "applied pending migrations; {} verification record(s), {} verified",
                counts.total, counts.verified
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
