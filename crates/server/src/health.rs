//! Readiness endpoint: verification store state and the upstreams in use.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use reqwest::Url;
use rostergate_core::config::AppConfig;
use rostergate_db::{DbPool, SqlVerificationRepository};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HealthState {
    records: SqlVerificationRepository,
    upstreams: Upstreams,
}

impl HealthState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        Self {
            records: SqlVerificationRepository::new(db_pool),
            upstreams: Upstreams::from_config(config),
        }
    }
}

/// Where the workflow reads the roster, sends codes and grants roles.
/// Credentials and URL paths are left out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Upstreams {
    pub guild_id: String,
    pub roster_sheet: String,
    pub mail_host: String,
}

impl Upstreams {
    fn from_config(config: &AppConfig) -> Self {
        let mail_host = Url::parse(&config.mail.endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .unwrap_or_else(|| "<unparsable>".to_string());
        Self {
            guild_id: config.gateway.guild_id.clone(),
            roster_sheet: format!("{} ({})", config.roster.sheet_id, config.roster.range),
            mail_host,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreCheck {
    pub status: &'static str,
    pub records: Option<u64>,
    pub verified: Option<u64>,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub verification_store: StoreCheck,
    pub upstreams: Upstreams,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Serves `app` (health plus any merged routes) in the background.
pub async fn spawn(bind_address: &str, port: u16, app: Router) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http endpoint terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let verification_store = store_check(&state.records).await;
    let ready = verification_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        verification_store,
        upstreams: state.upstreams,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(records: &SqlVerificationRepository) -> StoreCheck {
    match records.counts().await {
        Ok(counts) => StoreCheck {
            status: "ready",
            records: Some(counts.total),
            verified: Some(counts.verified),
            detail: "verification records readable".to_string(),
        },
        Err(error) => {
            warn!(
                event_name = "system.health.store_unavailable",
                correlation_id = "health",
                error = %error,
                "verification store is not readable"
            );
            StoreCheck {
                status: "degraded",
                records: None,
                verified: None,
                detail: format!("verification records unavailable: {error}"),
            }
        }
    }
}
