//! Sphynx API server binary.
//!
//! Wires configuration, storage, the liveness sweeper and the HTTP router,
//! then serves until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sphynx_api::config::ApiConfig;
use sphynx_api::{AppState, router};
use sphynx_core::accounts::TracingResetNotifier;
use sphynx_core::agents::liveness::LivenessSweeper;
use sphynx_core::clock::{Clock, SystemClock};
use sphynx_core::config::{
    CoreConfig, DEFAULT_AUTH_TOKEN_TTL, DEFAULT_FRESHNESS_WINDOW, DEFAULT_RESET_TOKEN_TTL,
    DEFAULT_SWEEP_PERIOD,
};
use sphynx_core::store::memory::MemoryStore;
use sphynx_core::store::postgres::PgStore;
use sphynx_core::store::{AgentStore, UserDirectory};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the server. Every flag can also come from the
/// environment or a `.env` file.
#[derive(Parser, Debug)]
#[command(name = "sphynx_server", about = "Sphynx API server", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "SPHYNX_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/sphynx"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "SPHYNX_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Keep all data in memory instead of PostgreSQL. Lost on exit.
    #[arg(long, env = "SPHYNX_IN_MEMORY", default_value_t = false)]
    in_memory: bool,

    /// Base64-encoded HMAC secret for signing tokens (at least 32 bytes).
    #[arg(long, env = "SPHYNX_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Session token lifetime in seconds.
    #[arg(long, env = "SPHYNX_AUTH_TOKEN_TTL", default_value_t = DEFAULT_AUTH_TOKEN_TTL.as_secs())]
    auth_token_ttl: u64,

    /// Password-reset token lifetime in seconds.
    #[arg(long, env = "SPHYNX_RESET_TOKEN_TTL", default_value_t = DEFAULT_RESET_TOKEN_TTL.as_secs())]
    reset_token_ttl: u64,

    /// Seconds between liveness sweeps.
    #[arg(long, env = "SPHYNX_SWEEP_PERIOD", default_value_t = DEFAULT_SWEEP_PERIOD.as_secs())]
    sweep_period: u64,

    /// Seconds of silence before an active agent is marked inactive.
    #[arg(long, env = "SPHYNX_FRESHNESS_WINDOW", default_value_t = DEFAULT_FRESHNESS_WINDOW.as_secs())]
    freshness_window: u64,

    /// Browser origin allowed to send credentialed requests.
    #[arg(long, env = "SPHYNX_CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Mark the session cookie `Secure` (HTTPS deployments).
    #[arg(long, env = "SPHYNX_SECURE_COOKIES", default_value_t = false)]
    secure_cookies: bool,

    /// Email of the administrator created at startup when missing.
    #[arg(long, env = "SPHYNX_ADMIN_EMAIL", requires = "admin_password")]
    admin_email: Option<String>,

    /// Password for the startup administrator.
    #[arg(long, env = "SPHYNX_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

impl Args {
    fn core_config(&self) -> CoreConfig {
        CoreConfig {
            signing_secret: self.jwt_secret.clone(),
            auth_token_ttl: Duration::from_secs(self.auth_token_ttl),
            reset_token_ttl: Duration::from_secs(self.reset_token_ttl),
            sweep_period: Duration::from_secs(self.sweep_period),
            freshness_window: Duration::from_secs(self.freshness_window),
        }
    }

    fn api_config(&self) -> ApiConfig {
        ApiConfig {
            bind_addr: self.bind.clone(),
            cors_origin: self.cors_origin.clone(),
            secure_cookies: self.secure_cookies,
        }
    }
}

type Stores = (Arc<dyn UserDirectory>, Arc<dyn AgentStore>);

async fn open_stores(args: &Args) -> Result<Stores, Box<dyn std::error::Error>> {
    if args.in_memory {
        warn!("using in-memory store; data is lost on exit");
        let store = Arc::new(MemoryStore::new());
        let users: Arc<dyn UserDirectory> = store.clone();
        let agents: Arc<dyn AgentStore> = store;
        return Ok((users, agents));
    }

    info!(max_connections = args.max_connections, "connecting to PostgreSQL");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    sphynx_core::migrate::migrate(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let users: Arc<dyn UserDirectory> = store.clone();
    let agents: Arc<dyn AgentStore> = store;
    Ok((users, agents))
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
    }
    info!("shutdown requested");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sphynx_api=debug,sphynx_core=debug,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let core = args.core_config();
    core.validate()?;

    info!(version = sphynx_core::version(), bind = %args.bind, "starting sphynx_server");

    let (users, agents) = open_stores(&args).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state = AppState::new(
        &core,
        args.api_config(),
        users,
        agents.clone(),
        clock.clone(),
        Arc::new(TracingResetNotifier),
    )?;

    if let (Some(email), Some(password)) = (&args.admin_email, &args.admin_password) {
        if state.users.ensure_admin(email, password).await? {
            info!(email = %email, "created administrator");
        }
    }

    let cancel = CancellationToken::new();
    let sweeper =
        LivenessSweeper::new(agents, clock, core.liveness_settings()).spawn(cancel.clone());

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let serve_result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Stop the sweeper even if the server failed.
    cancel.cancel();
    let _ = sweeper.await;

    serve_result?;
    info!("sphynx_server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_seconds() {
        let args = Args::try_parse_from([
            "sphynx_server",
            "--jwt-secret",
            "c3BoeW54LXRlc3Qtc2lnbmluZy1rZXktMzItYnl0ZXM=",
            "--sweep-period",
            "7",
            "--freshness-window",
            "30",
        ])
        .unwrap();
        let core = args.core_config();
        assert_eq!(core.sweep_period, Duration::from_secs(7));
        assert_eq!(core.freshness_window, Duration::from_secs(30));
        assert!(core.signing_key().is_ok());
    }

    #[test]
    fn admin_email_requires_password() {
        let parsed = Args::try_parse_from([
            "sphynx_server",
            "--jwt-secret",
            "c3BoeW54LXRlc3Qtc2lnbmluZy1rZXktMzItYnl0ZXM=",
            "--admin-email",
            "admin@example.com",
        ]);
        assert!(parsed.is_err());
    }
}
