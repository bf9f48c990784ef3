//! Gatepass Server
//!
//! Event ticketing backend: orders and payments, ticket issuance and
//! at-most-once check-in at the venue gates.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url, get_redis_url};
use gatepass_core::coordination::{KeyValueStore, MemoryStore, RedisStore};
use gatepass_core::events::order_paid_channel;
use gatepass_core::framework::DatabaseProcessor;
use gatepass_core::payments::HttpPaymentGateway;
use gatepass_core::processors::TicketIssuer;
use gatepass_core::ticket_generation::TicketGenerator;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// How often the in-memory coordination store drops expired entries.
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Gatepass - event ticketing and check-in server
#[derive(Parser, Debug)]
#[command(name = "gatepass-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./gatepass-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting gatepass-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    let redis_url = get_redis_url(loaded_config.redis_url.clone());
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Convert to shared config with separate locks for each section
    let shared_config = loaded_config.into_shared();

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store: Arc<dyn KeyValueStore> = match redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis coordination store...");
            let store = RedisStore::connect(&url).await.map_err(|e| {
                tracing::error!("Failed to connect to Redis: {}", e);
                e
            })?;
            Arc::new(store)
        }
        None => {
            tracing::warn!(
                "No Redis configured; rate limits and idempotency keys are local to this process"
            );
            let store = Arc::new(MemoryStore::new());
            store.spawn_sweeper(MEMORY_SWEEP_INTERVAL, shutdown_rx.clone());
            store
        }
    };

    let db = DatabaseProcessor { pool: db_pool.clone() };
    let (order_paid_tx, order_paid_rx) = order_paid_channel();

    let issuer = TicketIssuer::new(
        Arc::new(db.clone()),
        TicketGenerator::new(Arc::new(db.clone())),
        order_paid_rx,
        shutdown_rx,
    );
    let issuer_handle = tokio::spawn(issuer.run());

    let state = AppState::new(
        db,
        shared_config.clone(),
        store,
        Arc::new(HttpPaymentGateway::new()),
        order_paid_tx,
    );

    // Spawn config reload handler (listens for SIGHUP)
    let (reload_shutdown, reload_handle) =
        spawn_config_reload_handler(shared_config, config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop background work before closing the pool it uses.
    let _ = shutdown_tx.send(true);
    reload_shutdown.notify_one();
    if let Err(e) = issuer_handle.await {
        tracing::error!("Ticket issuer task failed: {}", e);
    }
    let _ = reload_handle.await;

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
