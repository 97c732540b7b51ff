use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use phone_contacts::config::Config;
use phone_contacts::http::{self, AppState};
use phone_contacts::schema::Statements;
use phone_contacts::store::{postgres, PgStore};
use phone_contacts::{telemetry, ContactService};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "phone-contacts", about = "Contact matching service")]
struct Cli {
    /// Config file name (extension optional).
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    telemetry::init(&config.log, cli.debug);

    info!("Starting...");
    info!(database = %config.database.redacted_url(), "connecting to database");

    let statements =
        Statements::new(&config.database.tables).context("Invalid table configuration")?;
    let pool = postgres::connect_pool(&config.database);
    postgres::migrate(&pool)
        .await
        .context("Failed to migrate database")?;

    let store = PgStore::new(pool.clone(), statements);
    let service = Arc::new(ContactService::new(store));
    let app = http::router(AppState::new(service, config.request_timeout));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening at http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server terminated unexpectedly")?;

    pool.close().await;
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
