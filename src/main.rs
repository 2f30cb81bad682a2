//! Resilient query layer service.
//!
//! Hosts the shared query context, runs its cache sweeps and serves the
//! admin API until SIGINT/SIGTERM.
//!
//! ```text
//! QueryContext
//!  ├─ DataConsistencyManager (memory + persisted tiers)
//!  │    └─ RequestDeduplicator ─▶ CircuitBreaker "Database"
//!  ├─ QueryBatcher ─▶ CircuitBreaker "COODashboard"
//!  └─ CircuitBreaker "SchemaValidation"
//!
//! Shutdown ─▶ cache sweepers, admin API (axum)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use resilient_query::admin::{setup_admin_router, AdminState};
use resilient_query::config::load_or_default;
use resilient_query::context::QueryContext;
use resilient_query::lifecycle::{wait_for_shutdown_signal, Shutdown};
use resilient_query::observability::{logging, metrics};

const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "resilient-query")]
#[command(about = "Resilient query layer service", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config.as_deref())?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-query starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let context = Arc::new(QueryContext::from_config(&config));
    let shutdown = Shutdown::new();
    let mut tasks = context.spawn_maintenance(&shutdown);

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let router = setup_admin_router(AdminState::new(Arc::clone(&context), config.admin.api_key.as_str()));
        let mut stop = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API server failed");
            }
        }));
    }

    wait_for_shutdown_signal().await?;
    shutdown.trigger();
    shutdown.drain(tasks, DRAIN_DEADLINE).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
