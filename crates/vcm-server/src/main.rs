use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use vcm_core::config::{self, VcmConfig};
use vcm_core::control::JobControl;
use vcm_core::geocode::{GeocodeSettings, ProviderRegistry};
use vcm_core::import::ImporterRegistry;
use vcm_core::logging;
use vcm_core::orchestrator::Orchestrator;
use vcm_core::queue::QueueBroker;
use vcm_core::recovery;
use vcm_core::store::Db;
use vcm_core::workers::{spawn_worker_pools, WorkerEnv};

use vcm_server::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "vcm-server", about = "VCM background-job engine and control plane")]
struct Args {
    /// Address the control plane listens on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,
}

#[tokio::main]
async fn main() {
    // Initialize logging as early as possible.
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = run().await {
        eprintln!("vcm-server error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let cfg: VcmConfig = config::load_or_init()?;

    let db = Db::open_default().await?;
    let broker = Arc::new(QueueBroker::new(Duration::from_secs(
        cfg.claim_visibility_timeout_secs,
    )));
    let control = Arc::new(JobControl::new());
    let orch = Arc::new(Orchestrator::new(
        db,
        broker,
        control,
        cfg.error_log_cap,
    ));

    let importers = Arc::new(ImporterRegistry::with_defaults());
    let geocoders = Arc::new(ProviderRegistry::new()?);

    // Reconcile durable job state with the fresh broker before workers start.
    recovery::recover_and_requeue(&orch).await?;

    let env = Arc::new(WorkerEnv {
        orch: Arc::clone(&orch),
        importers: Arc::clone(&importers),
        geocoders: Arc::clone(&geocoders),
        geocode_settings: GeocodeSettings::from_config(&cfg),
        import_progress_interval: cfg.import_progress_interval,
    });
    let pools = spawn_worker_pools(env, &cfg);

    let state = Arc::new(AppState {
        orch,
        importers,
        geocoders,
        config: cfg,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!("control plane listening on {}", args.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pools.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
