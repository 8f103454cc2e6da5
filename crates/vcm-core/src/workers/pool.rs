//! Pool spawning and the per-worker claim loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::VcmConfig;
use crate::geocode::{GeocodeSettings, ProviderRegistry};
use crate::import::ImporterRegistry;
use crate::orchestrator::Orchestrator;
use crate::queue::QueueName;

use super::unit::process_unit;

/// Composition-root handle passed to every worker at startup. Registries are
/// constructed once and referenced read-only.
pub struct WorkerEnv {
    pub orch: Arc<Orchestrator>,
    pub importers: Arc<ImporterRegistry>,
    pub geocoders: Arc<ProviderRegistry>,
    pub geocode_settings: GeocodeSettings,
    pub import_progress_interval: u64,
}

/// Running pools plus their shutdown handle.
pub struct WorkerPools {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPools {
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal all workers and wait for them to drain their current unit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Spawn one pool per queue with sizes from persisted configuration; each
/// pool size is clamped to `[1, max_workers]`.
pub fn spawn_worker_pools(env: Arc<WorkerEnv>, cfg: &VcmConfig) -> WorkerPools {
    let (tx, rx) = watch::channel(false);
    let cap = cfg.max_workers.max(1);
    let pools = [
        (QueueName::VoterImport, cfg.import_workers),
        (QueueName::Geocode, cfg.geocode_workers),
        (QueueName::Scheduled, cfg.scheduled_workers),
    ];

    let mut handles = Vec::new();
    for (queue, size) in pools {
        let size = size.clamp(1, cap);
        for n in 0..size {
            let env = Arc::clone(&env);
            let rx = rx.clone();
            let tag = format!("{}-{n}", queue.as_str());
            handles.push(tokio::spawn(run_worker(env, queue, tag, rx)));
        }
    }
    tracing::info!(workers = handles.len(), "worker pools started");

    WorkerPools {
        shutdown: tx,
        handles,
    }
}

async fn run_worker(
    env: Arc<WorkerEnv>,
    queue: QueueName,
    tag: String,
    shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker = %tag, "worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let claimed = env
            .orch
            .broker()
            .claim(queue, &tag, Duration::from_millis(500))
            .await;
        let Some(unit) = claimed else {
            continue;
        };
        process_unit(&env, &tag, unit).await;
    }
    tracing::debug!(worker = %tag, "worker stopped");
}
