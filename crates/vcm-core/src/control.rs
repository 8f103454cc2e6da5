//! Per-job abort flags for pause/cancel propagation.
//!
//! Workers register a flag when they claim a job; the orchestrator sets it
//! when pause or cancel is requested on a processing job. Handlers check the
//! flag between units of work and then consult the durable status to decide
//! whether to yield. The store is authoritative; the flag only shortens the
//! window until the next suspension point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::store::JobId;

/// Shared registry of job id -> abort flag. The worker pool passes the flag
/// into each handler; the orchestrator raises it on pause/cancel so in-flight
/// work stops at the next suspension point instead of finishing the batch.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<JobId, Arc<AtomicBool>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job; returns the abort flag to pass to the handler.
    pub fn register(&self, job_id: JobId) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.jobs.write().unwrap().insert(job_id, Arc::clone(&flag));
        flag
    }

    /// Unregister a job (call when the worker releases it, success or failure).
    pub fn unregister(&self, job_id: JobId) {
        self.jobs.write().unwrap().remove(&job_id);
    }

    /// Raise the abort flag for a job, if it is currently registered.
    pub fn request_abort(&self, job_id: JobId) {
        if let Some(flag) = self.jobs.read().unwrap().get(&job_id) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// True if the job is registered and its abort flag has been raised.
    pub fn abort_requested(&self, job_id: JobId) -> bool {
        self.jobs
            .read()
            .unwrap()
            .get(&job_id)
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}
