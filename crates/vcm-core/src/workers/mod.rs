//! Worker pools: one pool per queue, claiming units and driving handlers
//! through the orchestrator's lifecycle operations.

pub mod pool;
mod unit;


pub use pool::{spawn_worker_pools, WorkerEnv, WorkerPools};

use serde_json::Value;

/// How a handler invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Ran to the end; the worker completes the job with these output stats.
    Completed(Option<Value>),
    /// Observed pause/cancel at a suspension point and stopped cleanly after
    /// persisting its checkpoint. The worker acks without completing.
    Yielded,
}
