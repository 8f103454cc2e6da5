//! Orchestrator error type; drives HTTP status mapping in the control plane.

use crate::store::{JobId, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("job {0} not found")]
    NotFound(JobId),

    /// A transition outside the lifecycle state machine was requested.
    #[error("cannot {action} job {id} from status {from}")]
    IllegalTransition {
        id: JobId,
        action: &'static str,
        from: JobStatus,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// True for caller errors (bad transition, unknown id) as opposed to
    /// store failures.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::NotFound(_) | OrchestratorError::IllegalTransition { .. }
        )
    }
}
