//! Types used by the queue broker.

use serde_json::Value;
use std::time::Duration;

/// The three logical queues, each consumed by its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    VoterImport,
    Geocode,
    Scheduled,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [
        QueueName::VoterImport,
        QueueName::Geocode,
        QueueName::Scheduled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::VoterImport => "voter-import",
            QueueName::Geocode => "geocode",
            QueueName::Scheduled => "scheduled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "voter-import" => Some(QueueName::VoterImport),
            "geocode" => Some(QueueName::Geocode),
            "scheduled" => Some(QueueName::Scheduled),
            _ => None,
        }
    }
}

/// Enqueue options: optional delayed delivery and the redelivery budget.
#[derive(Debug, Clone)]
pub struct EnqueueOpts {
    pub delay: Option<Duration>,
    /// Attempts before a nacked/expired unit is dropped to the failed count.
    pub max_attempts: u32,
}

impl Default for EnqueueOpts {
    fn default() -> Self {
        Self {
            delay: None,
            max_attempts: 3,
        }
    }
}

/// Handle identifying one claimed unit; required for ack/nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseToken {
    pub(crate) queue: QueueName,
    pub(crate) token: u64,
}

/// One claimed unit of work.
#[derive(Debug, Clone)]
pub struct Claimed {
    /// Broker job key; equals the durable job id.
    pub job_key: i64,
    pub payload: Value,
    pub release: ReleaseToken,
}

/// Observability counters for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
    /// Waiting units held back because the queue is paused.
    pub paused: u64,
}
