//! In-process queue broker.
//!
//! Three named queues route jobs to their worker pools. Delivery is
//! at-least-once: claims carry a visibility timeout and expire back onto the
//! queue, and the orchestrator's start CAS makes redelivery harmless.

mod broker;
mod types;

#[cfg(test)]
mod tests;

pub use broker::QueueBroker;
pub use types::{Claimed, EnqueueOpts, JobCounts, QueueName, ReleaseToken};
