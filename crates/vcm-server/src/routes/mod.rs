//! Route handlers, grouped by resource.

pub mod geocoding;
pub mod import;
pub mod jobs;
pub mod providers;
pub mod queues;
