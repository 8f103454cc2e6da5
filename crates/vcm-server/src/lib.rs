//! HTTP control plane for the VCM background-job engine.

pub mod app;
pub mod error;
pub mod routes;

pub use app::{build_router, AppState};
