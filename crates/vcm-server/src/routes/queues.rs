//! Queue observability: per-queue broker counters.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use vcm_core::queue::QueueName;

use crate::app::AppState;

pub async fn counts(State(state): State<Arc<AppState>>) -> Json<Value> {
    let broker = state.orch.broker();
    let mut out = serde_json::Map::new();
    for queue in QueueName::ALL {
        let counts = broker.job_counts(queue);
        out.insert(
            queue.as_str().to_string(),
            serde_json::to_value(counts).unwrap_or_else(|_| json!({})),
        );
    }
    Json(Value::Object(out))
}
