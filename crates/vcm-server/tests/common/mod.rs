//! In-process test harness: dispatch requests via `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use vcm_core::config::VcmConfig;
use vcm_core::control::JobControl;
use vcm_core::geocode::ProviderRegistry;
use vcm_core::import::ImporterRegistry;
use vcm_core::orchestrator::Orchestrator;
use vcm_core::queue::QueueBroker;
use vcm_core::store::Db;
use vcm_server::{build_router, AppState};

pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
}

pub async fn test_app() -> TestApp {
    test_app_with(VcmConfig::default(), ProviderRegistry::new().unwrap()).await
}

pub async fn test_app_with(cfg: VcmConfig, geocoders: ProviderRegistry) -> TestApp {
    let db = Db::open_memory().await.unwrap();
    let broker = Arc::new(QueueBroker::new(Duration::from_secs(
        cfg.claim_visibility_timeout_secs,
    )));
    let orch = Arc::new(Orchestrator::new(
        db,
        broker,
        Arc::new(JobControl::new()),
        cfg.error_log_cap,
    ));
    let state = Arc::new(AppState {
        orch,
        importers: Arc::new(ImporterRegistry::with_defaults()),
        geocoders: Arc::new(geocoders),
        config: cfg,
    });
    TestApp {
        app: build_router(Arc::clone(&state)),
        state,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body should be valid JSON")
    }

    #[allow(dead_code)]
    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("response body should be valid UTF-8")
    }
}

async fn dispatch(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should handle request");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("should collect response body")
        .to_bytes()
        .to_vec();
    TestResponse { status, body }
}

pub async fn get(app: &Router, path: &str) -> TestResponse {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .expect("valid GET request");
    dispatch(app, request).await
}

#[allow(dead_code)]
pub async fn get_with_key(app: &Router, path: &str, api_key: &str) -> TestResponse {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header("X-Api-Key", api_key)
        .body(Body::empty())
        .expect("valid GET request");
    dispatch(app, request).await
}

pub async fn post_json(app: &Router, path: &str, body: &Value) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid POST request");
    dispatch(app, request).await
}

#[allow(dead_code)]
pub async fn patch_json(app: &Router, path: &str, body: &Value) -> TestResponse {
    let request = Request::builder()
        .method("PATCH")
        .uri(path)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid PATCH request");
    dispatch(app, request).await
}

#[allow(dead_code)]
pub async fn delete(app: &Router, path: &str) -> TestResponse {
    let request = Request::builder()
        .method("DELETE")
        .uri(path)
        .body(Body::empty())
        .expect("valid DELETE request");
    dispatch(app, request).await
}

/// Multipart upload for the voter-import endpoint.
#[allow(dead_code)]
pub async fn post_import(
    app: &Router,
    file_name: &str,
    contents: &str,
    format: &str,
    import_type: &str,
) -> TestResponse {
    let boundary = "vcm-test-boundary";
    let mut body = String::new();
    body.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n"
    ));
    body.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"format\"\r\n\r\n{format}\r\n"
    ));
    body.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"importType\"\r\n\r\n{import_type}\r\n"
    ));
    body.push_str(&format!("--{boundary}--\r\n"));

    let request = Request::builder()
        .method("POST")
        .uri("/voter-import-jobs")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("valid multipart request");
    dispatch(app, request).await
}
