//! Pipeline tests with a scripted provider.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::control::JobControl;
use crate::orchestrator::Orchestrator;
use crate::queue::QueueBroker;
use crate::retry::{CallError, RetryPolicy};
use crate::store::{Db, HouseholdFilter, JobStatus, JobType, NewJob, NewProvider};
use crate::workers::HandlerOutcome;

use super::payload::GeocodingJobPayload;
use super::pipeline::{run_geocoding_job, GeocodeSettings};
use super::provider::{GeocodeProvider, GeocodeRequest, GeocodeResult};
use super::registry::ProviderRegistry;

#[derive(Clone, Copy)]
enum Script {
    Ok(f64, f64),
    NoMatch,
    Fail(u16),
}

struct MockProvider {
    id: &'static str,
    available: bool,
    script: Script,
    /// one_line -> call count, for duplicate-geocode assertions.
    calls: Mutex<HashMap<String, u32>>,
}

impl MockProvider {
    fn new(id: &'static str, script: Script) -> Self {
        Self {
            id,
            available: true,
            script,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn unavailable(id: &'static str) -> Self {
        Self {
            available: false,
            ..Self::new(id, Script::NoMatch)
        }
    }

    fn max_calls_per_address(&self) -> u32 {
        self.calls.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl GeocodeProvider for MockProvider {
    fn provider_id(&self) -> &str {
        self.id
    }

    fn provider_name(&self) -> &str {
        "scripted test provider"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn geocode(&self, req: &GeocodeRequest) -> Result<Option<GeocodeResult>, CallError> {
        *self.calls.lock().unwrap().entry(req.one_line()).or_insert(0) += 1;
        match self.script {
            Script::Ok(latitude, longitude) => Ok(Some(GeocodeResult {
                latitude,
                longitude,
                confidence: Some(0.9),
                match_type: Some("exact".into()),
                source: self.id.to_string(),
            })),
            Script::NoMatch => Ok(None),
            Script::Fail(code) => Err(CallError::Http(code)),
        }
    }
}

struct Fixture {
    orch: Arc<Orchestrator>,
    registry: Arc<ProviderRegistry>,
}

async fn fixture(provider: Arc<MockProvider>) -> Fixture {
    let db = Db::open_memory().await.unwrap();
    db.insert_provider(&NewProvider {
        provider_id: provider.id.to_string(),
        provider_name: "test".into(),
        is_enabled: true,
        is_primary: true,
        priority: 10,
        config: json!({}),
    })
    .await
    .unwrap();

    let mut registry = ProviderRegistry::new().unwrap();
    registry.register(provider);

    let broker = Arc::new(QueueBroker::new(Duration::from_secs(300)));
    let orch = Arc::new(Orchestrator::new(
        db,
        broker,
        Arc::new(JobControl::new()),
        1000,
    ));
    Fixture {
        orch,
        registry: Arc::new(registry),
    }
}

fn fast_settings() -> GeocodeSettings {
    GeocodeSettings {
        batch_size: 100,
        call_timeout: Duration::from_secs(1),
        batch_delay: Duration::from_millis(1),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

async fn create_static_job(fx: &Fixture, filters: HouseholdFilter, limit: i64) -> crate::store::JobRecord {
    let payload = GeocodingJobPayload::materialise_static(
        fx.orch.db(),
        filters,
        limit,
        true,
        None,
    )
    .await
    .unwrap();
    let total = payload.household_ids.len() as i64;
    fx.orch
        .create(NewJob {
            job_type: JobType::Geocoding,
            created_by: "tester".into(),
            payload: serde_json::to_value(&payload).unwrap(),
            total_items: Some(total),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn geocodes_one_household_static_single_provider() {
    let provider = Arc::new(MockProvider::new("census", Script::Ok(37.97, -122.03)));
    let fx = fixture(Arc::clone(&provider)).await;
    let hh = fx
        .orch
        .db()
        .insert_household("612 Walnut Ave", "Concord", "CA", "94520")
        .await
        .unwrap();

    let filters = HouseholdFilter {
        city: Some("Concord".into()),
        ..Default::default()
    };
    let job = create_static_job(&fx, filters, 1).await;
    fx.orch.start(job.id).await.unwrap();

    let abort = AtomicBool::new(false);
    let job = fx.orch.get(job.id).await.unwrap();
    let outcome = run_geocoding_job(&fx.orch, &fx.registry, &fast_settings(), &job, &abort)
        .await
        .unwrap();

    let HandlerOutcome::Completed(stats) = outcome else {
        panic!("expected completion");
    };
    let stats = stats.unwrap();
    assert_eq!(
        stats,
        json!({"processedCount": 1, "successCount": 1, "failureCount": 0})
    );

    fx.orch.complete(job.id, Some(stats)).await.unwrap();
    assert_eq!(fx.orch.status(job.id).await.unwrap(), JobStatus::Completed);

    let row = fx.orch.db().get_household(hh).await.unwrap().unwrap();
    assert!(row.geocoded);
    assert_eq!(row.latitude, Some(37.97));
    assert_eq!(row.longitude, Some(-122.03));
    assert_eq!(row.geocoding_provider.as_deref(), Some("census"));
}

#[tokio::test]
async fn pause_checkpoints_and_resume_finishes_without_duplicates() {
    let provider = Arc::new(MockProvider::new("census", Script::Ok(38.0, -122.0)));
    let fx = fixture(Arc::clone(&provider)).await;
    for n in 0..250 {
        fx.orch
            .db()
            .insert_household(&format!("{n} Elm St"), "Concord", "CA", "94520")
            .await
            .unwrap();
    }

    let job = create_static_job(&fx, HouseholdFilter::default(), 1000).await;
    assert_eq!(job.total_items, 250);
    fx.orch.start(job.id).await.unwrap();
    let abort = fx.orch.control().register(job.id);

    // Long inter-batch delay gives the test a wide window to pause inside.
    let mut settings = fast_settings();
    settings.batch_delay = Duration::from_millis(700);

    let task = {
        let orch = Arc::clone(&fx.orch);
        let registry = Arc::clone(&fx.registry);
        let job = fx.orch.get(job.id).await.unwrap();
        let abort = Arc::clone(&abort);
        tokio::spawn(async move {
            run_geocoding_job(&orch, &registry, &settings, &job, &abort).await
        })
    };

    // Wait for the first batch's checkpoint, then pause during the delay.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let current = fx.orch.get(job.id).await.unwrap();
        if current.processed_items >= 100 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "first batch never landed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    fx.orch.pause(job.id, None).await.unwrap();

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, HandlerOutcome::Yielded);

    let paused = fx.orch.get(job.id).await.unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert_eq!(paused.payload["checkpointIndex"], 100);
    assert_eq!(paused.processed_items, 100);
    assert_eq!(fx.orch.db().count_geocoded().await.unwrap(), 100);

    // Resume: restart from the checkpoint and run to the end.
    fx.orch.resume(job.id).await.unwrap();
    fx.orch.start(job.id).await.unwrap();
    let abort = fx.orch.control().register(job.id);
    let job = fx.orch.get(job.id).await.unwrap();
    let outcome = run_geocoding_job(&fx.orch, &fx.registry, &fast_settings(), &job, &abort)
        .await
        .unwrap();
    let HandlerOutcome::Completed(stats) = outcome else {
        panic!("expected completion after resume");
    };
    assert_eq!(
        stats.unwrap(),
        json!({"processedCount": 250, "successCount": 250, "failureCount": 0})
    );

    assert_eq!(fx.orch.db().count_geocoded().await.unwrap(), 250);
    // No household was geocoded twice.
    assert_eq!(provider.max_calls_per_address(), 1);
    assert_eq!(provider.total_calls(), 250);
}

#[tokio::test]
async fn cancel_during_processing_stops_at_the_batch_boundary() {
    let provider = Arc::new(MockProvider::new("census", Script::Ok(38.0, -122.0)));
    let fx = fixture(Arc::clone(&provider)).await;
    for n in 0..250 {
        fx.orch
            .db()
            .insert_household(&format!("{n} Cedar Way"), "Concord", "CA", "94520")
            .await
            .unwrap();
    }

    let job = create_static_job(&fx, HouseholdFilter::default(), 1000).await;
    fx.orch.start(job.id).await.unwrap();
    let abort = fx.orch.control().register(job.id);

    let mut settings = fast_settings();
    settings.batch_delay = Duration::from_millis(700);

    let task = {
        let orch = Arc::clone(&fx.orch);
        let registry = Arc::clone(&fx.registry);
        let job = fx.orch.get(job.id).await.unwrap();
        let abort = Arc::clone(&abort);
        tokio::spawn(async move {
            run_geocoding_job(&orch, &registry, &settings, &job, &abort).await
        })
    };

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        if fx.orch.get(job.id).await.unwrap().processed_items >= 100 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "first batch never landed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let status = fx.orch.cancel(job.id, Some("operator abort")).await.unwrap();
    assert_eq!(status, JobStatus::Cancelled);

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, HandlerOutcome::Yielded);

    // Terminal immediately, and no further progress was recorded.
    let cancelled = fx.orch.get(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.processed_items, 100);
    assert_eq!(fx.orch.db().count_geocoded().await.unwrap(), 100);
    assert_eq!(provider.total_calls(), 100);
}

#[tokio::test]
async fn no_available_provider_fails_before_first_batch() {
    let provider = Arc::new(MockProvider::unavailable("census"));
    let fx = fixture(Arc::clone(&provider)).await;
    fx.orch
        .db()
        .insert_household("1 Main St", "Concord", "CA", "94520")
        .await
        .unwrap();

    let job = create_static_job(&fx, HouseholdFilter::default(), 10).await;
    fx.orch.start(job.id).await.unwrap();

    let abort = AtomicBool::new(false);
    let job = fx.orch.get(job.id).await.unwrap();
    let err = run_geocoding_job(&fx.orch, &fx.registry, &fast_settings(), &job, &abort)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no geocoding provider available"));
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn empty_address_is_a_unit_failure() {
    let provider = Arc::new(MockProvider::new("census", Script::Ok(38.0, -122.0)));
    let fx = fixture(Arc::clone(&provider)).await;
    let empty = fx.orch.db().insert_household("", "", "", "").await.unwrap();
    fx.orch
        .db()
        .insert_household("2 Oak St", "Concord", "CA", "94520")
        .await
        .unwrap();

    let job = create_static_job(&fx, HouseholdFilter::default(), 10).await;
    fx.orch.start(job.id).await.unwrap();

    let abort = AtomicBool::new(false);
    let job = fx.orch.get(job.id).await.unwrap();
    let outcome = run_geocoding_job(&fx.orch, &fx.registry, &fast_settings(), &job, &abort)
        .await
        .unwrap();
    let HandlerOutcome::Completed(stats) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(
        stats.unwrap(),
        json!({"processedCount": 2, "successCount": 1, "failureCount": 1})
    );

    let record = fx.orch.get(job.id).await.unwrap();
    assert_eq!(record.payload["failedHouseholdIds"], json!([empty]));
    assert!(record
        .error_log
        .iter()
        .any(|e| e.message.contains("empty address")));
}

#[tokio::test]
async fn provider_errors_count_as_failures_not_job_failure() {
    let provider = Arc::new(MockProvider::new("census", Script::Fail(500)));
    let fx = fixture(Arc::clone(&provider)).await;
    fx.orch
        .db()
        .insert_household("3 Pine St", "Concord", "CA", "94520")
        .await
        .unwrap();

    let job = create_static_job(&fx, HouseholdFilter::default(), 10).await;
    fx.orch.start(job.id).await.unwrap();

    let abort = AtomicBool::new(false);
    let job = fx.orch.get(job.id).await.unwrap();
    let outcome = run_geocoding_job(&fx.orch, &fx.registry, &fast_settings(), &job, &abort)
        .await
        .unwrap();
    let HandlerOutcome::Completed(stats) = outcome else {
        panic!("transient unit errors must not abort the job");
    };
    assert_eq!(
        stats.unwrap(),
        json!({"processedCount": 1, "successCount": 0, "failureCount": 1})
    );
    // Retried once under the fast policy (5xx is retryable).
    assert_eq!(provider.total_calls(), 2);
}

#[tokio::test]
async fn dynamic_mode_queries_at_start_and_completes() {
    let provider = Arc::new(MockProvider::new("census", Script::Ok(38.0, -122.0)));
    let fx = fixture(Arc::clone(&provider)).await;
    for n in 0..5 {
        fx.orch
            .db()
            .insert_household(&format!("{n} Birch Ct"), "Martinez", "CA", "94553")
            .await
            .unwrap();
    }

    let payload = GeocodingJobPayload::dynamic(HouseholdFilter::default(), 100, true, None);
    let job = fx
        .orch
        .create(NewJob {
            job_type: JobType::Geocoding,
            created_by: "tester".into(),
            payload: serde_json::to_value(&payload).unwrap(),
            total_items: None,
        })
        .await
        .unwrap();
    assert!(job.is_dynamic);
    assert_eq!(job.progress_percent(), 0);
    fx.orch.start(job.id).await.unwrap();

    let abort = AtomicBool::new(false);
    let job = fx.orch.get(job.id).await.unwrap();
    let outcome = run_geocoding_job(&fx.orch, &fx.registry, &fast_settings(), &job, &abort)
        .await
        .unwrap();
    let HandlerOutcome::Completed(stats) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(
        stats.unwrap(),
        json!({"processedCount": 5, "successCount": 5, "failureCount": 0})
    );
    assert_eq!(fx.orch.db().count_geocoded().await.unwrap(), 5);
}

#[tokio::test]
async fn registry_candidates_follow_pin_primary_priority_order() {
    let db = Db::open_memory().await.unwrap();
    for (id, primary, priority) in [
        ("census", false, 20),
        ("nominatim", true, 10),
    ] {
        db.insert_provider(&NewProvider {
            provider_id: id.into(),
            provider_name: id.into(),
            is_enabled: true,
            is_primary: primary,
            priority,
            config: json!({}),
        })
        .await
        .unwrap();
    }
    let rows = db.list_providers().await.unwrap();
    let registry = ProviderRegistry::new().unwrap();

    // Primary leads when nothing is pinned.
    let order: Vec<String> = registry
        .candidates(&rows, None)
        .iter()
        .map(|p| p.provider_id().to_string())
        .collect();
    assert_eq!(order, vec!["nominatim", "census"]);

    // Pinned provider jumps the queue.
    let order: Vec<String> = registry
        .candidates(&rows, Some("census"))
        .iter()
        .map(|p| p.provider_id().to_string())
        .collect();
    assert_eq!(order, vec!["census", "nominatim"]);
}

#[tokio::test]
async fn selection_falls_back_to_available_provider() {
    let db = Db::open_memory().await.unwrap();
    for (id, primary) in [("census", true), ("nominatim", false)] {
        db.insert_provider(&NewProvider {
            provider_id: id.into(),
            provider_name: id.into(),
            is_enabled: true,
            is_primary: primary,
            priority: 50,
            config: json!({}),
        })
        .await
        .unwrap();
    }
    let rows = db.list_providers().await.unwrap();

    let mut registry = ProviderRegistry::new().unwrap();
    registry.register(Arc::new(MockProvider::unavailable("census")));
    registry.register(Arc::new(MockProvider::new(
        "nominatim",
        Script::Ok(1.0, 2.0),
    )));

    let selected = registry.select_available(&rows, None).await.unwrap();
    assert_eq!(selected.provider_id(), "nominatim");
}
