//! End-to-end tests for the service layer: both callers sharing one cache.

use std::sync::Arc;
use std::time::Duration;

use molopt_abstraction::{Geometry, OptimizationParameters};
use molopt_core::config::GaugeBackend;
use molopt_core::{
    AppState, Backend, CoreError, JobRequest, JobState, ReadinessStatus, ServiceConfig, parse_xyz,
};
use molopt_models::{MockLoader, ModelId, ModelLoader};

fn config(max_loaded: usize) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.gauge.backend = GaugeBackend::None;
    config.cache.max_loaded = max_loaded;
    config.jobs.time_limit_secs = 30;
    config
}

fn backend(loader: &Arc<MockLoader>) -> Backend {
    Backend { loader: Arc::clone(loader) as Arc<dyn ModelLoader>, ..Backend::reference() }
}

fn parameters() -> OptimizationParameters {
    OptimizationParameters { max_steps: 100, fmax: 1e-3, ..OptimizationParameters::default() }
}

#[tokio::test]
async fn test_sync_and_job_callers_share_resident_models() {
    let loader = Arc::new(MockLoader::new());
    let state = AppState::init(config(2), backend(&loader)).await.unwrap();

    let report = state.optimizer().optimize_identifier("CCO", None, &parameters()).await.unwrap();
    assert_eq!(report.model_used, ModelId::Ani2x);

    let id = state.jobs().submit(JobRequest::Single {
        identifier: "CCN".to_string(),
        model: None,
        params: parameters(),
    });
    let status = loop {
        let status = state.jobs().status(id).unwrap();
        if status.state.is_terminal() {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(loader.loads_of(ModelId::Ani2x), 1);
    let stats = state.cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_capacity_holds_across_model_switches() {
    let loader = Arc::new(MockLoader::new());
    let state = AppState::init(config(1), backend(&loader)).await.unwrap();
    let water = parse_xyz("3\nwater\nO 0 0 0\nH 0.96 0 0\nH -0.24 0.93 0\n").unwrap();

    for model in [ModelId::Ani1x, ModelId::Ani1ccx, ModelId::Ani2x, ModelId::Ani1x] {
        let report = state.optimizer().calculate_energy(&water, Some(model)).await.unwrap();
        assert_eq!(report.model_used, model);
        assert_eq!(state.cache().resident_models(), vec![model]);
    }

    assert_eq!(loader.load_count(), 4);
    assert_eq!(loader.unload_count(), 3);
    assert_eq!(state.cache().stats().capacity_evictions, 3);
}

#[tokio::test]
async fn test_status_snapshot_reflects_usage() {
    let loader = Arc::new(MockLoader::new());
    let state = AppState::init(config(2), backend(&loader)).await.unwrap();
    let chloromethane = Geometry::new(vec![6, 17], vec![[0.0; 3], [1.78, 0.0, 0.0]]).unwrap();

    state.optimizer().calculate_energy(&chloromethane, None).await.unwrap();
    let snapshot = state.cache().list_status().await;

    assert_eq!(snapshot.models.len(), 3);
    let status = snapshot.model(ModelId::Ani2x).unwrap();
    assert!(status.resident);
    assert!(status.freshness.is_some());
    assert!(!snapshot.model(ModelId::Ani1x).unwrap().resident);
    assert_eq!(snapshot.device.models_loaded, 1);
    assert_eq!(snapshot.device.max_models, 2);
}

#[tokio::test]
async fn test_user_errors_leave_cache_untouched() {
    let loader = Arc::new(MockLoader::new());
    let state = AppState::init(config(2), backend(&loader)).await.unwrap();
    let iodide = Geometry::new(vec![53], vec![[0.0; 3]]).unwrap();

    let err = state.optimizer().calculate_energy(&iodide, None).await.unwrap_err();
    assert!(matches!(err, CoreError::UnsupportedElements { .. }));

    let err = state.optimizer().optimize_identifier("C)", None, &parameters()).await.unwrap_err();
    assert!(err.is_user_error());

    assert_eq!(loader.load_count(), 0);
    assert_eq!(state.cache().stats().misses, 0);
}

#[tokio::test]
async fn test_readiness_and_shutdown() {
    let loader = Arc::new(MockLoader::new());
    let mut config = config(2);
    config.models.preload = vec![ModelId::Ani1ccx];
    let state = AppState::init(config, backend(&loader)).await.unwrap();

    let readiness = state.readiness().await;
    assert_eq!(readiness.status, ReadinessStatus::Ready);

    state.shutdown().await;
    assert!(state.cache().resident_models().is_empty());
    assert_eq!(loader.unload_count(), 1);
    assert_eq!(state.jobs().outstanding(), 0);
}
