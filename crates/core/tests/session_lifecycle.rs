//! Conversion session lifecycle integration tests.
//!
//! These tests drive full sessions through both adapters with a mock engine:
//! - Selection, conversion and output retrieval
//! - Rejected inputs and missing host capabilities
//! - Handle ownership across reset
//! - Progress reporting as seen by a subscriber
//! - Worker interruption

use std::sync::Arc;
use std::time::{Duration, Instant};

use vidmp3_core::{
    create_adapter,
    engine::HostCapabilities,
    media::InputValidator,
    progress::{EngineProgress, EstimatorConfig},
    testing::{fixtures, MockEngine, MockProber},
    AdapterKind, AdapterPreference, ConversionSession, ConversionStatus, EngineAdapter, ErrorKind,
    ProgressEstimator, ResourceStore, SessionError, TranscodeAdapter,
};

const TEN_MB: usize = 10 * 1024 * 1024;

/// Test helper wiring a session to a mock engine.
struct TestHarness {
    session: Arc<ConversionSession<EngineAdapter>>,
    engine: Arc<MockEngine>,
    prober: MockProber,
    store: ResourceStore,
}

impl TestHarness {
    fn new(preference: AdapterPreference) -> Self {
        Self::with_capabilities(preference, HostCapabilities::full())
    }

    fn with_capabilities(preference: AdapterPreference, capabilities: HostCapabilities) -> Self {
        let store = ResourceStore::new();
        let engine = Arc::new(MockEngine::new());
        let prober = MockProber::new().with_duration(Some(12.0));

        let adapter = create_adapter(
            preference,
            fixtures::adapter_parts(engine.clone(), capabilities, store.clone()),
        );
        let validator =
            InputValidator::new(store.clone()).with_prober(Arc::new(prober.clone()));

        Self {
            session: Arc::new(ConversionSession::new(adapter, validator, store.clone())),
            engine,
            prober,
            store,
        }
    }
}

async fn converts_ten_megabyte_mp4(preference: AdapterPreference, expected: AdapterKind) {
    let h = TestHarness::new(preference);
    assert_eq!(h.session.adapter().kind(), expected);

    let status = h
        .session
        .select_input(vec![fixtures::mp4_candidate("holiday.mp4", TEN_MB)])
        .await
        .unwrap();
    assert_eq!(status, ConversionStatus::Idle);
    assert!(h.session.can_convert());

    let input = h.session.state().input.unwrap();
    assert_eq!(input.size_bytes, TEN_MB as u64);
    assert_eq!(input.duration_secs, Some(12.0));

    let status = h.session.start_conversion().await.unwrap();
    assert_eq!(status, ConversionStatus::Completed);
    assert!(h.session.can_download());

    let artifact = h.session.retrieve_output().unwrap();
    assert_eq!(artifact.file_name, "holiday.mp3");
    assert_eq!(artifact.bitrate_kbps, 128);
    assert_eq!(artifact.duration_secs, Some(12.0));
    assert!(artifact.size_bytes > 0);
    assert!(h.store.is_live(&artifact.handle));
    assert_eq!(h.engine.load_count().await, 1);

    let state = h.session.state();
    assert_eq!(state.progress.unwrap().percentage, 100.0);
    assert!(state.error.is_none());

    h.session.shutdown().await;
}

#[tokio::test]
async fn test_direct_adapter_converts_mp4() {
    converts_ten_megabyte_mp4(AdapterPreference::Direct, AdapterKind::Direct).await;
}

#[tokio::test]
async fn test_isolated_adapter_converts_mp4() {
    converts_ten_megabyte_mp4(AdapterPreference::Isolated, AdapterKind::Isolated).await;
}

#[tokio::test]
async fn test_auto_prefers_isolated_when_available() {
    converts_ten_megabyte_mp4(AdapterPreference::Auto, AdapterKind::Isolated).await;
}

#[tokio::test]
async fn test_unsupported_format_never_loads_engine() {
    for preference in [AdapterPreference::Direct, AdapterPreference::Isolated] {
        let h = TestHarness::new(preference);

        let status = h
            .session
            .select_input(vec![fixtures::video_candidate(
                "archive.zip",
                "application/zip",
                1024,
            )])
            .await
            .unwrap();

        assert_eq!(status, ConversionStatus::Error);
        let state = h.session.state();
        assert_eq!(state.error.unwrap().kind, ErrorKind::UnsupportedFormat);
        assert!(state.input.is_none());
        assert!(!h.session.can_convert());
        assert_eq!(
            h.session.start_conversion().await.unwrap_err(),
            SessionError::NoInput
        );
        assert_eq!(h.prober.probe_count().await, 0);
        assert_eq!(h.engine.load_count().await, 0);
    }
}

#[tokio::test]
async fn test_missing_shared_memory_is_unavailable() {
    let h = TestHarness::with_capabilities(
        AdapterPreference::Auto,
        HostCapabilities {
            isolated_execution: false,
            shared_memory: false,
        },
    );
    assert_eq!(h.session.adapter().kind(), AdapterKind::Direct);

    h.session
        .select_input(vec![fixtures::mp4_candidate("clip.mp4", 4096)])
        .await
        .unwrap();
    let status = h.session.start_conversion().await.unwrap();

    assert_eq!(status, ConversionStatus::Error);
    let failure = h.session.state().error.unwrap();
    assert_eq!(failure.kind, ErrorKind::EngineUnavailable);
    assert!(!failure.is_recoverable());
    assert_eq!(h.engine.load_count().await, 0);
}

#[tokio::test]
async fn test_reset_invalidates_output_handle() {
    let h = TestHarness::new(AdapterPreference::Direct);
    h.session
        .select_input(vec![fixtures::mp4_candidate("clip.mp4", 4096)])
        .await
        .unwrap();
    h.session.start_conversion().await.unwrap();
    let artifact = h.session.retrieve_output().unwrap();

    h.session.reset();

    assert_eq!(h.session.status(), ConversionStatus::Idle);
    assert!(!h.store.is_live(&artifact.handle));
    assert!(h.store.fetch(&artifact.handle).is_err());
    assert_eq!(h.store.live_count(), 0);
    assert!(matches!(
        h.session.retrieve_output(),
        Err(SessionError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_retrieve_output_is_idempotent() {
    let h = TestHarness::new(AdapterPreference::Isolated);
    h.session
        .select_input(vec![fixtures::mp4_candidate("clip.mp4", 4096)])
        .await
        .unwrap();
    h.session.start_conversion().await.unwrap();

    let first = h.session.retrieve_output().unwrap();
    let second = h.session.retrieve_output().unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.live_count(), 1);

    h.session.shutdown().await;
}

#[tokio::test]
async fn test_subscriber_sees_monotonic_processing_progress() {
    let h = TestHarness::new(AdapterPreference::Direct);
    h.engine
        .set_progress_script(
            (1..=10)
                .map(|i| EngineProgress {
                    fraction: f64::from(i) / 10.0,
                    processed_us: i64::from(i) * 1_200_000,
                })
                .collect(),
        )
        .await;
    h.session
        .select_input(vec![fixtures::mp4_candidate("clip.mp4", 4096)])
        .await
        .unwrap();

    let mut rx = h.session.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if let Some(progress) = &state.progress {
                seen.push((state.status, progress.percentage));
            }
            if matches!(
                state.status,
                ConversionStatus::Completed | ConversionStatus::Error
            ) {
                break;
            }
        }
        seen
    });

    let status = h.session.start_conversion().await.unwrap();
    assert_eq!(status, ConversionStatus::Completed);

    let seen = tokio::time::timeout(Duration::from_secs(5), observer)
        .await
        .unwrap()
        .unwrap();
    let processing: Vec<f64> = seen
        .iter()
        .filter(|(status, _)| *status == ConversionStatus::Processing)
        .map(|(_, percentage)| *percentage)
        .collect();
    assert!(processing.windows(2).all(|w| w[0] <= w[1]));
    assert!(processing.iter().all(|p| *p <= 95.0));
    assert_eq!(
        seen.last().copied(),
        Some((ConversionStatus::Completed, 100.0))
    );
}

#[test]
fn test_events_ten_ms_apart_yield_one_snapshot() {
    let start = Instant::now();
    let mut estimator =
        ProgressEstimator::starting_at(EstimatorConfig::default(), Some(12.0), start);

    let emitted: Vec<_> = [(95, 0.2), (105, 0.4)]
        .into_iter()
        .filter_map(|(ms, fraction)| {
            estimator.observe_at(
                EngineProgress {
                    fraction,
                    processed_us: 1_000_000,
                },
                start + Duration::from_millis(ms),
            )
        })
        .collect();

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].percentage, 50.0);
    assert_eq!(emitted[0].step, "Converting... 1s / 12s");
}

#[tokio::test]
async fn test_aborted_worker_surfaces_transport_error() {
    let h = TestHarness::new(AdapterPreference::Isolated);
    h.engine.set_exec_delay(Duration::from_secs(30)).await;
    h.session
        .select_input(vec![fixtures::mp4_candidate("clip.mp4", 4096)])
        .await
        .unwrap();

    let session = h.session.clone();
    let conversion = tokio::spawn(async move { session.start_conversion().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.session.status(), ConversionStatus::Processing);

    assert!(h.session.adapter().abort());
    let status = tokio::time::timeout(Duration::from_secs(5), conversion)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(status, ConversionStatus::Error);
    let state = h.session.state();
    assert_eq!(state.error.unwrap().kind, ErrorKind::TransportError);
    assert!(state.input.is_some());
    assert!(h.session.can_convert());

    // The worker is respawned on the next attempt.
    h.engine.set_exec_delay(Duration::ZERO).await;
    assert_eq!(
        h.session.start_conversion().await.unwrap(),
        ConversionStatus::Completed
    );
    h.session.shutdown().await;
}

#[tokio::test]
async fn test_reset_during_isolated_conversion_terminates_worker() {
    let h = TestHarness::new(AdapterPreference::Isolated);
    h.engine.set_exec_delay(Duration::from_secs(30)).await;
    h.session
        .select_input(vec![fixtures::mp4_candidate("clip.mp4", 4096)])
        .await
        .unwrap();

    let session = h.session.clone();
    let conversion = tokio::spawn(async move { session.start_conversion().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.session.status(), ConversionStatus::Processing);

    h.session.reset();
    let status = tokio::time::timeout(Duration::from_secs(5), conversion)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(status, ConversionStatus::Idle);
    assert_eq!(h.session.status(), ConversionStatus::Idle);
    assert!(h.session.state().error.is_none());
    assert!(h.engine.terminate_count().await >= 1);
    assert_eq!(h.store.live_count(), 0);
}
