//! End-to-end session flows: simulated engine, event router, and driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::authenticity::AuthenticityVerdict;
use crate::engine::simulated::EngineRequest;
use crate::engine::{CaptureMode, SimulatedEngine, SimulationScript};
use crate::error::VerifierError;
use crate::events::{ChipProgressEvent, Outcome};
use crate::policy::ChipFailureAction;
use crate::results::{AuthenticityCheck, CheckStatus, ResultBundle, TextFieldType};
use crate::router::EventRouter;
use crate::runtime::VerifierRuntime;

use super::*;

const WAIT: Duration = Duration::from_secs(5);
const LICENSE: &str = "bGljZW5zZQ==";

struct Harness {
    engine: SimulatedEngine,
    handle: SessionHandle,
    router: EventRouter,
}

fn start(script: SimulationScript, config: SessionConfig) -> Harness {
    start_with_runtime(script, config, None)
}

fn start_with_runtime(
    script: SimulationScript,
    config: SessionConfig,
    runtime: Option<Arc<dyn VerifierRuntime>>,
) -> Harness {
    let engine = SimulatedEngine::new(script);
    let machine = SessionMachine::new(Arc::new(engine.clone()), config);
    let handle = SessionDriver::spawn(machine, runtime);
    let router = EventRouter::mount(Arc::new(engine.clone()), Arc::new(handle.clone()));
    Harness {
        engine,
        handle,
        router,
    }
}

async fn wait_for_status(handle: &SessionHandle, status: SessionStatus) -> SessionSnapshot {
    timeout(WAIT, handle.wait_for(|s| s.status == status))
        .await
        .expect("timed out waiting for status")
        .unwrap()
}

fn chip_script() -> SimulationScript {
    SimulationScript::default()
        .with_chip_available(true)
        .with_step_delay(Duration::from_millis(5))
        .autoplay()
}

// =========================================================================
// Optical-only flows
// =========================================================================

#[tokio::test]
async fn test_unavailable_reader_goes_straight_to_presenting() {
    let h = start(
        SimulationScript::default()
            .with_step_delay(Duration::from_millis(5))
            .autoplay(),
        SessionConfig {
            chip_opt_in: true,
            ..Default::default()
        },
    );
    h.handle.initialize(LICENSE).await.unwrap();
    assert!(!h.handle.snapshot().chip_option.opted_in);

    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();
    let snapshot = wait_for_status(&h.handle, SessionStatus::Presenting).await;

    assert!(!snapshot.chip_required);
    assert!(!snapshot.chip_attempted);
    assert_eq!(snapshot.chip_progress, -1.0);
    assert_eq!(snapshot.headline, "SPECIMEN JANE");
    assert!(snapshot.portrait_image.is_found());
    assert!(!h
        .engine
        .requests()
        .iter()
        .any(|r| matches!(r, EngineRequest::ChipRead(_))));
}

#[tokio::test]
async fn test_recognize_flow_uses_supplied_images() {
    let h = start(
        SimulationScript::default()
            .with_step_delay(Duration::from_millis(5))
            .autoplay(),
        SessionConfig::default(),
    );
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.select_scenario("Ocr").await.unwrap();

    h.handle
        .start_capture(CaptureMode::Recognize, vec!["aGVsbG8=".to_string()])
        .await
        .unwrap();
    wait_for_status(&h.handle, SessionStatus::Presenting).await;

    let capture = h.engine.requests().into_iter().find_map(|r| match r {
        EngineRequest::Capture(c) => Some(c),
        _ => None,
    });
    let capture = capture.unwrap();
    assert_eq!(capture.scenario, "Ocr");
    assert_eq!(capture.images, vec!["aGVsbG8=".to_string()]);
}

#[tokio::test]
async fn test_cancelled_capture_fails_session() {
    let h = start(
        SimulationScript::default()
            .with_capture(Outcome::Cancelled, None)
            .with_step_delay(Duration::from_millis(5))
            .autoplay(),
        SessionConfig::default(),
    );
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();

    let snapshot = wait_for_status(&h.handle, SessionStatus::Failed).await;
    assert_eq!(snapshot.error_info.as_ref().map(|e| e.stage), Some(ErrorStage::Capture));
    assert!(!snapshot.is_loading);
}

#[tokio::test]
async fn test_start_capture_rejected_while_capturing() {
    // Manual engine: the capture never completes on its own
    let h = start(SimulationScript::default(), SessionConfig::default());
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();
    let before = h.handle.snapshot();

    let err = h
        .handle
        .start_capture(CaptureMode::Scan, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifierError::Rejected(_)));

    let after = h.handle.snapshot();
    assert_eq!(after.revision, before.revision);
    assert_eq!(after.status, SessionStatus::Capturing);
}

#[tokio::test]
async fn test_events_while_idle_are_ignored() {
    let h = start(SimulationScript::default(), SessionConfig::default());
    h.handle.initialize(LICENSE).await.unwrap();
    let before = h.handle.snapshot();

    h.engine
        .emit_completion(Outcome::Success, Some(ResultBundle::new().with_chip_data(true)));
    h.engine.emit_chip_progress(50.0, Some("DG1"));
    // Round-trip a command so both events have been consumed
    h.handle.select_scenario("FullProcess").await.unwrap();

    let after = h.handle.snapshot();
    assert_eq!(after.status, SessionStatus::Idle);
    assert_eq!(after.revision, before.revision);
}

#[tokio::test]
async fn test_malformed_completion_ends_capture() {
    let h = start(SimulationScript::default(), SessionConfig::default());
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();

    h.engine
        .emit_raw(crate::engine::EventChannel::Completion, "{\"outcome\":");
    let snapshot = wait_for_status(&h.handle, SessionStatus::Failed).await;
    assert!(snapshot
        .error_info
        .as_ref()
        .is_some_and(|e| e.detail.contains("Malformed")));
}

// =========================================================================
// Chip flows
// =========================================================================

#[tokio::test]
async fn test_chip_flow_reaches_presenting_with_final_verdict() {
    let final_bundle = ResultBundle::new()
        .with_text(TextFieldType::SurnameAndGivenNames, "DOE JOHN")
        .with_authenticity(vec![
            AuthenticityCheck::new("mrz", CheckStatus::Pass),
            AuthenticityCheck::new("chip_signature", CheckStatus::Pass),
        ]);
    let script = chip_script().with_chip(
        vec![
            ChipProgressEvent::new(10.0, Some("DG1")),
            ChipProgressEvent::new(55.0, Some("DG2")),
            ChipProgressEvent::new(100.0, Some("DG14")),
        ],
        Outcome::Success,
        Some(final_bundle),
    );
    let h = start(script, SessionConfig::default());
    let mut updates = h.handle.subscribe();

    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.set_chip_opt_in(true).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();

    let mut progress = Vec::new();
    let snapshot = timeout(WAIT, async {
        loop {
            updates.changed().await.unwrap();
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.status == SessionStatus::ChipReading && snapshot.chip_progress >= 0.0 {
                progress.push(snapshot.chip_progress);
            }
            if snapshot.status == SessionStatus::Presenting {
                break snapshot;
            }
        }
    })
    .await
    .unwrap();

    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(snapshot.chip_progress, 1.0);
    assert!(snapshot.chip_attempted);
    assert_eq!(snapshot.headline, "DOE JOHN");
    let authenticity = snapshot.authenticity.as_ref().unwrap();
    assert_eq!(authenticity.verdict, AuthenticityVerdict::Authentic);
    assert_eq!(authenticity.message, "Document is authentic");
}

#[tokio::test]
async fn test_cancel_chip_read_ignores_late_completion() {
    // Manual engine so the chip read stays in flight until we act
    let h = start(
        SimulationScript::default().with_chip_available(true),
        SessionConfig::default(),
    );
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.set_chip_opt_in(true).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();

    let optical = ResultBundle::new()
        .with_text(TextFieldType::SurnameAndGivenNames, "OPTICAL ONLY")
        .with_chip_data(true);
    h.engine.emit_completion(Outcome::Success, Some(optical));
    wait_for_status(&h.handle, SessionStatus::ChipReading).await;

    h.engine.emit_chip_progress(30.0, Some("DG1"));
    h.handle.cancel_chip_read().await.unwrap();
    let presented = h.handle.snapshot();
    assert_eq!(presented.status, SessionStatus::Presenting);
    assert_eq!(presented.headline, "OPTICAL ONLY");
    assert_eq!(presented.chip_progress, -1.0);

    h.engine.emit_completion(Outcome::Cancelled, None);
    h.engine
        .emit_completion(Outcome::Success, Some(ResultBundle::new().with_text(
            TextFieldType::SurnameAndGivenNames,
            "LATE CHIP",
        )));
    h.handle.select_scenario("Mrz").await.unwrap();

    let after = h.handle.snapshot();
    assert_eq!(after.status, SessionStatus::Presenting);
    assert_eq!(after.headline, "OPTICAL ONLY");
    assert!(h.engine.requests().contains(&EngineRequest::StopChipRead));
}

#[tokio::test]
async fn test_chip_error_falls_back_to_optical_results() {
    let script = chip_script().with_chip(
        vec![ChipProgressEvent::new(20.0, Some("DG1"))],
        Outcome::Error,
        None,
    );
    let h = start(script, SessionConfig::default());
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.set_chip_opt_in(true).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();

    let snapshot = wait_for_status(&h.handle, SessionStatus::Presenting).await;
    assert_eq!(snapshot.headline, "SPECIMEN JANE");
    assert_eq!(
        snapshot.error_info.as_ref().map(|e| e.stage),
        Some(ErrorStage::ChipRead)
    );
    assert_eq!(
        snapshot.authenticity.as_ref().map(|a| a.verdict),
        Some(AuthenticityVerdict::Authentic)
    );

    // Exactly one chip read: errors never auto-retry
    let chip_reads = h
        .engine
        .requests()
        .into_iter()
        .filter(|r| matches!(r, EngineRequest::ChipRead(_)))
        .count();
    assert_eq!(chip_reads, 1);
}

#[tokio::test]
async fn test_chip_error_retry_prompt_then_cancel() {
    let script = chip_script().with_chip(Vec::new(), Outcome::Error, None);
    let config = SessionConfig {
        chip_failure: ChipFailureAction::RetryPrompt,
        ..Default::default()
    };
    let h = start(script, config);
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.set_chip_opt_in(true).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();

    let snapshot = timeout(
        WAIT,
        h.handle
            .wait_for(|s| s.chip_phase == Some(ChipPhase::RetryPrompt)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(snapshot.chip_status.header, "Failed!");
    assert_eq!(snapshot.chip_status.tone, StatusTone::Failure);

    h.handle.cancel_chip_read().await.unwrap();
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Presenting);
    assert_eq!(snapshot.headline, "SPECIMEN JANE");
}

// =========================================================================
// Initialization, publication, and mounting
// =========================================================================

#[tokio::test]
async fn test_initialization_failure_then_explicit_retry_rejected_by_engine() {
    let h = start(
        SimulationScript::default().with_initialization_failure(),
        SessionConfig::default(),
    );
    let err = h.handle.initialize(LICENSE).await.unwrap_err();
    assert!(matches!(err, VerifierError::InitializationFailure(_)));

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.headline, "Initialization Failed");
    assert!(!snapshot.ready);

    // Re-initialization is explicit and re-runs the engine call
    assert!(h.handle.initialize(LICENSE).await.is_err());
    let inits = h
        .engine
        .requests()
        .into_iter()
        .filter(|r| *r == EngineRequest::Initialize)
        .count();
    assert_eq!(inits, 2);
}

#[cfg(feature = "cli")]
#[tokio::test]
async fn test_runtime_receives_session_updates() {
    use crate::runtime::{CliRuntime, RuntimeEvent};
    use tokio::sync::mpsc;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runtime: Arc<dyn VerifierRuntime> = Arc::new(CliRuntime::new(tx));
    let h = start_with_runtime(
        SimulationScript::default(),
        SessionConfig::default(),
        Some(runtime),
    );
    h.handle.initialize(LICENSE).await.unwrap();

    let mut headlines = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let RuntimeEvent::SessionUpdated(state) = event {
            headlines.push(state.headline.clone());
        }
    }
    assert_eq!(headlines, vec!["Initializing...", "Ready to Scan"]);
}

#[tokio::test]
async fn test_unmounted_router_stops_delivery() {
    let h = start(SimulationScript::default(), SessionConfig::default());
    h.handle.initialize(LICENSE).await.unwrap();
    h.handle.start_capture(CaptureMode::Scan, Vec::new()).await.unwrap();

    h.router.unmount();
    assert_eq!(
        h.engine
            .emit_completion(Outcome::Success, Some(ResultBundle::new())),
        0
    );
    h.handle.select_scenario("Mrz").await.unwrap();
    assert_eq!(h.handle.snapshot().status, SessionStatus::Capturing);
}

#[tokio::test]
async fn test_shutdown_closes_handle() {
    let h = start(SimulationScript::default(), SessionConfig::default());
    h.handle.shutdown();
    let err = timeout(WAIT, h.handle.initialize(LICENSE))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, VerifierError::DriverClosed));
}
