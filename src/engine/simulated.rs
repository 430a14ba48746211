//! Scriptable in-process engine.
//!
//! `SimulatedEngine` implements [`DocumentEngine`] and [`EventSource`] without
//! any hardware. Every request is recorded. In manual mode nothing happens
//! until the caller emits events with [`SimulatedEngine::emit_completion`] /
//! [`SimulatedEngine::emit_chip_progress`]; in autoplay mode the scripted
//! outcomes are played back on the tokio runtime after each request, the way
//! a real engine reports back asynchronously.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::{
    Capability, CaptureMode, CaptureRequest, ChipReadOptions, DocumentEngine, EngineError,
    EventChannel, EventSource, RawListener, Scenario, SubscriptionId,
};
use crate::events::{ChipProgressEvent, CompletionPayload, Outcome};
use crate::results::{AuthenticityCheck, CheckStatus, ImageFieldType, ResultBundle, TextFieldType};

/// A scripted completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedCompletion {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultBundle>,
}

/// Scripted chip read: progress notifications followed by a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedChipRead {
    #[serde(default)]
    pub progress: Vec<ChipProgressEvent>,
    #[serde(flatten)]
    pub completion: ScriptedCompletion,
}

/// Behaviour of a [`SimulatedEngine`], loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationScript {
    pub chip_available: bool,
    pub scenarios: Vec<String>,
    pub fail_initialization: bool,
    pub fail_probe: bool,
    pub reject_capture: bool,
    pub capture: ScriptedCompletion,
    pub chip: ScriptedChipRead,
    /// Delay before each played-back event
    pub step_delay_ms: u64,
    pub autoplay: bool,
}

impl Default for SimulationScript {
    fn default() -> Self {
        Self {
            chip_available: false,
            scenarios: vec![
                "FullProcess".to_string(),
                "Mrz".to_string(),
                "Ocr".to_string(),
                "FullAuth".to_string(),
            ],
            fail_initialization: false,
            fail_probe: false,
            reject_capture: false,
            capture: ScriptedCompletion {
                outcome: Outcome::Success,
                results: Some(demo_bundle(true)),
            },
            chip: ScriptedChipRead {
                progress: vec![
                    ChipProgressEvent::new(25.0, Some("DG1")),
                    ChipProgressEvent::new(50.0, Some("DG1")),
                    ChipProgressEvent::new(75.0, Some("DG2")),
                    ChipProgressEvent::new(100.0, Some("DG14")),
                ],
                completion: ScriptedCompletion {
                    outcome: Outcome::Success,
                    results: Some(demo_bundle(true).with_authenticity(vec![
                        AuthenticityCheck::new("hologram", CheckStatus::Pass),
                        AuthenticityCheck::new("chip_signature", CheckStatus::Pass),
                    ])),
                },
            },
            step_delay_ms: 150,
            autoplay: false,
        }
    }
}

impl SimulationScript {
    pub fn with_chip_available(mut self, available: bool) -> Self {
        self.chip_available = available;
        self
    }

    pub fn with_probe_failure(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub fn with_initialization_failure(mut self) -> Self {
        self.fail_initialization = true;
        self
    }

    pub fn rejecting_capture(mut self) -> Self {
        self.reject_capture = true;
        self
    }

    pub fn with_capture(mut self, outcome: Outcome, results: Option<ResultBundle>) -> Self {
        self.capture = ScriptedCompletion { outcome, results };
        self
    }

    pub fn with_chip(
        mut self,
        progress: Vec<ChipProgressEvent>,
        outcome: Outcome,
        results: Option<ResultBundle>,
    ) -> Self {
        self.chip = ScriptedChipRead {
            progress,
            completion: ScriptedCompletion { outcome, results },
        };
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn autoplay(mut self) -> Self {
        self.autoplay = true;
        self
    }

    /// Parse a script from JSON text.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Sample bundle used by the default script.
pub fn demo_bundle(chip_data_expected: bool) -> ResultBundle {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    // 1x1 transparent PNG
    const PIXEL: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
        0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
    ];
    let pixel = STANDARD.encode(PIXEL);

    ResultBundle::new()
        .with_text(TextFieldType::SurnameAndGivenNames, "SPECIMEN JANE")
        .with_text(TextFieldType::DocumentNumber, "X1234567")
        .with_image(ImageFieldType::Portrait, pixel.clone())
        .with_image(ImageFieldType::DocumentImage, pixel)
        .with_authenticity(vec![AuthenticityCheck::new("hologram", CheckStatus::Pass)])
        .with_chip_data(chip_data_expected)
}

/// A request the engine received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineRequest {
    Initialize,
    Capture(CaptureRequest),
    ChipRead(ChipReadOptions),
    StopChipRead,
    ChipSessionStatus(String),
}

struct Inner {
    script: SimulationScript,
    listeners: RwLock<HashMap<u64, (EventChannel, RawListener)>>,
    next_id: AtomicU64,
    requests: Mutex<Vec<EngineRequest>>,
    probe_count: AtomicUsize,
    initialized: AtomicBool,
    chip_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn emit_raw(&self, channel: EventChannel, msg: &str) -> usize {
        // Clone listeners out so a listener may (un)subscribe while we deliver
        let targets: Vec<RawListener> = self
            .listeners
            .read()
            .values()
            .filter(|(c, _)| *c == channel)
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in &targets {
            listener(msg);
        }
        targets.len()
    }

    fn step_delay(&self) -> Duration {
        Duration::from_millis(self.script.step_delay_ms)
    }
}

#[derive(Clone)]
pub struct SimulatedEngine {
    inner: Arc<Inner>,
}

impl SimulatedEngine {
    pub fn new(script: SimulationScript) -> Self {
        Self {
            inner: Arc::new(Inner {
                script,
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                requests: Mutex::new(Vec::new()),
                probe_count: AtomicUsize::new(0),
                initialized: AtomicBool::new(false),
                chip_task: Mutex::new(None),
            }),
        }
    }

    pub fn script(&self) -> &SimulationScript {
        &self.inner.script
    }

    /// Deliver a raw payload to every listener of `channel`. Returns the
    /// number of listeners reached.
    pub fn emit_raw(&self, channel: EventChannel, msg: &str) -> usize {
        self.inner.emit_raw(channel, msg)
    }

    pub fn emit_completion(&self, outcome: Outcome, results: Option<ResultBundle>) -> usize {
        let payload = CompletionPayload::new(outcome, results).to_json();
        self.emit_raw(EventChannel::Completion, &payload)
    }

    pub fn emit_chip_progress(&self, percent_done: f64, data_group: Option<&str>) -> usize {
        let payload =
            serde_json::to_string(&ChipProgressEvent::new(percent_done, data_group)).unwrap_or_default();
        self.emit_raw(EventChannel::ChipProgress, &payload)
    }

    pub fn requests(&self) -> Vec<EngineRequest> {
        self.inner.requests.lock().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.inner.probe_count.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self, channel: EventChannel) -> usize {
        self.inner
            .listeners
            .read()
            .values()
            .filter(|(c, _)| *c == channel)
            .count()
    }

    fn record(&self, request: EngineRequest) {
        self.inner.requests.lock().push(request);
    }

    fn ensure_initialized(&self) -> Result<(), EngineError> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    /// Spawn scripted playback on the current runtime when autoplay is on.
    fn spawn_playback<F>(&self, playback: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.inner.script.autoplay {
            return None;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(playback)),
            Err(_) => {
                tracing::warn!("No tokio runtime available, scripted playback skipped");
                None
            }
        }
    }
}

#[async_trait]
impl DocumentEngine for SimulatedEngine {
    async fn initialize(&self, license: &str) -> Result<(), EngineError> {
        self.record(EngineRequest::Initialize);
        if self.inner.script.fail_initialization {
            return Err(EngineError::License(format!(
                "license of {} bytes was not accepted",
                license.len()
            )));
        }
        self.inner.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn probe_capability(&self) -> Result<Capability, EngineError> {
        self.inner.probe_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.script.fail_probe {
            return Err(EngineError::Unavailable("capability probe failed".to_string()));
        }
        Ok(Capability {
            chip_available: self.inner.script.chip_available,
        })
    }

    async fn list_scenarios(&self) -> Result<Vec<Scenario>, EngineError> {
        self.ensure_initialized()?;
        Ok(self
            .inner
            .script
            .scenarios
            .iter()
            .map(Scenario::new)
            .collect())
    }

    fn request_capture(&self, request: CaptureRequest) -> Result<(), EngineError> {
        self.record(EngineRequest::Capture(request.clone()));
        self.ensure_initialized()?;
        if self.inner.script.reject_capture {
            return Err(EngineError::Rejected("capture refused by script".to_string()));
        }
        if request.mode == CaptureMode::Recognize && request.images.is_empty() {
            return Err(EngineError::Rejected("no images to recognize".to_string()));
        }

        let inner = Arc::clone(&self.inner);
        self.spawn_playback(async move {
            tokio::time::sleep(inner.step_delay()).await;
            let scripted = &inner.script.capture;
            let payload = CompletionPayload::new(scripted.outcome, scripted.results.clone());
            inner.emit_raw(EventChannel::Completion, &payload.to_json());
        });
        Ok(())
    }

    fn request_chip_read(&self, options: ChipReadOptions) -> Result<(), EngineError> {
        self.record(EngineRequest::ChipRead(options));
        self.ensure_initialized()?;

        let inner = Arc::clone(&self.inner);
        let task = self.spawn_playback(async move {
            for step in &inner.script.chip.progress {
                tokio::time::sleep(inner.step_delay()).await;
                let payload = serde_json::to_string(step).unwrap_or_default();
                inner.emit_raw(EventChannel::ChipProgress, &payload);
            }
            tokio::time::sleep(inner.step_delay()).await;
            let scripted = &inner.script.chip.completion;
            let payload = CompletionPayload::new(scripted.outcome, scripted.results.clone());
            inner.emit_raw(EventChannel::Completion, &payload.to_json());
        });

        if let Some(previous) = std::mem::replace(&mut *self.inner.chip_task.lock(), task) {
            previous.abort();
        }
        Ok(())
    }

    fn stop_chip_read(&self) -> Result<(), EngineError> {
        self.record(EngineRequest::StopChipRead);
        if let Some(task) = self.inner.chip_task.lock().take() {
            task.abort();
        }

        // The reader acknowledges a stop with a late Cancelled completion
        let inner = Arc::clone(&self.inner);
        self.spawn_playback(async move {
            tokio::time::sleep(inner.step_delay()).await;
            let payload = CompletionPayload::new(Outcome::Cancelled, None);
            inner.emit_raw(EventChannel::Completion, &payload.to_json());
        });
        Ok(())
    }

    fn set_chip_session_status(&self, text: &str) -> Result<(), EngineError> {
        self.record(EngineRequest::ChipSessionStatus(text.to_string()));
        Ok(())
    }
}

impl EventSource for SimulatedEngine {
    fn subscribe(&self, channel: EventChannel, listener: RawListener) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.write().insert(id, (channel, listener));
        tracing::debug!("Listener {} subscribed to {}", id, channel);
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.listeners.write().remove(&id.0).is_some();
        if removed {
            tracing::debug!("Listener {} unsubscribed", id.0);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let engine = SimulatedEngine::new(SimulationScript::default());
        engine.initialize("bGljZW5zZQ==").await.unwrap();
        engine
            .request_capture(CaptureRequest {
                scenario: "Mrz".to_string(),
                mode: CaptureMode::Scan,
                images: Vec::new(),
            })
            .unwrap();
        engine.stop_chip_read().unwrap();

        let requests = engine.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], EngineRequest::Initialize);
        assert!(matches!(requests[1], EngineRequest::Capture(_)));
        assert_eq!(requests[2], EngineRequest::StopChipRead);
    }

    #[tokio::test]
    async fn test_capture_requires_initialization() {
        let engine = SimulatedEngine::new(SimulationScript::default());
        let result = engine.request_capture(CaptureRequest {
            scenario: "Mrz".to_string(),
            mode: CaptureMode::Scan,
            images: Vec::new(),
        });
        assert!(matches!(result, Err(EngineError::NotInitialized)));
    }

    #[test]
    fn test_emit_reaches_only_matching_channel() {
        let engine = SimulatedEngine::new(SimulationScript::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let id = engine.subscribe(
            EventChannel::Completion,
            Arc::new(move |_msg: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(engine.emit_chip_progress(10.0, None), 0);
        assert_eq!(engine.emit_completion(Outcome::Cancelled, None), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        assert_eq!(engine.emit_completion(Outcome::Cancelled, None), 0);
    }

    #[test]
    fn test_script_from_partial_json() {
        let script = SimulationScript::from_json(
            r#"{"chip_available": true, "capture": {"outcome": "timeout", "results": {}}}"#,
        )
        .unwrap();
        assert!(script.chip_available);
        assert_eq!(script.capture.outcome, Outcome::Timeout);
        assert_eq!(script.scenarios.len(), 4);
        assert!(!script.autoplay);
    }
}
