//! The verification session state machine.
//!
//! ```text
//!            start_capture                 policy: chip required
//!   Idle ───────────────────▶ Capturing ─────────────────────────▶ ChipReading
//!    ▲                          │   │                                  │  │
//!    │ (next capture)           │   │ Success/Timeout, no chip         │  │ any outcome,
//!    │                          │   ▼                                  │  │ cancel_chip_read
//!    └──────────────────── Presenting ◀────────────────────────────────┘  │
//!                               ▲                                         │
//!          Cancelled/Error      │           Cancelled/Error (RetryPrompt) │
//!   Capturing ──────────▶ Failed            ChipReading[RetryPrompt] ◀────┘
//! ```
//!
//! All transitions are synchronous updates of the one [`SessionState`].
//! Engine requests are fire-and-forget; their outcomes come back through
//! [`SessionMachine::on_completion`] and [`SessionMachine::on_chip_progress`].
//! Events that arrive while no operation is in flight belong to a superseded
//! session and are ignored.

use std::sync::Arc;

use crate::authenticity;
use crate::engine::{CaptureMode, CaptureRequest, ChipReadOptions, DocumentEngine};
use crate::error::{Result, VerifierError};
use crate::events::{ChipProgressEvent, CompletionEvent, Outcome};
use crate::policy::{chip_read_required, CapabilityCache, ChipFailureAction};
use crate::results::{BundleHandle, FieldValue, ResultExtractor, NAME_NOT_FOUND};

use super::state::{
    ChipPhase, ChipStatusLine, ErrorInfo, ErrorStage, SessionSnapshot, SessionState,
    SessionStatus, StatusTone, CHIP_HEADER_READING, CHIP_PROGRESS_NOT_STARTED,
    HEADLINE_INITIALIZING, HEADLINE_INIT_FAILED, HEADLINE_PROCESSING_IMAGE, HEADLINE_READY,
};

/// Per-process session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub chip_failure: ChipFailureAction,
    /// Mirror the chip status line into the engine's native chip prompt
    pub mirror_chip_status: bool,
    pub max_gallery_images: usize,
    pub chip_read: ChipReadOptions,
    pub default_scenario: Option<String>,
    /// Initial value of the chip toggle when a reader is present
    pub chip_opt_in: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chip_failure: ChipFailureAction::Present,
            mirror_chip_status: false,
            max_gallery_images: 10,
            chip_read: ChipReadOptions::default(),
            default_scenario: None,
            chip_opt_in: false,
        }
    }
}

/// Whether an inbound event changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Applied,
    Ignored,
}

pub struct SessionMachine {
    engine: Arc<dyn DocumentEngine>,
    config: SessionConfig,
    extractor: ResultExtractor,
    capability: CapabilityCache,
    state: SessionState,
}

impl SessionMachine {
    pub fn new(engine: Arc<dyn DocumentEngine>, config: SessionConfig) -> Self {
        Self {
            engine,
            config,
            extractor: ResultExtractor::new(),
            capability: CapabilityCache::new(),
            state: SessionState::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn revision(&self) -> u64 {
        self.state.revision
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Initialize the engine, probe the chip reader, and load scenarios.
    ///
    /// A failure leaves the session `Failed` at the initialization stage until
    /// this is called again.
    pub async fn initialize(&mut self, license: &str) -> Result<()> {
        self.begin_initialize()?;
        self.complete_initialize(license).await
    }

    /// First half of [`initialize`](Self::initialize): gate and show progress.
    pub(crate) fn begin_initialize(&mut self) -> Result<()> {
        if !self.state.status.accepts_capture() {
            return Err(self.reject("initialize", "an operation is in flight"));
        }
        self.state.headline = HEADLINE_INITIALIZING.to_string();
        self.state.is_loading = true;
        self.state.touch();
        Ok(())
    }

    pub(crate) async fn complete_initialize(&mut self, license: &str) -> Result<()> {
        let engine = Arc::clone(&self.engine);

        if let Err(e) = engine.initialize(license).await {
            return Err(self.fail_initialization(e.to_string()));
        }

        let capability = match self.capability.get_or_probe(engine.as_ref()).await {
            Ok(capability) => capability,
            Err(e) => return Err(self.fail_initialization(format!("capability probe: {}", e))),
        };

        self.state.chip_option.available = capability.chip_available;
        self.state.chip_option.opted_in = capability.chip_available && self.config.chip_opt_in;

        match engine.list_scenarios().await {
            Ok(scenarios) => {
                self.state.scenarios = scenarios.into_iter().map(|s| s.name).collect();
            }
            Err(e) => {
                tracing::warn!("Failed to list scenarios: {}", e);
                self.state.scenarios.clear();
            }
        }
        let scenarios = &self.state.scenarios;
        let selected = self
            .config
            .default_scenario
            .clone()
            .filter(|name| scenarios.contains(name))
            .or_else(|| scenarios.first().cloned());
        self.state.selected_scenario = selected;

        // Drop results left over from before re-initialization
        self.state.reset_for_capture();
        self.state.ready = true;
        self.state.status = SessionStatus::Idle;
        self.state.headline = HEADLINE_READY.to_string();
        self.state.is_loading = false;
        self.state.touch();

        tracing::info!(
            "Session initialized: chip_available={}, scenarios={}",
            capability.chip_available,
            self.state.scenarios.len()
        );
        Ok(())
    }

    fn fail_initialization(&mut self, detail: String) -> VerifierError {
        tracing::error!("Initialization failed: {}", detail);
        self.state.ready = false;
        self.state.status = SessionStatus::Failed;
        self.state.error_info = Some(ErrorInfo::new(ErrorStage::Initialization, detail.clone()));
        self.state.headline = HEADLINE_INIT_FAILED.to_string();
        self.state.is_loading = false;
        self.state.touch();
        VerifierError::InitializationFailure(detail)
    }

    // ------------------------------------------------------------------
    // User operations
    // ------------------------------------------------------------------

    /// Scenario-selection setter.
    pub fn select_scenario(&mut self, name: &str) -> Result<()> {
        if !self.state.scenarios.iter().any(|s| s == name) {
            return Err(self.reject("select_scenario", &format!("unknown scenario '{}'", name)));
        }
        if self.state.selected_scenario.as_deref() != Some(name) {
            self.state.selected_scenario = Some(name.to_string());
            self.state.touch();
        }
        Ok(())
    }

    /// Toggle the chip-read option. Stays off when no reader is present.
    pub fn set_chip_opt_in(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.capability.chip_available() {
            return Err(self.reject("set_chip_opt_in", "no chip reader available"));
        }
        if self.state.chip_option.opted_in != enabled {
            self.state.chip_option.opted_in = enabled;
            self.state.touch();
        }
        Ok(())
    }

    /// Start a new capture. Rejected, with the state left untouched, while a
    /// capture or chip read is in flight.
    pub fn start_capture(&mut self, mode: CaptureMode, images: Vec<String>) -> Result<()> {
        if !self.state.ready {
            return Err(self.reject("start_capture", "engine is not initialized"));
        }
        if !self.state.status.accepts_capture() {
            return Err(self.reject(
                "start_capture",
                &format!("session is {:?}", self.state.status),
            ));
        }
        let Some(scenario) = self.state.selected_scenario.clone() else {
            return Err(self.reject("start_capture", "no scenario selected"));
        };

        let images = match mode {
            CaptureMode::Scan => Vec::new(),
            CaptureMode::Recognize if images.is_empty() => {
                return Err(self.reject("start_capture", "no images to recognize"));
            }
            CaptureMode::Recognize if images.len() > self.config.max_gallery_images => {
                return Err(self.reject(
                    "start_capture",
                    &format!(
                        "{} images exceed the limit of {}",
                        images.len(),
                        self.config.max_gallery_images
                    ),
                ));
            }
            CaptureMode::Recognize => images,
        };

        self.state.reset_for_capture();
        self.state.status = SessionStatus::Capturing;
        self.state.is_loading = true;
        self.state.headline = match mode {
            CaptureMode::Scan => HEADLINE_READY.to_string(),
            CaptureMode::Recognize => HEADLINE_PROCESSING_IMAGE.to_string(),
        };
        self.state.touch();

        tracing::info!("Capture started: mode={:?}, scenario={}", mode, scenario);

        let request = CaptureRequest {
            scenario,
            mode,
            images,
        };
        if let Err(e) = self.engine.request_capture(request) {
            tracing::warn!("Engine refused capture request: {}", e);
            self.state.status = SessionStatus::Failed;
            self.state.is_loading = false;
            self.state.headline = HEADLINE_READY.to_string();
            self.state.error_info = Some(ErrorInfo::new(ErrorStage::Capture, e.to_string()));
            self.state.touch();
            return Err(VerifierError::CaptureFailure(e.to_string()));
        }
        Ok(())
    }

    /// Abandon the chip read and present the optical results.
    pub fn cancel_chip_read(&mut self) -> Result<()> {
        if self.state.status != SessionStatus::ChipReading {
            return Err(self.reject(
                "cancel_chip_read",
                &format!("session is {:?}", self.state.status),
            ));
        }

        // Do not wait for the stop to be acknowledged; the late completion
        // is dropped by the status gate once we are Presenting.
        if let Err(e) = self.engine.stop_chip_read() {
            tracing::warn!("Engine refused stop request: {}", e);
        }

        tracing::info!("Chip read cancelled by user");
        self.state.chip_progress = CHIP_PROGRESS_NOT_STARTED;
        self.state.chip_status = ChipStatusLine::default();
        let optical = self.state.captured_bundle.clone();
        self.present(optical);
        Ok(())
    }

    /// Re-issue the chip read from the retry prompt.
    pub fn retry_chip_read(&mut self) -> Result<()> {
        if self.state.chip_phase != Some(ChipPhase::RetryPrompt) {
            return Err(self.reject("retry_chip_read", "no failed chip read to retry"));
        }
        tracing::info!("Retrying chip read");
        self.begin_chip_read();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Routed events
    // ------------------------------------------------------------------

    pub fn on_completion(&mut self, event: CompletionEvent) -> EventDisposition {
        let outcome = event.outcome();
        if !self.state.status.accepts_events() {
            tracing::debug!("Ignoring {:?} completion while {:?}", outcome, self.state.status);
            return EventDisposition::Ignored;
        }
        match (self.state.status, self.state.chip_phase) {
            (SessionStatus::Capturing, _) => {
                self.on_capture_completion(event);
                EventDisposition::Applied
            }
            (SessionStatus::ChipReading, Some(ChipPhase::Reading)) => {
                self.on_chip_completion(event);
                EventDisposition::Applied
            }
            (status, phase) => {
                tracing::debug!(
                    "Ignoring {:?} completion while {:?} ({:?})",
                    outcome,
                    status,
                    phase
                );
                EventDisposition::Ignored
            }
        }
    }

    pub fn on_chip_progress(&mut self, event: ChipProgressEvent) -> EventDisposition {
        if !self.state.status.accepts_events()
            || self.state.chip_phase != Some(ChipPhase::Reading)
        {
            tracing::debug!(
                "Ignoring chip progress {}% while {:?}",
                event.percent_done,
                self.state.status
            );
            return EventDisposition::Ignored;
        }

        if let Some(group) = &event.data_group {
            self.state.chip_status.description = format!("Reading Data: {}", group);
        }
        self.state.chip_status.header = CHIP_HEADER_READING.to_string();
        self.state.chip_status.tone = StatusTone::Neutral;
        // Out-of-order progress never moves the bar backwards
        self.state.chip_progress = self.state.chip_progress.max(event.fraction());
        self.state.touch();

        if self.config.mirror_chip_status {
            let text = format!(
                "{}\n{}%",
                self.state.chip_status.description, event.percent_done
            );
            if let Err(e) = self.engine.set_chip_session_status(&text) {
                tracing::debug!("Failed to mirror chip status: {}", e);
            }
        }
        EventDisposition::Applied
    }

    fn on_capture_completion(&mut self, event: CompletionEvent) {
        let outcome = event.outcome();
        if outcome.is_failure() {
            let detail = event
                .detail()
                .map(str::to_string)
                .unwrap_or_else(|| failure_detail("capture", outcome));
            tracing::info!("Capture ended without results: {}", detail);
            self.state.status = SessionStatus::Failed;
            self.state.is_loading = false;
            self.state.headline = HEADLINE_READY.to_string();
            self.state.error_info = Some(ErrorInfo::new(ErrorStage::Capture, detail));
            self.state.touch();
            return;
        }

        let Some(bundle) = event.into_bundle() else {
            return;
        };
        self.state.set_bundle(Some(Arc::clone(&bundle)));

        let required = chip_read_required(
            &bundle,
            self.state.chip_option.opted_in,
            self.capability.chip_available(),
        );
        self.state.chip_required = required;

        if required && !self.state.chip_attempted {
            tracing::info!("Capture {:?}; chip read required", outcome);
            self.begin_chip_read();
        } else {
            tracing::info!("Capture {:?}; presenting optical results", outcome);
            self.present(Some(bundle));
        }
    }

    fn on_chip_completion(&mut self, event: CompletionEvent) {
        let outcome = event.outcome();

        if outcome.is_failure() {
            let detail = event
                .detail()
                .map(str::to_string)
                .unwrap_or_else(|| failure_detail("chip read", outcome));
            tracing::info!("{}", VerifierError::ChipReadFailure(detail.clone()));
            self.state.error_info = Some(ErrorInfo::new(ErrorStage::ChipRead, detail));
            self.state.chip_status = ChipStatusLine::failed();
            self.state.chip_progress = CHIP_PROGRESS_NOT_STARTED;

            if self.config.chip_failure == ChipFailureAction::RetryPrompt {
                self.state.chip_phase = Some(ChipPhase::RetryPrompt);
                self.state.is_loading = false;
                self.state.touch();
                return;
            }

            let optical = self.state.captured_bundle.clone();
            self.present(optical);
            return;
        }

        tracing::info!("Chip read {:?}", outcome);
        let bundle = event.into_bundle();
        if bundle.is_some() {
            self.state.set_bundle(bundle.clone());
        }
        let bundle = bundle.or_else(|| self.state.captured_bundle.clone());
        self.present(bundle);
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn begin_chip_read(&mut self) {
        self.state.status = SessionStatus::ChipReading;
        self.state.chip_phase = Some(ChipPhase::Reading);
        self.state.chip_attempted = true;
        self.state.chip_progress = CHIP_PROGRESS_NOT_STARTED;
        self.state.chip_status = ChipStatusLine::default();
        self.state.is_loading = true;
        self.state.touch();

        if let Err(e) = self.engine.request_chip_read(self.config.chip_read) {
            tracing::warn!("Engine refused chip read request: {}", e);
            self.state.error_info = Some(ErrorInfo::new(ErrorStage::ChipRead, e.to_string()));
            self.state.chip_status = ChipStatusLine::failed();
            let optical = self.state.captured_bundle.clone();
            self.present(optical);
        }
    }

    /// Enter `Presenting` and run extraction over `bundle`.
    fn present(&mut self, bundle: Option<BundleHandle>) {
        self.state.status = SessionStatus::Presenting;
        self.state.chip_phase = None;
        self.state.is_loading = false;

        match bundle {
            Some(bundle) => {
                let extraction = self.extractor.extract(&bundle);
                let authenticity =
                    authenticity::evaluate(extraction.authenticity_checks.found().map(Vec::as_slice));
                self.state.headline = extraction
                    .identity_name
                    .text_or(NAME_NOT_FOUND)
                    .unwrap_or(NAME_NOT_FOUND)
                    .to_string();
                self.state.identity_name = extraction.identity_name;
                self.state.portrait_image = extraction.portrait;
                self.state.document_image = extraction.document_image;
                self.state.extraction_errors = extraction.errors;
                self.state.authenticity = Some(authenticity);
            }
            None => {
                self.state.headline = NAME_NOT_FOUND.to_string();
                self.state.identity_name = FieldValue::NotFound;
                self.state.portrait_image = FieldValue::NotFound;
                self.state.document_image = FieldValue::NotFound;
                self.state.authenticity = Some(authenticity::evaluate(None));
            }
        }
        self.state.touch();

        tracing::info!(
            "Presenting results: name={}, authenticity={:?}",
            self.state.headline,
            self.state.authenticity.as_ref().map(|a| a.verdict)
        );
    }

    fn reject(&self, command: &str, reason: &str) -> VerifierError {
        tracing::warn!("Rejected {}: {}", command, reason);
        VerifierError::Rejected(format!("{}: {}", command, reason))
    }
}

fn failure_detail(stage: &str, outcome: Outcome) -> String {
    match outcome {
        Outcome::Cancelled => format!("{} cancelled", stage),
        _ => format!("{} ended with an error", stage),
    }
}
