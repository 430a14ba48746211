//! Session state record and the snapshot handed to the presentation layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authenticity::Authenticity;
use crate::results::{BundleHandle, BundleId, ExtractionError, FieldValue, ImageRef};

pub const HEADLINE_PLEASE_WAIT: &str = "Please wait...";
pub const HEADLINE_INITIALIZING: &str = "Initializing...";
pub const HEADLINE_READY: &str = "Ready to Scan";
pub const HEADLINE_PROCESSING_IMAGE: &str = "Processing Image...";
pub const HEADLINE_INIT_FAILED: &str = "Initialization Failed";

pub const CHIP_HEADER_READING: &str = "Reading RFID";
pub const CHIP_HEADER_FAILED: &str = "Failed!";
pub const CHIP_PROMPT: &str = "Place your phone on top of the NFC tag";

/// `chip_progress` value before any progress has been reported.
pub const CHIP_PROGRESS_NOT_STARTED: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Capturing,
    ChipReading,
    Presenting,
    Failed,
}

impl SessionStatus {
    /// A new capture may start from this status.
    pub fn accepts_capture(self) -> bool {
        matches!(
            self,
            SessionStatus::Idle | SessionStatus::Presenting | SessionStatus::Failed
        )
    }

    /// Engine events are only meaningful while an operation is in flight.
    pub fn accepts_events(self) -> bool {
        matches!(self, SessionStatus::Capturing | SessionStatus::ChipReading)
    }
}

/// Sub-state of `ChipReading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipPhase {
    /// A chip read request is outstanding
    Reading,
    /// The last chip read failed; waiting for the user to retry or cancel
    RetryPrompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Initialization,
    Capture,
    ChipRead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub stage: ErrorStage,
    pub detail: String,
}

impl ErrorInfo {
    pub fn new(stage: ErrorStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Neutral,
    Failure,
}

/// Advisory status line shown during chip reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipStatusLine {
    pub header: String,
    pub description: String,
    pub tone: StatusTone,
}

impl Default for ChipStatusLine {
    fn default() -> Self {
        Self {
            header: CHIP_HEADER_READING.to_string(),
            description: CHIP_PROMPT.to_string(),
            tone: StatusTone::Neutral,
        }
    }
}

impl ChipStatusLine {
    pub fn failed() -> Self {
        Self {
            header: CHIP_HEADER_FAILED.to_string(),
            description: CHIP_PROMPT.to_string(),
            tone: StatusTone::Failure,
        }
    }
}

/// The "process chip" toggle as the UI should render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipOption {
    pub available: bool,
    pub opted_in: bool,
}

impl ChipOption {
    pub fn label(&self) -> String {
        if self.available {
            "Process RFID Reading".to_string()
        } else {
            "Process RFID Reading (unavailable)".to_string()
        }
    }
}

/// The one session record. Only the state machine mutates it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip_phase: Option<ChipPhase>,

    /// Live bundle; released when the next capture starts
    #[serde(skip)]
    pub captured_bundle: Option<BundleHandle>,
    pub bundle_id: Option<BundleId>,

    pub chip_required: bool,
    /// A chip read was issued for the current capture
    pub chip_attempted: bool,
    /// `[-1, 1]`, -1 until the first progress report
    pub chip_progress: f64,
    pub chip_status: ChipStatusLine,
    pub chip_option: ChipOption,

    pub identity_name: FieldValue<String>,
    pub portrait_image: FieldValue<ImageRef>,
    pub document_image: FieldValue<ImageRef>,
    pub authenticity: Option<Authenticity>,
    pub extraction_errors: Vec<ExtractionError>,
    pub error_info: Option<ErrorInfo>,

    pub headline: String,
    pub is_loading: bool,
    /// The engine accepted its license and can take requests
    pub ready: bool,
    pub scenarios: Vec<String>,
    pub selected_scenario: Option<String>,

    /// Bumped on every applied change
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            chip_phase: None,
            captured_bundle: None,
            bundle_id: None,
            chip_required: false,
            chip_attempted: false,
            chip_progress: CHIP_PROGRESS_NOT_STARTED,
            chip_status: ChipStatusLine::default(),
            chip_option: ChipOption {
                available: false,
                opted_in: false,
            },
            identity_name: FieldValue::NotAttempted,
            portrait_image: FieldValue::NotAttempted,
            document_image: FieldValue::NotAttempted,
            authenticity: None,
            extraction_errors: Vec::new(),
            error_info: None,
            headline: HEADLINE_PLEASE_WAIT.to_string(),
            is_loading: false,
            ready: false,
            scenarios: Vec::new(),
            selected_scenario: None,
            revision: 0,
            updated_at: Utc::now(),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything a capture produces. Configuration (scenarios, chip
    /// option, readiness) survives.
    pub(crate) fn reset_for_capture(&mut self) {
        self.chip_phase = None;
        self.set_bundle(None);
        self.chip_required = false;
        self.chip_attempted = false;
        self.chip_progress = CHIP_PROGRESS_NOT_STARTED;
        self.chip_status = ChipStatusLine::default();
        self.identity_name = FieldValue::NotAttempted;
        self.portrait_image = FieldValue::NotAttempted;
        self.document_image = FieldValue::NotAttempted;
        self.authenticity = None;
        self.extraction_errors.clear();
        self.error_info = None;
    }

    /// Replace the live bundle, releasing the previous one.
    pub(crate) fn set_bundle(&mut self, bundle: Option<BundleHandle>) {
        self.bundle_id = bundle.as_ref().map(|b| b.id());
        self.captured_bundle = bundle;
    }

    /// The last operation has come to rest and the session waits for the user.
    pub fn is_settled(&self) -> bool {
        match self.status {
            SessionStatus::Presenting | SessionStatus::Failed => true,
            SessionStatus::ChipReading => self.chip_phase == Some(ChipPhase::RetryPrompt),
            SessionStatus::Idle | SessionStatus::Capturing => false,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    /// Immutable copy for readers.
    pub fn snapshot(&self) -> SessionSnapshot {
        Arc::new(self.clone())
    }
}

/// Read-only view of the session handed to the presentation layer.
pub type SessionSnapshot = Arc<SessionState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultBundle;

    #[test]
    fn test_status_gates() {
        assert!(SessionStatus::Idle.accepts_capture());
        assert!(SessionStatus::Presenting.accepts_capture());
        assert!(SessionStatus::Failed.accepts_capture());
        assert!(!SessionStatus::Capturing.accepts_capture());
        assert!(!SessionStatus::ChipReading.accepts_capture());

        assert!(SessionStatus::Capturing.accepts_events());
        assert!(SessionStatus::ChipReading.accepts_events());
        assert!(!SessionStatus::Presenting.accepts_events());
    }

    #[test]
    fn test_reset_keeps_configuration() {
        let mut state = SessionState::new();
        state.ready = true;
        state.scenarios = vec!["Mrz".to_string()];
        state.chip_option.available = true;
        state.set_bundle(Some(ResultBundle::new().into_handle()));
        state.chip_progress = 0.5;
        state.identity_name = FieldValue::Found("DOE".to_string());

        state.reset_for_capture();

        assert!(state.ready);
        assert_eq!(state.scenarios.len(), 1);
        assert!(state.chip_option.available);
        assert!(state.captured_bundle.is_none());
        assert!(state.bundle_id.is_none());
        assert_eq!(state.chip_progress, CHIP_PROGRESS_NOT_STARTED);
        assert_eq!(state.identity_name, FieldValue::NotAttempted);
    }

    #[test]
    fn test_settled_states() {
        let mut state = SessionState::new();
        assert!(!state.is_settled());

        state.status = SessionStatus::ChipReading;
        state.chip_phase = Some(ChipPhase::Reading);
        assert!(!state.is_settled());
        state.chip_phase = Some(ChipPhase::RetryPrompt);
        assert!(state.is_settled());

        state.status = SessionStatus::Failed;
        assert!(state.is_settled());
    }

    #[test]
    fn test_chip_option_label() {
        let mut option = ChipOption {
            available: false,
            opted_in: false,
        };
        assert_eq!(option.label(), "Process RFID Reading (unavailable)");
        option.available = true;
        assert_eq!(option.label(), "Process RFID Reading");
    }

    #[test]
    fn test_snapshot_serializes_without_bundle() {
        let mut state = SessionState::new();
        state.set_bundle(Some(ResultBundle::new().into_handle()));
        let json = serde_json::to_value(&*state.snapshot()).unwrap();
        assert!(json.get("captured_bundle").is_none());
        assert!(json["bundle_id"].is_string());
        assert_eq!(json["status"], "idle");
    }
}
