//! Completion and chip-progress events, and their JSON wire form.
//!
//! Payloads arrive as JSON text on the engine's event channels:
//!
//! ```text
//! completion:     {"outcome": "success", "results": { ...bundle... }}
//! chip-progress:  {"percent_done": 40, "data_group": "DG2"}
//! ```
//!
//! Outcomes other than the four final ones (for example `"process"`) are
//! intermediate notifications and decode to `None`.

use serde::{Deserialize, Serialize};

use crate::engine::EventChannel;
use crate::error::{Result, VerifierError};
use crate::results::{BundleHandle, ResultBundle};

/// Final outcome of a capture or chip read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Timeout,
    Cancelled,
    Error,
}

impl Outcome {
    /// Success and Timeout both carry a usable bundle.
    pub fn has_results(self) -> bool {
        matches!(self, Outcome::Success | Outcome::Timeout)
    }

    pub fn is_failure(self) -> bool {
        !self.has_results()
    }
}

/// An operation ended. `bundle` is present iff the outcome has results.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    outcome: Outcome,
    bundle: Option<BundleHandle>,
    detail: Option<String>,
}

impl CompletionEvent {
    pub fn success(bundle: ResultBundle) -> Self {
        Self::with_results(Outcome::Success, bundle)
    }

    pub fn timeout(bundle: ResultBundle) -> Self {
        Self::with_results(Outcome::Timeout, bundle)
    }

    pub fn cancelled() -> Self {
        Self {
            outcome: Outcome::Cancelled,
            bundle: None,
            detail: None,
        }
    }

    pub fn error(detail: Option<String>) -> Self {
        Self {
            outcome: Outcome::Error,
            bundle: None,
            detail,
        }
    }

    fn with_results(outcome: Outcome, bundle: ResultBundle) -> Self {
        Self {
            outcome,
            bundle: Some(bundle.into_handle()),
            detail: None,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn bundle(&self) -> Option<&BundleHandle> {
        self.bundle.as_ref()
    }

    pub fn into_bundle(self) -> Option<BundleHandle> {
        self.bundle
    }

    /// Diagnostic text attached to failure outcomes
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipProgressEvent {
    /// 0..=100
    pub percent_done: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_group: Option<String>,
}

impl ChipProgressEvent {
    pub fn new(percent_done: f64, data_group: Option<&str>) -> Self {
        Self {
            percent_done,
            data_group: data_group.map(str::to_string),
        }
    }

    /// Progress as a fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        self.percent_done / 100.0
    }
}

/// Outcome values as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOutcome {
    Success,
    Timeout,
    Cancelled,
    Error,
    #[serde(other)]
    Intermediate,
}

impl From<Outcome> for WireOutcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => WireOutcome::Success,
            Outcome::Timeout => WireOutcome::Timeout,
            Outcome::Cancelled => WireOutcome::Cancelled,
            Outcome::Error => WireOutcome::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub outcome: WireOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultBundle>,
}

impl CompletionPayload {
    pub fn new(outcome: Outcome, results: Option<ResultBundle>) -> Self {
        Self {
            outcome: outcome.into(),
            results,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn malformed(channel: EventChannel, detail: impl Into<String>) -> VerifierError {
    VerifierError::MalformedEvent {
        channel: channel.name().to_string(),
        detail: detail.into(),
    }
}

/// Decode a completion payload. `Ok(None)` for intermediate notifications.
pub fn decode_completion(msg: &str) -> Result<Option<CompletionEvent>> {
    let payload: CompletionPayload = serde_json::from_str(msg)
        .map_err(|e| malformed(EventChannel::Completion, e.to_string()))?;

    let outcome = match payload.outcome {
        WireOutcome::Success => Outcome::Success,
        WireOutcome::Timeout => Outcome::Timeout,
        WireOutcome::Cancelled => Outcome::Cancelled,
        WireOutcome::Error => Outcome::Error,
        WireOutcome::Intermediate => return Ok(None),
    };

    if outcome.has_results() {
        let bundle = payload.results.ok_or_else(|| {
            malformed(
                EventChannel::Completion,
                format!("{:?} outcome without results", outcome),
            )
        })?;
        return Ok(Some(CompletionEvent::with_results(outcome, bundle)));
    }

    if payload.results.is_some() {
        tracing::debug!("Discarding results attached to {:?} completion", outcome);
    }

    Ok(Some(match outcome {
        Outcome::Cancelled => CompletionEvent::cancelled(),
        _ => CompletionEvent::error(None),
    }))
}

pub fn decode_chip_progress(msg: &str) -> Result<ChipProgressEvent> {
    let event: ChipProgressEvent = serde_json::from_str(msg)
        .map_err(|e| malformed(EventChannel::ChipProgress, e.to_string()))?;

    if !event.percent_done.is_finite() || !(0.0..=100.0).contains(&event.percent_done) {
        return Err(malformed(
            EventChannel::ChipProgress,
            format!("percent_done out of range: {}", event.percent_done),
        ));
    }

    Ok(event)
}
