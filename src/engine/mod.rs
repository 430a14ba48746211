//! Interfaces of the external capture / chip-reading engine.
//!
//! The engine is a black box: it is initialized with a license, probed once
//! for capabilities, and then driven with fire-and-forget requests. Results
//! come back out-of-band on two event channels ([`EventChannel`]) that the
//! [`crate::router::EventRouter`] subscribes to through [`EventSource`].
//!
//! `request_*` methods must not block. Their `Result` only reports whether the
//! engine accepted the request; the outcome always arrives as a completion
//! event.

pub mod simulated;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use simulated::{SimulatedEngine, SimulationScript};

/// Engine-level errors
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("License rejected: {0}")]
    License(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result of the one-shot capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    pub chip_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// How the document images are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Camera-driven optical scan
    Scan,
    /// Recognition of supplied gallery images
    Recognize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub scenario: String,
    pub mode: CaptureMode,
    /// Base64 image payloads; empty for `Scan`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// Data the chip reader may skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipReadOptions {
    pub skip_portrait: bool,
    pub skip_document_data: bool,
    pub skip_authentication: bool,
}

/// The two out-of-band channels the engine reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventChannel {
    Completion,
    ChipProgress,
}

impl EventChannel {
    pub fn name(&self) -> &'static str {
        match self {
            EventChannel::Completion => "completion",
            EventChannel::ChipProgress => "chip-progress",
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback invoked with each raw payload delivered on a channel.
pub type RawListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Out-of-band event delivery.
pub trait EventSource: Send + Sync + 'static {
    /// Register `listener` for `channel`. Delivery starts immediately.
    fn subscribe(&self, channel: EventChannel, listener: RawListener) -> SubscriptionId;

    /// Remove a listener. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Requests the session issues to the engine.
///
/// # Object Safety
/// This trait is object-safe and intended to be used as `Arc<dyn DocumentEngine>`.
#[async_trait]
pub trait DocumentEngine: Send + Sync + 'static {
    /// Initialize the engine with a base64 license blob.
    async fn initialize(&self, license: &str) -> Result<(), EngineError>;

    /// Whether a contactless chip reader is physically present.
    async fn probe_capability(&self) -> Result<Capability, EngineError>;

    async fn list_scenarios(&self) -> Result<Vec<Scenario>, EngineError>;

    fn request_capture(&self, request: CaptureRequest) -> Result<(), EngineError>;

    fn request_chip_read(&self, options: ChipReadOptions) -> Result<(), EngineError>;

    fn stop_chip_read(&self) -> Result<(), EngineError>;

    /// Update the text of the engine's native chip-reading prompt.
    fn set_chip_session_status(&self, text: &str) -> Result<(), EngineError>;
}
