use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum VerifierError {
    /// Capability probe or license load failed; the session cannot start.
    #[error("Initialization failed: {0}")]
    InitializationFailure(String),

    /// Capture ended in Error/Cancelled with no usable bundle.
    #[error("Capture failed: {0}")]
    CaptureFailure(String),

    /// Chip phase ended in Error. Non-fatal, results fall back to optical data.
    #[error("Chip read failed: {0}")]
    ChipReadFailure(String),

    #[error("Malformed {channel} event: {detail}")]
    MalformedEvent { channel: String, detail: String },

    #[error("Command rejected: {0}")]
    Rejected(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session driver is no longer running")]
    DriverClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Implement Serialize for Tauri
impl Serialize for VerifierError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VerifierError>;
