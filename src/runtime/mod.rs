// Runtime abstraction for CLI vs Tauri environments
//
// The `tauri` and `cli` features are mutually exclusive. Each provides a different
// implementation of the VerifierRuntime trait for their respective environments.

// Compile-time guard: ensure tauri and cli features are mutually exclusive
#[cfg(all(feature = "tauri", feature = "cli"))]
compile_error!("Features 'tauri' and 'cli' are mutually exclusive. Use --features tauri OR --features cli, not both.");

use std::any::Any;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::session::SessionState;

/// Runtime-specific errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to emit event: {0}")]
    EmitFailed(String),

    #[error("Event receiver closed")]
    ReceiverClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events published to the frontend/CLI
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RuntimeEvent {
    /// A new session snapshot
    SessionUpdated(Box<SessionState>),

    /// Generic extensibility
    Custom {
        name: String,
        payload: serde_json::Value,
    },
}

/// Runtime abstraction for Tauri vs CLI environments
///
/// # Object Safety
/// This trait is object-safe and intended to be used as `Arc<dyn VerifierRuntime>`.
#[async_trait]
pub trait VerifierRuntime: Send + Sync + 'static {
    /// Emit an event to the frontend/output
    ///
    /// # Errors
    /// Returns `RuntimeError::EmitFailed` or `RuntimeError::ReceiverClosed` if
    /// the event cannot be delivered.
    fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError>;

    /// Check if running in interactive mode (has UI or TTY)
    fn is_interactive(&self) -> bool;

    /// Graceful shutdown - flush events, close channels, etc.
    async fn shutdown(&self) -> Result<(), RuntimeError>;

    /// Get as Any for downcasting to concrete type.
    fn as_any(&self) -> &dyn Any;
}

// Feature-gated runtime implementations
#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "tauri")]
pub mod tauri;

#[cfg(feature = "cli")]
pub use cli::CliRuntime;
#[cfg(feature = "tauri")]
pub use tauri::TauriRuntime;
