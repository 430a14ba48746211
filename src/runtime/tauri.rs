use super::{RuntimeError, RuntimeEvent, VerifierRuntime};
use async_trait::async_trait;
use std::any::Any;
use tauri::{AppHandle, Emitter};

/// Event name the frontend listens on for session snapshots.
pub const SESSION_UPDATED_EVENT: &str = "session-updated";

pub struct TauriRuntime {
    app_handle: AppHandle,
}

impl TauriRuntime {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

#[async_trait]
impl VerifierRuntime for TauriRuntime {
    fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError> {
        match &event {
            RuntimeEvent::SessionUpdated(state) => {
                self.app_handle
                    .emit(SESSION_UPDATED_EVENT, state)
                    .map_err(|e| RuntimeError::EmitFailed(e.to_string()))?;
            }
            RuntimeEvent::Custom { name, payload } => {
                self.app_handle
                    .emit(name, payload)
                    .map_err(|e| RuntimeError::EmitFailed(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn is_interactive(&self) -> bool {
        true // Tauri always has UI
    }

    async fn shutdown(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
