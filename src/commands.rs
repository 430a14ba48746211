//! Tauri commands exposing the verification session to the frontend.
//!
//! The host application supplies the engine; [`AppState::start`] spawns the
//! session driver with a [`TauriRuntime`] so every snapshot is emitted as a
//! `session-updated` event, and mounts the event router for the lifetime of
//! the window.

use std::sync::Arc;

use parking_lot::Mutex;
use tauri::{AppHandle, State};

use crate::engine::{CaptureMode, DocumentEngine, EventSource};
use crate::error::{Result, VerifierError};
use crate::router::EventRouter;
use crate::runtime::{TauriRuntime, VerifierRuntime};
use crate::session::{SessionDriver, SessionHandle, SessionMachine, SessionState};
use crate::settings::{license_path, load_license, SettingsManager, VerifierSettings};

pub struct AppState {
    pub session: SessionHandle,
    pub settings_manager: Arc<SettingsManager>,
    router: Mutex<Option<EventRouter>>,
}

impl AppState {
    /// Spawn the session for `engine` and subscribe to its events.
    pub fn start<E>(
        app_handle: AppHandle,
        engine: Arc<E>,
        settings: &VerifierSettings,
        settings_manager: Arc<SettingsManager>,
    ) -> Self
    where
        E: DocumentEngine + EventSource,
    {
        let runtime: Arc<dyn VerifierRuntime> = Arc::new(TauriRuntime::new(app_handle));
        let document_engine: Arc<dyn DocumentEngine> = engine.clone();
        let machine = SessionMachine::new(document_engine, settings.session_config());
        let session = SessionDriver::spawn(machine, Some(runtime));
        let router = EventRouter::mount(engine, Arc::new(session.clone()));

        Self {
            session,
            settings_manager,
            router: Mutex::new(Some(router)),
        }
    }

    /// Release engine subscriptions and stop the driver.
    pub fn shutdown(&self) {
        if let Some(router) = self.router.lock().take() {
            router.unmount();
        }
        self.session.shutdown();
    }
}

/// Load the configured license and initialize the engine.
#[tauri::command]
pub async fn initialize_session(state: State<'_, AppState>) -> Result<()> {
    let settings = state.settings_manager.get().await;
    let path = license_path(None, &settings).ok_or_else(|| {
        VerifierError::InitializationFailure("no license file configured".to_string())
    })?;
    let license = load_license(&path)
        .await
        .map_err(|e| VerifierError::InitializationFailure(format!("{:#}", e)))?;
    state.session.initialize(license).await
}

#[tauri::command]
pub async fn start_capture(
    state: State<'_, AppState>,
    mode: CaptureMode,
    images: Option<Vec<String>>,
) -> Result<()> {
    state
        .session
        .start_capture(mode, images.unwrap_or_default())
        .await
}

#[tauri::command]
pub async fn cancel_chip_read(state: State<'_, AppState>) -> Result<()> {
    state.session.cancel_chip_read().await
}

#[tauri::command]
pub async fn retry_chip_read(state: State<'_, AppState>) -> Result<()> {
    state.session.retry_chip_read().await
}

#[tauri::command]
pub async fn select_scenario(state: State<'_, AppState>, name: String) -> Result<()> {
    state.session.select_scenario(name).await
}

#[tauri::command]
pub async fn set_chip_opt_in(state: State<'_, AppState>, enabled: bool) -> Result<()> {
    state.session.set_chip_opt_in(enabled).await
}

/// Current snapshot, for windows that mount after the last update.
#[tauri::command]
pub fn get_session_state(state: State<'_, AppState>) -> SessionState {
    SessionState::clone(&state.session.snapshot())
}

#[tauri::command]
pub async fn get_settings(state: State<'_, AppState>) -> std::result::Result<VerifierSettings, String> {
    Ok(state.settings_manager.get().await)
}

#[tauri::command]
pub async fn update_settings(
    state: State<'_, AppState>,
    settings: VerifierSettings,
) -> std::result::Result<(), String> {
    state
        .settings_manager
        .update(settings)
        .await
        .map_err(|e| e.to_string())
}

/// Register the session commands on a Tauri builder.
pub fn register(builder: tauri::Builder<tauri::Wry>) -> tauri::Builder<tauri::Wry> {
    builder.invoke_handler(tauri::generate_handler![
        initialize_session,
        start_capture,
        cancel_chip_read,
        retry_chip_read,
        select_scenario,
        set_chip_opt_in,
        get_session_state,
        get_settings,
        update_settings,
    ])
}
