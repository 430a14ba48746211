//! CLI bootstrap - wire settings, engine, session driver, and event router.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::engine::{SimulatedEngine, SimulationScript};
use crate::router::EventRouter;
use crate::runtime::{CliRuntime, RuntimeEvent, VerifierRuntime};
use crate::session::{SessionDriver, SessionHandle, SessionMachine};
use crate::settings::{license_path, load_license, SettingsManager, VerifierSettings};

use super::args::Args;

/// Everything a CLI run needs, owned for the lifetime of the process.
pub struct CliContext {
    /// Runtime abstraction for event emission
    pub runtime: Arc<dyn VerifierRuntime>,

    /// Receiver for events emitted before the first capture
    pub event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,

    pub session: SessionHandle,

    pub engine: SimulatedEngine,

    /// Engine event subscriptions, released on shutdown
    router: Option<EventRouter>,

    pub settings_manager: Arc<SettingsManager>,

    /// Command-line arguments
    pub args: Args,
}

impl CliContext {
    /// Graceful shutdown: unsubscribe from the engine and stop the driver.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(router) = self.router.take() {
            router.unmount();
        }
        self.session.shutdown();

        if let Err(e) = self.runtime.shutdown().await {
            tracing::warn!("Runtime shutdown error: {}", e);
        }
        Ok(())
    }
}

/// Initialize the CLI context and the verification session.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Failed to load .env file: {}", e);
        }
    }

    let settings_manager = Arc::new(match &args.settings {
        Some(path) => SettingsManager::with_path(path).await,
        None => SettingsManager::new().await,
    }
    .context("Failed to initialize settings manager")?);

    // First run creates a template; an explicit path is never written
    if args.settings.is_none() {
        if let Err(e) = settings_manager.ensure_settings_file().await {
            eprintln!("Failed to create settings template: {}", e);
        }
    }

    let settings = settings_manager.get().await;
    init_logging(args, &settings);

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
    }

    let script = load_script(args.script.as_deref()).await?;
    let engine = SimulatedEngine::new(script.autoplay());

    let (event_tx, event_rx) = mpsc::unbounded_channel::<RuntimeEvent>();
    let runtime: Arc<dyn VerifierRuntime> = Arc::new(CliRuntime::new(event_tx));

    let mut config = settings.session_config();
    if let Some(opt_in) = args.chip_override() {
        config.chip_opt_in = opt_in;
    }
    if let Some(scenario) = &args.scenario {
        config.default_scenario = Some(scenario.clone());
    }

    let machine = SessionMachine::new(Arc::new(engine.clone()), config);
    let session = SessionDriver::spawn(machine, Some(runtime.clone()));
    let router = EventRouter::mount(Arc::new(engine.clone()), Arc::new(session.clone()));

    let license = match license_path(args.license.as_deref(), &settings) {
        Some(path) => load_license(&path)
            .await
            .map_err(|e| crate::error::VerifierError::InitializationFailure(format!("{:#}", e)))?,
        None => {
            tracing::warn!("No license configured, initializing without one");
            String::new()
        }
    };

    session
        .initialize(license)
        .await
        .context("Failed to initialize verification session")?;

    // A scenario named on the command line must exist
    if let Some(scenario) = &args.scenario {
        session.select_scenario(scenario.clone()).await?;
    }

    if args.verbose {
        let snapshot = session.snapshot();
        eprintln!(
            "[cli] Session ready: scenario={}, chip={}",
            snapshot.selected_scenario.as_deref().unwrap_or("-"),
            snapshot.chip_option.label()
        );
    }

    Ok(CliContext {
        runtime,
        event_rx,
        session,
        engine,
        router: Some(router),
        settings_manager,
        args: args.clone(),
    })
}

fn init_logging(args: &Args, settings: &VerifierSettings) {
    let directive = if args.verbose {
        "docverify=debug".to_string()
    } else {
        settings.logging.filter.clone()
    };

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match directive.parse() {
        Ok(d) => filter = filter.add_directive(d),
        Err(e) => eprintln!("Ignoring invalid log filter '{}': {}", directive, e),
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load a simulation script, or the built-in demo script.
async fn load_script(path: Option<&Path>) -> Result<SimulationScript> {
    let Some(path) = path else {
        return Ok(SimulationScript::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read simulation script: {}", path.display()))?;
    SimulationScript::from_json(&text)
        .with_context(|| format!("Invalid simulation script: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_script_defaults_without_path() {
        let script = load_script(None).await.unwrap();
        assert!(!script.chip_available);
    }

    #[tokio::test]
    async fn test_load_script_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.json");
        tokio::fs::write(&path, r#"{"chip_available": true, "step_delay_ms": 1}"#)
            .await
            .unwrap();

        let script = load_script(Some(&path)).await.unwrap();
        assert!(script.chip_available);
        assert_eq!(script.step_delay_ms, 1);
    }

    #[tokio::test]
    async fn test_load_script_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(load_script(Some(&path)).await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_with_explicit_settings_and_license() {
        let dir = TempDir::new().unwrap();
        let settings_path = dir.path().join("settings.toml");
        tokio::fs::write(&settings_path, "[session]\nchip_opt_in = false\n")
            .await
            .unwrap();
        let license = dir.path().join("engine.license");
        tokio::fs::write(&license, b"license").await.unwrap();

        let args = Args {
            settings: Some(settings_path.clone()),
            license: Some(license),
            script: None,
            scenario: Some("Mrz".to_string()),
            recognize: Vec::new(),
            chip: false,
            no_chip: false,
            interactive: false,
            json: false,
            quiet: true,
            verbose: false,
        };

        let ctx = initialize(&args).await.unwrap();
        let snapshot = ctx.session.snapshot();
        assert!(snapshot.ready);
        assert_eq!(snapshot.selected_scenario.as_deref(), Some("Mrz"));
        assert!(!snapshot.chip_option.opted_in);
        // Explicit settings paths are read, never templated over
        assert_eq!(
            tokio::fs::read_to_string(&settings_path).await.unwrap(),
            "[session]\nchip_opt_in = false\n"
        );
        ctx.shutdown().await.unwrap();
    }
}
