//! Settings loading, saving, and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.docverify/settings.toml` or an explicit path
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - Atomic file writes with temp file + rename
//! - First-run template generation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::RwLock;

use super::schema::VerifierSettings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Environment variable consulted when no license path is configured.
pub const LICENSE_ENV: &str = "DOCVERIFY_LICENSE";

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docverify")
        .join("settings.toml")
}

/// Manages settings loading, interpolation, and persistence.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: RwLock<VerifierSettings>,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager, loading from the global path if present.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Create a SettingsManager backed by `path`.
    pub async fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    async fn load_from_path(path: &Path) -> Result<VerifierSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(VerifierSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let mut settings: VerifierSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        Self::resolve_env_vars(&mut settings);

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references in string fields.
    fn resolve_env_vars(settings: &mut VerifierSettings) {
        fn resolve_opt(value: &mut Option<String>) {
            if let Some(v) = value {
                if let Some(resolved) = resolve_env_ref(v) {
                    *v = resolved;
                }
            }
        }

        resolve_opt(&mut settings.license.path);
        resolve_opt(&mut settings.session.default_scenario);
    }

    /// Get the current settings (read-only).
    pub async fn get(&self) -> VerifierSettings {
        self.settings.read().await.clone()
    }

    /// Update settings and persist to disk.
    pub async fn update(&self, new_settings: VerifierSettings) -> Result<()> {
        *self.settings.write().await = new_settings.clone();

        let toml_string =
            toml::to_string_pretty(&new_settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, &toml_string).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::info!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Reset to defaults and persist.
    pub async fn reset(&self) -> Result<()> {
        self.update(VerifierSettings::default()).await
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let name = trimmed.strip_prefix('$')?;
    let name = name
        .strip_prefix('{')
        .and_then(|n| n.strip_suffix('}'))
        .unwrap_or(name);
    std::env::var(name).ok()
}

/// Pick the license path: explicit override, then settings, then `$DOCVERIFY_LICENSE`.
pub fn license_path(explicit: Option<&Path>, settings: &VerifierSettings) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = settings.license.path.as_deref().filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    std::env::var(LICENSE_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Read a license file and return it base64-encoded, as the engine expects.
pub async fn load_license(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read license file {:?}", path))?;
    if bytes.is_empty() {
        anyhow::bail!("License file {:?} is empty", path);
    }
    tracing::debug!("Loaded license ({} bytes) from {:?}", bytes.len(), path);
    Ok(STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ChipFailureAction;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_env_ref_dollar_format() {
        std::env::set_var("DOCVERIFY_TEST_VAR_1", "test_value_1");

        assert_eq!(
            resolve_env_ref("$DOCVERIFY_TEST_VAR_1"),
            Some("test_value_1".to_string())
        );

        std::env::remove_var("DOCVERIFY_TEST_VAR_1");
    }

    #[test]
    fn test_resolve_env_ref_braces_format() {
        std::env::set_var("DOCVERIFY_TEST_VAR_2", "test_value_2");

        assert_eq!(
            resolve_env_ref("${DOCVERIFY_TEST_VAR_2}"),
            Some("test_value_2".to_string())
        );

        std::env::remove_var("DOCVERIFY_TEST_VAR_2");
    }

    #[test]
    fn test_resolve_env_ref_no_match() {
        assert_eq!(resolve_env_ref("regular_value"), None);
        assert_eq!(resolve_env_ref("$NONEXISTENT_VAR_XYZ_12345"), None);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("settings.toml"))
            .await
            .unwrap();
        assert!(!manager.exists());
        assert_eq!(manager.get().await.version, 1);
    }

    #[tokio::test]
    async fn test_template_parses_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("nested").join("settings.toml"))
            .await
            .unwrap();

        assert!(manager.ensure_settings_file().await.unwrap());
        assert!(!manager.ensure_settings_file().await.unwrap());

        manager.reload().await.unwrap();
        let settings = manager.get().await;
        assert_eq!(settings.session.chip_failure, ChipFailureAction::Present);
        assert_eq!(settings.capture.max_gallery_images, 10);
        assert!(settings.license.path.is_none());
    }

    #[tokio::test]
    async fn test_update_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        let mut settings = manager.get().await;
        settings.session.chip_failure = ChipFailureAction::RetryPrompt;
        settings.session.default_scenario = Some("Mrz".to_string());
        manager.update(settings).await.unwrap();

        assert!(!path.with_extension("toml.tmp").exists());

        let reloaded = SettingsManager::with_path(&path).await.unwrap().get().await;
        assert_eq!(reloaded.session.chip_failure, ChipFailureAction::RetryPrompt);
        assert_eq!(reloaded.session.default_scenario.as_deref(), Some("Mrz"));
    }

    #[tokio::test]
    async fn test_license_path_resolved_from_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        tokio::fs::write(&path, "[license]\npath = \"$DOCVERIFY_TEST_LICENSE_PATH\"\n")
            .await
            .unwrap();
        std::env::set_var("DOCVERIFY_TEST_LICENSE_PATH", "/opt/engine.license");

        let settings = SettingsManager::with_path(&path).await.unwrap().get().await;
        assert_eq!(settings.license.path.as_deref(), Some("/opt/engine.license"));

        std::env::remove_var("DOCVERIFY_TEST_LICENSE_PATH");
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        tokio::fs::write(&path, "[session\nchip_opt_in = ").await.unwrap();
        assert!(SettingsManager::with_path(&path).await.is_err());
    }

    #[test]
    fn test_explicit_license_path_wins() {
        let mut settings = VerifierSettings::default();
        settings.license.path = Some("/from/settings".to_string());

        let explicit = PathBuf::from("/from/cli");
        assert_eq!(
            license_path(Some(&explicit), &settings),
            Some(PathBuf::from("/from/cli"))
        );
        assert_eq!(
            license_path(None, &settings),
            Some(PathBuf::from("/from/settings"))
        );
    }

    #[tokio::test]
    async fn test_load_license_encodes_base64() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.license");
        tokio::fs::write(&path, b"license").await.unwrap();

        assert_eq!(load_license(&path).await.unwrap(), "bGljZW5zZQ==");

        tokio::fs::write(&path, b"").await.unwrap();
        assert!(load_license(&path).await.is_err());
        assert!(load_license(&dir.path().join("missing")).await.is_err());
    }
}
