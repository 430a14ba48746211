//! Settings schema definitions for docverify configuration.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::engine::ChipReadOptions;
use crate::policy::ChipFailureAction;
use crate::session::SessionConfig;

/// Root settings structure.
///
/// Loaded from `~/.docverify/settings.toml` with environment variable interpolation support.
/// Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Engine license
    pub license: LicenseSettings,

    /// Session behavior
    pub session: SessionSettings,

    /// Capture limits
    pub capture: CaptureSettings,

    /// Logging settings
    pub logging: LoggingSettings,
}

/// License file location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LicenseSettings {
    /// Path to the engine license file (supports $ENV_VAR)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Scenario selected after initialization; falls back to the first listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_scenario: Option<String>,

    /// Initial state of the chip-read toggle
    pub chip_opt_in: bool,

    /// What happens when a chip read fails: "present" | "retry_prompt"
    pub chip_failure: ChipFailureAction,

    /// Mirror chip progress into the engine's native chip prompt
    pub mirror_chip_status: bool,

    /// Skip data groups the session does not display
    pub chip_skip_portrait: bool,
    pub chip_skip_authentication: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Maximum number of gallery images per recognize request
    pub max_gallery_images: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default tracing filter when RUST_LOG is unset
    pub filter: String,
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            version: 1,
            license: LicenseSettings::default(),
            session: SessionSettings::default(),
            capture: CaptureSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_scenario: None,
            chip_opt_in: true,
            chip_failure: ChipFailureAction::Present,
            mirror_chip_status: false,
            chip_skip_portrait: false,
            chip_skip_authentication: false,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_gallery_images: 10,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "docverify=info".to_string(),
        }
    }
}

impl VerifierSettings {
    /// Session configuration derived from these settings.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chip_failure: self.session.chip_failure,
            mirror_chip_status: self.session.mirror_chip_status,
            max_gallery_images: self.capture.max_gallery_images,
            chip_read: ChipReadOptions {
                skip_portrait: self.session.chip_skip_portrait,
                skip_document_data: false,
                skip_authentication: self.session.chip_skip_authentication,
            },
            default_scenario: self.session.default_scenario.clone(),
            chip_opt_in: self.session.chip_opt_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = VerifierSettings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.license.path.is_none());
        assert!(settings.session.chip_opt_in);
        assert_eq!(settings.session.chip_failure, ChipFailureAction::Present);
        assert_eq!(settings.capture.max_gallery_images, 10);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            version = 1
            [session]
            chip_failure = "retry_prompt"
        "#;

        let settings: VerifierSettings = toml::from_str(toml).unwrap();
        assert_eq!(settings.session.chip_failure, ChipFailureAction::RetryPrompt);
        // Defaults should fill in missing fields
        assert!(settings.session.chip_opt_in);
        assert_eq!(settings.capture.max_gallery_images, 10);
    }

    #[test]
    fn test_session_config_mapping() {
        let mut settings = VerifierSettings::default();
        settings.session.default_scenario = Some("Mrz".to_string());
        settings.session.chip_skip_portrait = true;
        settings.capture.max_gallery_images = 3;

        let config = settings.session_config();
        assert_eq!(config.default_scenario.as_deref(), Some("Mrz"));
        assert!(config.chip_read.skip_portrait);
        assert!(!config.chip_read.skip_authentication);
        assert_eq!(config.max_gallery_images, 3);
        assert!(config.chip_opt_in);
    }

    #[test]
    fn test_serialize_settings() {
        let settings = VerifierSettings::default();
        let toml_str = toml::to_string_pretty(&settings).unwrap();
        assert!(toml_str.contains("version = 1"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("chip_failure = \"present\""));
    }
}
