//! TOML-based settings.
//!
//! Settings are loaded from `~/.docverify/settings.toml` (or a path given on
//! the command line) with environment variable interpolation support.
//!
//! # Usage
//!
//! ```rust,ignore
//! use docverify::settings::{load_license, license_path, SettingsManager};
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//!
//! let config = settings.session_config();
//! if let Some(path) = license_path(None, &settings) {
//!     let license = load_license(&path).await?;
//! }
//! ```

pub mod loader;
pub mod schema;

pub use loader::{license_path, load_license, settings_path, SettingsManager, LICENSE_ENV};
pub use schema::VerifierSettings;
