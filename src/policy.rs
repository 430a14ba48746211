//! Chip-read policy.
//!
//! Decides whether a contactless chip read must follow a successful optical
//! capture, and owns the cached capability probe result.

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::engine::{Capability, DocumentEngine, EngineError};
use crate::results::ResultBundle;

/// A chip read is required only when the user asked for it, a reader is
/// physically present, and the bundle marks chip data as expected.
pub fn chip_read_required(
    bundle: &ResultBundle,
    user_opted_in: bool,
    chip_available_physically: bool,
) -> bool {
    if !chip_available_physically {
        return false;
    }
    user_opted_in && bundle.chip_data_expected()
}

/// What to do when the chip phase ends in Cancelled or Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipFailureAction {
    /// End the chip phase and present the optical results
    #[default]
    Present,
    /// Stay in the chip flow showing a retry prompt until the user retries or cancels
    RetryPrompt,
}

/// Process-lifetime cache of the engine capability probe.
///
/// The probe is an async engine call, so it runs once during initialization.
/// A failed probe is not cached; the next initialization attempt probes again.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    cell: OnceCell<Capability>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_probe(&self, engine: &dyn DocumentEngine) -> Result<Capability, EngineError> {
        let capability = self
            .cell
            .get_or_try_init(|| async {
                tracing::debug!("Probing engine capability");
                engine.probe_capability().await
            })
            .await?;
        Ok(*capability)
    }

    pub fn get(&self) -> Option<Capability> {
        self.cell.get().copied()
    }

    /// `false` until a probe has succeeded.
    pub fn chip_available(&self) -> bool {
        self.get().map(|c| c.chip_available).unwrap_or(false)
    }
}
