//! CLI execution runner.
//!
//! Drives session operations and renders their progress until the session
//! settles.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::CaptureMode;
use crate::runtime::{CliRuntime, RuntimeEvent};
use crate::session::{ChipPhase, SessionHandle, SessionSnapshot, SessionStatus};

use super::bootstrap::CliContext;
use super::output::{print_summary, run_event_loop};

/// Run the capture described by the command-line arguments and print the result.
pub async fn execute_from_args(ctx: &mut CliContext) -> Result<()> {
    let (mode, images) = if ctx.args.recognize.is_empty() {
        (CaptureMode::Scan, Vec::new())
    } else {
        (CaptureMode::Recognize, load_images(&ctx.args.recognize).await?)
    };

    let mut snapshot = execute_capture(ctx, mode, images).await?;

    // Nobody to answer the retry prompt: fall back to the optical results
    if snapshot.chip_phase == Some(ChipPhase::RetryPrompt) {
        tracing::info!("Chip read failed in non-interactive mode, presenting optical results");
        snapshot = run_step(ctx, |session| async move { session.cancel_chip_read().await }).await?;
    }

    print_summary(&snapshot, ctx.args.json)?;

    if snapshot.status == SessionStatus::Failed {
        let detail = snapshot
            .error_info
            .as_ref()
            .map(|e| e.detail.clone())
            .unwrap_or_default();
        anyhow::bail!("Capture failed: {}", detail);
    }
    Ok(())
}

/// Start a capture and wait for the session to settle.
pub async fn execute_capture(
    ctx: &mut CliContext,
    mode: CaptureMode,
    images: Vec<String>,
) -> Result<SessionSnapshot> {
    run_step(ctx, move |session| async move {
        session.start_capture(mode, images).await
    })
    .await
}

pub async fn retry_chip_read(ctx: &mut CliContext) -> Result<SessionSnapshot> {
    run_step(ctx, |session| async move { session.retry_chip_read().await }).await
}

pub async fn cancel_chip_read(ctx: &mut CliContext) -> Result<SessionSnapshot> {
    run_step(ctx, |session| async move { session.cancel_chip_read().await }).await
}

/// Run one state-changing operation with a fresh output channel and wait
/// until the session settles.
async fn run_step<F, Fut>(ctx: &mut CliContext, op: F) -> Result<SessionSnapshot>
where
    F: FnOnce(SessionHandle) -> Fut,
    Fut: Future<Output = crate::error::Result<()>>,
{
    // Create a fresh channel for this operation
    let (event_tx, event_rx) = mpsc::unbounded_channel::<RuntimeEvent>();

    // Downcast to CliRuntime to access replace_event_tx
    if let Some(cli_runtime) = ctx.runtime.as_any().downcast_ref::<CliRuntime>() {
        cli_runtime.replace_event_tx(event_tx);
    } else {
        tracing::warn!("Runtime is not CliRuntime, events may not be received");
    }

    let json_mode = ctx.args.json;
    let quiet_mode = ctx.args.quiet;
    let output_handle: JoinHandle<Result<()>> =
        tokio::spawn(async move { run_event_loop(event_rx, json_mode, quiet_mode).await });

    if let Err(e) = op(ctx.session.clone()).await {
        output_handle.abort();
        return Err(e.into());
    }

    // The output handler exits once the session settles
    match output_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!("Output handler error: {}", e);
        }
        Err(e) => {
            tracing::warn!("Output handler panicked: {}", e);
        }
    }

    Ok(ctx.session.snapshot())
}

/// Read image files and base64-encode them for a recognize request.
pub async fn load_images(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        images.push(STANDARD.encode(bytes));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_images_encodes_each_file() {
        let dir = TempDir::new().unwrap();
        let front = dir.path().join("front.jpg");
        let back = dir.path().join("back.jpg");
        tokio::fs::write(&front, b"hello").await.unwrap();
        tokio::fs::write(&back, b"").await.unwrap();

        let images = load_images(&[front, back]).await.unwrap();
        assert_eq!(images, vec!["aGVsbG8=".to_string(), String::new()]);
    }

    #[tokio::test]
    async fn test_load_images_missing_file() {
        let err = load_images(&[PathBuf::from("/nonexistent/front.jpg")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("front.jpg"));
    }
}
