//! CLI output handling - session snapshot receiver loop.
//!
//! Receives session snapshots via the runtime channel and renders them
//! according to output mode (terminal, JSON, or quiet).

use std::io::{self, Write};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::runtime::RuntimeEvent;
use crate::session::{ChipPhase, SessionState, SessionStatus};

/// Run the event loop until the session settles.
///
/// # Arguments
///
/// * `event_rx` - Channel receiver for runtime events
/// * `json_mode` - If true, output snapshots as JSON lines
/// * `quiet_mode` - If true, print nothing while the capture runs
pub async fn run_event_loop(
    mut event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    json_mode: bool,
    quiet_mode: bool,
) -> Result<()> {
    let mut last: Option<Box<SessionState>> = None;

    while let Some(event) = event_rx.recv().await {
        match event {
            RuntimeEvent::SessionUpdated(state) => {
                if json_mode {
                    println!("{}", serde_json::to_string(&state)?);
                    io::stdout().flush()?;
                } else if !quiet_mode {
                    if let Some(line) = describe_change(last.as_deref(), &state) {
                        eprintln!("{}", line);
                    }
                }

                let settled = state.is_settled();
                last = Some(state);
                if settled {
                    break;
                }
            }
            RuntimeEvent::Custom { name, payload } => {
                if json_mode {
                    let json = serde_json::json!({
                        "type": "custom",
                        "name": name,
                        "payload": payload
                    });
                    println!("{}", json);
                }
            }
        }
    }

    Ok(())
}

/// One progress line for the transition from `prev` to `next`, if it is worth showing.
fn describe_change(prev: Option<&SessionState>, next: &SessionState) -> Option<String> {
    let status_changed = prev.map(|p| p.status != next.status).unwrap_or(true);
    let phase_changed = prev.map(|p| p.chip_phase != next.chip_phase).unwrap_or(true);

    match next.status {
        SessionStatus::Capturing if status_changed => {
            Some(format!("[capture] {}", next.headline))
        }
        SessionStatus::ChipReading if next.chip_phase == Some(ChipPhase::RetryPrompt) => {
            phase_changed.then(|| {
                format!(
                    "[chip] {} {} (retry or cancel)",
                    next.chip_status.header, next.chip_status.description
                )
            })
        }
        SessionStatus::ChipReading if status_changed || phase_changed => {
            Some(format!("[chip] {}", next.chip_status.description))
        }
        SessionStatus::ChipReading => {
            let moved = prev.map(|p| p.chip_progress != next.chip_progress).unwrap_or(true);
            (moved && next.chip_progress >= 0.0).then(|| {
                format!(
                    "[chip] {} {}",
                    progress_bar(next.chip_progress, 20),
                    next.chip_status.description
                )
            })
        }
        _ => None,
    }
}

/// Print the settled session as a result block (or one JSON object).
pub fn print_summary(state: &SessionState, json_mode: bool) -> Result<()> {
    if json_mode {
        let summary = serde_json::json!({
            "type": "result",
            "status": state.status,
            "name": state.identity_name,
            "authenticity": state.authenticity,
            "portrait_bytes": state.portrait_image.found().map(|i| i.byte_len),
            "document_image_bytes": state.document_image.found().map(|i| i.byte_len),
            "chip_attempted": state.chip_attempted,
            "error": state.error_info,
        });
        println!("{}", summary);
        io::stdout().flush()?;
        return Ok(());
    }

    if state.status == SessionStatus::Failed {
        let detail = state
            .error_info
            .as_ref()
            .map(|e| e.detail.as_str())
            .unwrap_or("unknown error");
        println!("Capture failed: {}", detail);
        return Ok(());
    }

    println!("Name:           {}", state.headline);
    if let Some(authenticity) = &state.authenticity {
        println!("Authenticity:   {}", authenticity.message);
        if !authenticity.failed_features.is_empty() {
            println!(
                "Failed checks:  {}",
                truncate(&authenticity.failed_features.join(", "), 60)
            );
        }
    }
    println!("Portrait:       {}", image_line(state.portrait_image.found()));
    println!("Document image: {}", image_line(state.document_image.found()));
    if state.chip_attempted {
        let chip = match &state.error_info {
            Some(e) => format!("failed ({})", truncate(&e.detail, 50)),
            None => "read".to_string(),
        };
        println!("Chip:           {}", chip);
    }
    for error in &state.extraction_errors {
        eprintln!("[warn] {}", error);
    }
    Ok(())
}

fn image_line(image: Option<&crate::results::ImageRef>) -> String {
    match image {
        Some(image) => format!("{} bytes", image.byte_len),
        None => "not found".to_string(),
    }
}

fn progress_bar(fraction: f64, width: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * width as f64).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        (fraction * 100.0).round() as u32
    )
}

/// Truncate a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
