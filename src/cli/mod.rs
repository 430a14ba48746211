//! CLI module for headless verification sessions.
//!
//! The CLI runs the same session core as the Tauri shell against the
//! simulated engine, which makes it usable for scripting and for exercising
//! capture and chip flows without hardware.
//!
//! # Architecture
//!
//! Instead of emitting snapshots to a frontend via Tauri's event system, the
//! CLI runtime sends them through a channel consumed by the output handler.
//!
//! ```text
//! +-----------------+     +-------------+     +---------------+
//! | SessionDriver   | --> | CliRuntime  | --> | output.rs     |
//! | (shared logic)  |     | (emit())    |     | (print/JSON)  |
//! +-----------------+     +-------------+     +---------------+
//! ```

mod args;
mod bootstrap;
mod output;
mod repl;
mod runner;

pub use args::Args;
pub use bootstrap::{initialize, CliContext};
pub use output::{print_summary, run_event_loop};
pub use repl::run_repl;
pub use runner::{execute_capture, execute_from_args};
