//! docverify CLI - headless verification sessions
//!
//! # Usage
//!
//! ```bash
//! # Scan with the built-in demo engine
//! ./target/debug/docverify-cli
//!
//! # Recognize gallery images and read the chip
//! ./target/debug/docverify-cli -r front.jpg back.jpg --chip
//!
//! # Play back a scripted engine, JSON lines for scripting
//! ./target/debug/docverify-cli --script chip-error.json --json | jq .
//!
//! # Interactive mode
//! ./target/debug/docverify-cli -i
//! ```
//!
//! This binary requires the `cli` feature flag and is mutually exclusive
//! with the `tauri` feature.

use anyhow::Result;
use clap::Parser;

use docverify::cli::{execute_from_args, initialize, run_repl, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut ctx = initialize(&args).await?;

    let result = if args.interactive {
        run_repl(&mut ctx).await
    } else {
        execute_from_args(&mut ctx).await
    };

    ctx.shutdown().await?;

    result
}
