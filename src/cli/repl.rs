//! Lightweight REPL for docverify-cli.
//!
//! Provides an interactive mode (`-i`) where session operations are typed
//! one per line:
//! - `scan` - optical capture with the camera
//! - `recognize <file>...` - recognize image files
//! - `scenario <name>` / `scenarios` - select or list scenarios
//! - `chip on|off` - toggle the chip read
//! - `retry` / `cancel` - answer a chip-read prompt
//! - `status` - print the current result
//! - `/quit`, `/exit`, `/q` - exit

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;

use crate::engine::CaptureMode;

use super::bootstrap::CliContext;
use super::output::print_summary;
use super::runner::{cancel_chip_read, execute_capture, load_images, retry_chip_read};

/// REPL command variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Quit,
    Help,
    Scan,
    Recognize(Vec<PathBuf>),
    Scenario(String),
    Scenarios,
    Chip(bool),
    Retry,
    Cancel,
    Status,
    /// Unknown command (will show help)
    Unknown(String),
    /// Empty input (skip)
    Empty,
}

impl ReplCommand {
    /// Parse user input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }

        let mut words = trimmed.split_whitespace();
        let command = words.next().unwrap_or_default().to_lowercase();
        let rest: Vec<&str> = words.collect();

        match (command.as_str(), rest.as_slice()) {
            ("/quit" | "/exit" | "/q", []) => ReplCommand::Quit,
            ("help" | "/help" | "?", []) => ReplCommand::Help,
            ("scan", []) => ReplCommand::Scan,
            ("recognize", files) if !files.is_empty() => {
                ReplCommand::Recognize(files.iter().map(PathBuf::from).collect())
            }
            ("scenario", [name]) => ReplCommand::Scenario((*name).to_string()),
            ("scenarios", []) => ReplCommand::Scenarios,
            ("chip", [toggle]) => match toggle.to_lowercase().as_str() {
                "on" | "true" | "yes" => ReplCommand::Chip(true),
                "off" | "false" | "no" => ReplCommand::Chip(false),
                _ => ReplCommand::Unknown(trimmed.to_string()),
            },
            ("retry", []) => ReplCommand::Retry,
            ("cancel", []) => ReplCommand::Cancel,
            ("status", []) => ReplCommand::Status,
            _ => ReplCommand::Unknown(trimmed.to_string()),
        }
    }
}

const HELP: &str = "Commands: scan | recognize <file>... | scenario <name> | scenarios | \
chip on|off | retry | cancel | status | /quit";

/// Run an interactive REPL session.
///
/// Returns when the user exits or on EOF (Ctrl+D).
pub async fn run_repl(ctx: &mut CliContext) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    eprintln!("docverify-cli interactive mode");
    eprintln!("{}\n", HELP);

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            eprintln!("\nGoodbye!");
            break;
        }

        let command = ReplCommand::parse(&input);
        if command == ReplCommand::Quit {
            eprintln!("Goodbye!");
            break;
        }
        if let Err(e) = handle_command(ctx, command).await {
            eprintln!("Error: {:#}", e);
        }
    }

    Ok(())
}

async fn handle_command(ctx: &mut CliContext, command: ReplCommand) -> Result<()> {
    let json = ctx.args.json;
    match command {
        ReplCommand::Empty | ReplCommand::Quit => {}
        ReplCommand::Help => eprintln!("{}", HELP),
        ReplCommand::Unknown(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            eprintln!("{}", HELP);
        }
        ReplCommand::Scan => {
            let snapshot = execute_capture(ctx, CaptureMode::Scan, Vec::new()).await?;
            print_summary(&snapshot, json)?;
        }
        ReplCommand::Recognize(files) => {
            let images = load_images(&files).await?;
            let snapshot = execute_capture(ctx, CaptureMode::Recognize, images).await?;
            print_summary(&snapshot, json)?;
        }
        ReplCommand::Scenario(name) => {
            ctx.session.select_scenario(name).await?;
        }
        ReplCommand::Scenarios => {
            let snapshot = ctx.session.snapshot();
            for name in &snapshot.scenarios {
                let marker = if snapshot.selected_scenario.as_ref() == Some(name) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, name);
            }
        }
        ReplCommand::Chip(enabled) => {
            ctx.session.set_chip_opt_in(enabled).await?;
            eprintln!("{}: {}", ctx.session.snapshot().chip_option.label(), enabled);
        }
        ReplCommand::Retry => {
            let snapshot = retry_chip_read(ctx).await?;
            print_summary(&snapshot, json)?;
        }
        ReplCommand::Cancel => {
            let snapshot = cancel_chip_read(ctx).await?;
            print_summary(&snapshot, json)?;
        }
        ReplCommand::Status => {
            let snapshot = ctx.session.snapshot();
            if snapshot.is_settled() {
                print_summary(&snapshot, json)?;
            } else {
                eprintln!("{:?}: {}", snapshot.status, snapshot.headline);
            }
        }
    }
    Ok(())
}
