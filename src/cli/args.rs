//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for docverify-cli.

use clap::Parser;
use std::path::PathBuf;

/// docverify CLI - run a document verification session against the simulated engine
#[derive(Parser, Debug, Clone)]
#[command(name = "docverify-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Settings file (default: ~/.docverify/settings.toml)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Engine license file (overrides settings)
    #[arg(short = 'l', long, env = "DOCVERIFY_LICENSE")]
    pub license: Option<PathBuf>,

    /// Simulation script (JSON) describing engine behavior
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Scenario to capture with (overrides settings)
    #[arg(short = 's', long)]
    pub scenario: Option<String>,

    /// Recognize these image files instead of scanning
    #[arg(short = 'r', long, num_args = 1..)]
    pub recognize: Vec<PathBuf>,

    /// Read the document chip when available
    #[arg(long, conflicts_with = "no_chip")]
    pub chip: bool,

    /// Never read the document chip
    #[arg(long)]
    pub no_chip: bool,

    /// Interactive mode: issue session commands from stdin
    #[arg(short = 'i', long, conflicts_with = "recognize")]
    pub interactive: bool,

    /// Output session snapshots as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Only output the final result
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    /// Chip opt-in requested on the command line, if any.
    pub fn chip_override(&self) -> Option<bool> {
        if self.chip {
            Some(true)
        } else if self.no_chip {
            Some(false)
        } else {
            None
        }
    }
}
