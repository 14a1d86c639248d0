// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod cli;
mod detect;
mod engine;
mod export;
mod extract;
mod feed;
mod progress;
mod record;

#[derive(Parser)]
#[command(
    name = "dredge",
    about = "Dredge — incremental collector for lazy-loading ledger feeds",
    version,
    arg_required_else_help = true,
    after_help = "Run 'dredge <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a date window from a live feed page
    Harvest(cli::harvest_cmd::HarvestArgs),
    /// Take one snapshot of a feed page and print what extracts
    Probe {
        /// Feed page URL
        url: String,
        /// Open a visible browser window (for hosts behind a login)
        #[arg(long)]
        headful: bool,
        /// How long to wait for feed rows to appear, in seconds
        #[arg(long, default_value_t = 120)]
        ready_timeout_secs: u64,
    },
    /// Run the engine against a synthetic feed (no browser)
    Simulate(cli::simulate_cmd::SimulateArgs),
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("DREDGE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("DREDGE_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("DREDGE_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("DREDGE_NO_COLOR", "1");
    }

    // Warnings only by default: the progress line owns the terminal during
    // a run, and the summary reports the rest.
    let default_directive = if cli.verbose {
        "dredge=debug"
    } else {
        "dredge=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Harvest(args) => cli::harvest_cmd::run(args).await,
        Commands::Probe {
            url,
            headful,
            ready_timeout_secs,
        } => cli::probe_cmd::run(&url, headful, ready_timeout_secs).await,
        Commands::Simulate(args) => cli::simulate_cmd::run(args).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "dredge", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
