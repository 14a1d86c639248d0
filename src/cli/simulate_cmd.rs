//! Run the full engine against a synthetic feed, no browser required.
//!
//! Exercises the whole pipeline (rendering quirks, dedup, virtualization,
//! stall recovery) against a known ledger, and reports retained counts
//! against the ground truth.

use crate::cli::output::{self, Styled};
use crate::cli::progress_line;
use crate::engine::{EngineTuning, Harvester};
use crate::export::{self, ExportFormat, RunMetadata, StructuredExport};
use crate::feed::sim::{SimFeedConfig, SimulatedFeed};
use crate::feed::Feed;
use crate::progress::{self, human_duration};
use crate::record::DateWindow;
use anyhow::{bail, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Newest ledger date, yyyy-mm-dd (default: today)
    #[arg(long)]
    pub newest: Option<NaiveDate>,

    /// Ledger depth in days
    #[arg(long, default_value_t = 120)]
    pub days: u32,

    /// Maximum records per ledger day
    #[arg(long, default_value_t = 3)]
    pub per_day: u32,

    /// Rows rendered before the first load request
    #[arg(long, default_value_t = 30)]
    pub initial: usize,

    /// Rows appended per load request
    #[arg(long, default_value_t = 25)]
    pub per_load: usize,

    /// Rendered-row cap (virtualization window)
    #[arg(long, default_value_t = 150)]
    pub render_cap: usize,

    /// Append latency in milliseconds
    #[arg(long, default_value_t = 150)]
    pub latency_ms: u64,

    /// Drop every Nth load trigger to exercise the nudge recovery
    #[arg(long)]
    pub drop_every: Option<u32>,

    /// Ledger seed
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Newest date to include (default: the newest ledger date)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Oldest date to include (default: the oldest ledger date, which ends
    /// the run in a stall at the bottom of the feed)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Output format (json, csv)
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Include an income/spending stats block (json format only)
    #[arg(long)]
    pub stats: bool,

    /// Artifact file name prefix
    #[arg(long, default_value = "simulated")]
    pub name: String,

    /// Output directory
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Skip writing an artifact
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: SimulateArgs) -> Result<()> {
    let format = crate::cli::harvest_cmd::parse_format(&args.format)?;
    let newest = args.newest.unwrap_or_else(|| Local::now().date_naive());
    let config = SimFeedConfig {
        newest,
        ledger_days: args.days,
        max_per_day: args.per_day,
        initial_items: args.initial,
        items_per_load: args.per_load,
        render_cap: args.render_cap,
        append_latency: Duration::from_millis(args.latency_ms),
        drop_every: args.drop_every,
        seed: args.seed,
    };
    let mut feed = SimulatedFeed::new(config);
    let truth = feed.ground_truth();
    let oldest_ledger = truth.last().map(|r| r.date).unwrap_or(newest);

    let start = args.start.unwrap_or(newest);
    let end = args.end.unwrap_or(oldest_ledger);
    if end > start {
        bail!("--end {end} is newer than --start {start}");
    }
    let window = DateWindow::new(start, end);
    let expected = truth.iter().filter(|r| window.contains(r.date)).count();

    let (events, display_rx) = progress::channel();
    let display = progress_line::spawn(display_rx);

    // The ledger's newest day renders as a relative phrase, so extraction
    // is anchored there rather than at the wall clock.
    let outcome = Harvester::new(window, newest)
        .with_tuning(EngineTuning::default())
        .with_progress(events)
        .run(&mut feed)
        .await;
    let _ = display.await;

    let mut artifact_path = None;
    if !args.dry_run {
        let metadata = RunMetadata {
            category: "simulation".to_string(),
            source_label: feed.describe(),
            origin_location: String::new(),
            collect_stats: args.stats,
        };
        let artifact = StructuredExport::from_run(&outcome, window, &metadata, Utc::now());
        let body = export::render(format, &artifact)?;
        let file_name = export::artifact_name(&args.name, newest, format);
        artifact_path = Some(export::write_artifact(&args.out, &file_name, &body)?);
    }

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "reason": outcome.reason.to_string(),
            "retained": outcome.records.len(),
            "expectedInWindow": expected,
            "uniqueSeen": outcome.unique_seen,
            "cycles": outcome.cycles,
            "loadRequests": outcome.load_requests,
            "artifact": artifact_path.as_ref().map(|p| p.display().to_string()),
        }));
    } else if !output::is_quiet() {
        let styled = Styled::new();
        eprintln!();
        eprintln!(
            "  {} {} {}",
            styled.bold("Simulation:"),
            styled.green(&outcome.reason.to_string()),
            styled.dim(&format!("({})", outcome.reason.explain()))
        );
        eprintln!(
            "  retained {}/{} in-window ledger records over {} cycles in {}",
            outcome.records.len(),
            expected,
            outcome.cycles,
            human_duration(outcome.elapsed)
        );
        if let Some(path) = &artifact_path {
            eprintln!("  wrote {}", path.display());
        }
    }
    Ok(())
}
