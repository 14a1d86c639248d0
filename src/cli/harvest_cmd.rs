// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Full harvest run against a live feed page.

use crate::cli::output::{self, Styled};
use crate::cli::progress_line;
use crate::engine::{CancelFlag, EngineTuning, Harvester, HarvestOutcome, StopReason};
use crate::export::{self, ExportFormat, RunMetadata, StructuredExport};
use crate::feed::chromium::{ChromiumFeed, FeedSelectors};
use crate::progress::{self, human_duration};
use crate::record::DateWindow;
use anyhow::{bail, Context, Result};
use chrono::{Datelike, Days, Local, NaiveDate, Utc};
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Args)]
pub struct HarvestArgs {
    /// Feed page URL
    pub url: String,

    /// Newest date to include, yyyy-mm-dd (default: tomorrow)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Oldest date to include, yyyy-mm-dd (default: January 1 of this year)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Output format (json, csv)
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Include an income/spending stats block (json format only)
    #[arg(long)]
    pub stats: bool,

    /// Artifact file name prefix
    #[arg(long, default_value = "transactions")]
    pub name: String,

    /// Free-form category recorded in the artifact
    #[arg(long, default_value = "")]
    pub category: String,

    /// Free-form source label recorded in the artifact
    #[arg(long, default_value = "")]
    pub label: String,

    /// Output directory
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Maximum load requests before giving up
    #[arg(long, default_value_t = 200)]
    pub max_loads: u32,

    /// Primary change-wait timeout in milliseconds
    #[arg(long, default_value_t = 4500)]
    pub change_timeout_ms: u64,

    /// Open a visible browser window (for hosts behind a login)
    #[arg(long)]
    pub headful: bool,

    /// How long to wait for feed rows to appear, in seconds
    #[arg(long, default_value_t = 120)]
    pub ready_timeout_secs: u64,
}

pub async fn run(args: HarvestArgs) -> Result<()> {
    let format = parse_format(&args.format)?;
    let target = parse_feed_url(&args.url)?;
    let today = Local::now().date_naive();
    let start = args.start.unwrap_or_else(|| default_start(today));
    let end = args.end.unwrap_or_else(|| default_end(today));
    if end > start {
        bail!("--end {end} is newer than --start {start}");
    }
    let window = DateWindow::new(start, end);

    let mut feed =
        ChromiumFeed::open(target.as_str(), FeedSelectors::default(), !args.headful).await?;
    if args.headful && !output::is_quiet() {
        eprintln!("  A browser window is open. Sign in and open the feed, then press Enter.");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
    feed.await_ready(Duration::from_secs(args.ready_timeout_secs))
        .await?;

    let tuning = EngineTuning {
        max_load_requests: args.max_loads,
        change_timeout: Duration::from_millis(args.change_timeout_ms),
        ..EngineTuning::default()
    };
    let cancel = CancelFlag::new();
    watch_for_interrupt(cancel.clone());

    let (events, display_rx) = progress::channel();
    let display = progress_line::spawn(display_rx);

    let outcome = Harvester::new(window, today)
        .with_tuning(tuning)
        .with_cancel(cancel)
        .with_progress(events)
        .run(&mut feed)
        .await;
    let _ = display.await;
    let _ = feed.close().await;

    let metadata = RunMetadata {
        category: args.category,
        source_label: args.label,
        origin_location: args.url,
        collect_stats: args.stats,
    };
    let artifact = StructuredExport::from_run(&outcome, window, &metadata, Utc::now());
    let body = export::render(format, &artifact)?;
    let file_name = export::artifact_name(&args.name, today, format);
    let path = export::write_artifact(&args.out, &file_name, &body)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "reason": outcome.reason.to_string(),
            "retained": outcome.records.len(),
            "uniqueSeen": outcome.unique_seen,
            "cycles": outcome.cycles,
            "loadRequests": outcome.load_requests,
            "artifact": path.display().to_string(),
        }));
    } else if !output::is_quiet() {
        print_summary(&Styled::new(), &outcome, &path);
    }
    Ok(())
}

/// The window's newer edge defaults to tomorrow so records landing today
/// are always inside it.
fn default_start(today: NaiveDate) -> NaiveDate {
    today.checked_add_days(Days::new(1)).unwrap_or(today)
}

fn default_end(today: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today)
}

pub(crate) fn parse_format(text: &str) -> Result<ExportFormat> {
    match text {
        "json" => Ok(ExportFormat::Structured),
        "csv" => Ok(ExportFormat::Tabular),
        other => bail!("unsupported format '{other}' (expected json or csv)"),
    }
}

/// Reject a malformed target before paying for a browser launch. `file` and
/// `data` URLs are allowed for probing local fixture pages.
pub(crate) fn parse_feed_url(text: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(text).with_context(|| format!("invalid feed URL '{text}'"))?;
    match parsed.scheme() {
        "http" | "https" | "file" | "data" => Ok(parsed),
        other => bail!("unsupported URL scheme '{other}' in '{text}'"),
    }
}

/// First Ctrl-C cancels cooperatively at the next engine check point.
fn watch_for_interrupt(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if !output::is_quiet() {
                eprintln!("  interrupt received, finishing the current cycle");
            }
            cancel.cancel();
        }
    });
}

fn print_summary(styled: &Styled, outcome: &HarvestOutcome, path: &Path) {
    let headline = match outcome.reason {
        StopReason::WindowCovered => styled.green("window covered"),
        StopReason::BudgetExhausted => styled.yellow("load budget exhausted"),
        StopReason::Stalled => styled.yellow("stalled"),
        StopReason::Cancelled => styled.red("cancelled"),
    };
    eprintln!();
    eprintln!(
        "  {} {headline} {}",
        styled.bold("Harvest:"),
        styled.dim(&format!("({})", outcome.reason.explain()))
    );
    eprintln!(
        "  {} records retained, {} unique seen, {} cycles in {}",
        outcome.records.len(),
        outcome.unique_seen,
        outcome.cycles,
        human_duration(outcome.elapsed)
    );
    if let (Some(newest), Some(oldest)) = (outcome.bounds.newest, outcome.bounds.oldest) {
        eprintln!("  scanned {newest} back to {oldest}");
    }
    eprintln!("  wrote {}", path.display());
}
