//! One-shot snapshot: extract whatever the page currently renders.
//!
//! Useful for checking selectors and parsing against a host before
//! committing to a full harvest.

use crate::cli::harvest_cmd::parse_feed_url;
use crate::cli::output::{self, Styled};
use crate::extract::Extractor;
use crate::feed::chromium::{ChromiumFeed, FeedSelectors};
use crate::feed::Feed;
use anyhow::Result;
use chrono::Local;
use std::time::Duration;

pub async fn run(url: &str, headful: bool, ready_timeout_secs: u64) -> Result<()> {
    let target = parse_feed_url(url)?;
    let mut feed = ChromiumFeed::open(target.as_str(), FeedSelectors::default(), !headful).await?;
    if headful && !output::is_quiet() {
        eprintln!("  A browser window is open. Sign in and open the feed, then press Enter.");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
    feed.await_ready(Duration::from_secs(ready_timeout_secs))
        .await?;

    let raw = feed.snapshot().await?;
    let extractor = Extractor::new(Local::now().date_naive());
    let records = extractor.extract(&raw);
    let _ = feed.close().await;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "renderedRows": raw.len(),
            "extracted": records.len(),
            "records": records,
        }));
        return Ok(());
    }

    let styled = Styled::new();
    eprintln!(
        "  {} rendered rows, {} extracted records",
        raw.len(),
        records.len()
    );
    for record in &records {
        println!(
            "  {}  {:>10}  {}",
            styled.cyan(&record.date.to_string()),
            format!("{:.2}", record.amount),
            record.description
        );
    }
    let dropped = raw.len().saturating_sub(records.len());
    if dropped > 0 {
        eprintln!(
            "  {}",
            styled.dim(&format!(
                "{dropped} row(s) dropped, run with --verbose for the reasons"
            ))
        );
    }
    Ok(())
}
