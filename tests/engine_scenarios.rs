//! Harvest engine scenario tests.
//!
//! Drives the engine against a scripted feed with per-cycle pages and
//! canned change responses, then against the simulated feed end to end:
//! - termination on each stop reason (window covered, budget, stall, cancel)
//! - dedup and first-seen ordering across overlapping pages
//! - the nudge path and its retry accounting
//! - empty-page and malformed-row degradation
//! - the progress event stream
//!
//! All tests run on a paused clock, so the engine's settle and backoff
//! delays cost no wall time.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use dredge::engine::{CancelFlag, EngineTuning, Harvester, StopReason};
use dredge::extract::RawItem;
use dredge::feed::sim::{SimFeedConfig, SimulatedFeed};
use dredge::feed::Feed;
use dredge::progress::{self, HarvestEventKind};
use dredge::record::DateWindow;

// ── Scripted Feed ──

/// A feed that serves one scripted page per cycle and answers change waits
/// from a canned list. The last page repeats once the script runs out, and
/// change responses default to `false`, which is how a feed looks once it
/// has nothing more to give.
struct ScriptedFeed {
    pages: Vec<Vec<RawItem>>,
    served: usize,
    changes: VecDeque<bool>,
    loads: usize,
    nudges: usize,
    cancel_after_loads: Option<(usize, CancelFlag)>,
}

impl ScriptedFeed {
    fn new(pages: Vec<Vec<RawItem>>) -> Self {
        Self {
            pages,
            served: 0,
            changes: VecDeque::new(),
            loads: 0,
            nudges: 0,
            cancel_after_loads: None,
        }
    }

    fn with_changes(mut self, changes: &[bool]) -> Self {
        self.changes = changes.iter().copied().collect();
        self
    }

    /// Trip `flag` from inside the Nth load request, as an interrupt
    /// arriving mid-run would.
    fn cancel_after_loads(mut self, loads: usize, flag: CancelFlag) -> Self {
        self.cancel_after_loads = Some((loads, flag));
        self
    }
}

#[async_trait]
impl Feed for ScriptedFeed {
    fn describe(&self) -> String {
        "scripted feed".to_string()
    }

    async fn snapshot(&mut self) -> Result<Vec<RawItem>> {
        let index = self.served.min(self.pages.len() - 1);
        self.served += 1;
        Ok(self.pages[index].clone())
    }

    async fn request_more(&mut self) -> Result<()> {
        self.loads += 1;
        if let Some((at, flag)) = &self.cancel_after_loads {
            if self.loads == *at {
                flag.cancel();
            }
        }
        Ok(())
    }

    async fn nudge(&mut self) -> Result<()> {
        self.nudges += 1;
        Ok(())
    }

    async fn await_change(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(self.changes.pop_front().unwrap_or(false))
    }
}

// ── Fixtures ──

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn row(date: &str, description: &str, amount: &str) -> RawItem {
    RawItem::new(date, description, amount)
}

/// Ten distinct rows, 1 through 10 March 2024.
fn march_page() -> Vec<RawItem> {
    (1..=10)
        .map(|day| {
            row(
                &format!("{day} maart 2024"),
                &format!("Pinbetaling automaat {day:02}"),
                "-12,50",
            )
        })
        .collect()
}

fn fast_tuning() -> EngineTuning {
    EngineTuning {
        max_load_requests: 50,
        max_no_progress_retries: 3,
        change_timeout: Duration::from_millis(50),
        nudge_timeout: Duration::from_millis(30),
        settle_delay: Duration::from_millis(5),
        nudge_settle: Duration::from_millis(5),
        backoff_delay: Duration::from_millis(5),
    }
}

fn march_window() -> DateWindow {
    DateWindow::new(d(2024, 3, 10), d(2024, 1, 1))
}

// ── Termination ──

#[tokio::test(start_paused = true)]
async fn test_stalls_after_repeated_no_change_cycles() {
    let mut feed = ScriptedFeed::new(vec![march_page()]);
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::Stalled);
    assert_eq!(outcome.cycles, 3);
    assert_eq!(outcome.load_requests, 3);
    assert_eq!(feed.nudges, 3);
    // The same page re-snapshotted three times still yields each row once.
    assert_eq!(outcome.records.len(), 10);
    assert_eq!(outcome.unique_seen, 10);
}

#[tokio::test(start_paused = true)]
async fn test_completes_when_oldest_row_crosses_the_window() {
    let page1 = vec![
        row("5 maart 2024", "Albert Heijn 1407", "-23,95"),
        row("1 maart 2024", "Salaris maart", "2.500,00"),
        row("15 februari 2024", "Huur", "-950,00"),
    ];
    // Overlaps the rent row, then reaches past the window's older edge.
    let page2 = vec![
        row("15 februari 2024", "Huur", "-950,00"),
        row("20 december 2023", "Gall & Gall", "-15,80"),
    ];
    let mut feed = ScriptedFeed::new(vec![page1, page2]).with_changes(&[true]);
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::WindowCovered);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(outcome.load_requests, 1);
    // Three unique rows inside the window; the December row is counted as
    // seen but not retained.
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.unique_seen, 4);
    assert!(outcome.records.iter().all(|r| r.date >= d(2024, 1, 1)));
    assert_eq!(outcome.bounds.oldest, Some(d(2023, 12, 20)));
    assert_eq!(outcome.bounds.newest, Some(d(2024, 3, 5)));
}

#[tokio::test(start_paused = true)]
async fn test_budget_exhaustion_halts_a_progressing_feed() {
    let pages = vec![
        vec![row("1 juni 2024", "Bakker", "-4,20")],
        vec![row("20 mei 2024", "Slager", "-11,35")],
        vec![row("10 mei 2024", "Markt", "-7,00")],
    ];
    let window = DateWindow::new(d(2024, 6, 1), d(2024, 1, 1));
    let tuning = EngineTuning {
        max_load_requests: 2,
        ..fast_tuning()
    };
    let mut feed = ScriptedFeed::new(pages).with_changes(&[true, true]);
    let outcome = Harvester::new(window, d(2024, 6, 1))
        .with_tuning(tuning)
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::BudgetExhausted);
    assert_eq!(outcome.cycles, 3);
    assert_eq!(outcome.load_requests, 2);
    assert_eq!(feed.loads, 2);
    assert_eq!(outcome.records.len(), 3);
    // Bounds track the extremes over every page observed.
    assert_eq!(outcome.bounds.oldest, Some(d(2024, 5, 10)));
    assert_eq!(outcome.bounds.newest, Some(d(2024, 6, 1)));
}

#[tokio::test(start_paused = true)]
async fn test_nudge_recovery_does_not_reset_the_stall_counter() {
    // Cycle 1 recovers via nudge but serves the same page again, so no
    // cycle ever makes date progress. Only progress clears the counter;
    // the stall must land on cycle 3, not cycle 4.
    let mut feed = ScriptedFeed::new(vec![march_page()]).with_changes(&[false, true]);
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::Stalled);
    assert_eq!(outcome.cycles, 3);
    assert_eq!(feed.nudges, 3);
}

// ── Merge Semantics ──

#[tokio::test(start_paused = true)]
async fn test_overlapping_pages_keep_first_seen_order() {
    let page1 = vec![
        row("8 maart 2024", "Tankstation", "-52,10"),
        row("6 maart 2024", "Boekhandel", "-18,99"),
    ];
    let page2 = vec![
        row("6 maart 2024", "Boekhandel", "-18,99"),
        row("2 maart 2024", "Apotheek", "-9,45"),
    ];
    let page3 = vec![row("30 december 2023", "Oliebollenkraam", "-6,00")];
    let mut feed = ScriptedFeed::new(vec![page1, page2, page3]).with_changes(&[true, true]);
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::WindowCovered);
    let names: Vec<&str> = outcome
        .records
        .iter()
        .map(|r| r.description.as_str())
        .collect();
    assert_eq!(names, ["Tankstation", "Boekhandel", "Apotheek"]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_pages_degrade_to_window_edges() {
    let window = march_window();
    let mut feed = ScriptedFeed::new(vec![Vec::new()]);
    let outcome = Harvester::new(window, d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .run(&mut feed)
        .await;

    // An empty page counts as the window edges, so the run stalls rather
    // than claiming coverage, and the bounds span the whole window.
    assert_eq!(outcome.reason, StopReason::Stalled);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.bounds.oldest, Some(window.end));
    assert_eq!(outcome.bounds.newest, Some(window.start));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_rows_are_dropped_not_fatal() {
    let page = vec![
        row("morgen", "Onleesbare datum", "-1,00"),
        row("4 maart 2024", "Drogist", "-3,75"),
        row("3 maart 2024", "Kapper", "geen bedrag"),
    ];
    let tuning = EngineTuning {
        max_no_progress_retries: 1,
        ..fast_tuning()
    };
    let mut feed = ScriptedFeed::new(vec![page]);
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(tuning)
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::Stalled);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].description, "Drogist");
}

// ── Cancellation ──

#[tokio::test(start_paused = true)]
async fn test_cancel_before_the_first_cycle() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut feed = ScriptedFeed::new(vec![march_page()]);
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .with_cancel(cancel)
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::Cancelled);
    assert_eq!(outcome.cycles, 0);
    assert!(outcome.records.is_empty());
    assert_eq!(feed.loads, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_run_keeps_partial_results() {
    let page1 = vec![row("8 maart 2024", "Tankstation", "-52,10")];
    let page2 = vec![row("5 maart 2024", "Supermarkt", "-31,60")];
    let cancel = CancelFlag::new();
    let mut feed = ScriptedFeed::new(vec![page1, page2])
        .with_changes(&[true])
        .cancel_after_loads(2, cancel.clone());
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .with_cancel(cancel)
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::Cancelled);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(outcome.records.len(), 2);
}

// ── Event Stream ──

#[tokio::test(start_paused = true)]
async fn test_event_stream_reports_cycles_nudges_and_completion() {
    let (tx, mut rx) = progress::channel();
    let mut feed = ScriptedFeed::new(vec![march_page()]);
    let outcome = Harvester::new(march_window(), d(2024, 3, 10))
        .with_tuning(fast_tuning())
        .with_progress(tx)
        .run(&mut feed)
        .await;

    // The run dropped the only sender, so the receiver drains and closes.
    let mut events = Vec::new();
    while let Ok(event) = rx.recv().await {
        events.push(event);
    }

    let run_id = events[0].run_id.clone();
    for (index, event) in events.iter().enumerate() {
        assert_eq!(event.seq, index as u64 + 1);
        assert_eq!(event.run_id, run_id);
    }

    let mut cycles_seen = 0u32;
    let mut nudge_retries = Vec::new();
    for event in &events {
        match &event.event {
            HarvestEventKind::CycleCompleted {
                cycle, fraction, ..
            } => {
                cycles_seen += 1;
                assert_eq!(*cycle, cycles_seen);
                assert!((0.0..=1.0).contains(fraction));
            }
            HarvestEventKind::NudgeAttempted { retry } => nudge_retries.push(*retry),
            HarvestEventKind::RunFinished {
                fraction,
                reason,
                retained,
                ..
            } => {
                assert_eq!(*fraction, 1.0);
                assert_eq!(reason, "stalled");
                assert_eq!(*retained, outcome.records.len());
            }
        }
    }
    assert_eq!(cycles_seen, outcome.cycles);
    assert_eq!(nudge_retries, [1, 2, 3]);
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(HarvestEventKind::RunFinished { .. })
    ));
}

// ── Full Pipeline ──

fn sim_config() -> SimFeedConfig {
    SimFeedConfig {
        newest: d(2024, 6, 30),
        ledger_days: 40,
        max_per_day: 3,
        initial_items: 12,
        items_per_load: 10,
        render_cap: 150,
        append_latency: Duration::from_millis(40),
        drop_every: None,
        seed: 11,
    }
}

fn in_window_keys(feed: &SimulatedFeed, window: DateWindow) -> BTreeSet<String> {
    feed.ground_truth()
        .iter()
        .filter(|record| window.contains(record.date))
        .map(|record| record.identity_key())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_simulated_feed_harvest_matches_ground_truth() {
    let window = DateWindow::new(d(2024, 6, 30), d(2024, 6, 10));
    let mut feed = SimulatedFeed::new(sim_config());
    let expected = in_window_keys(&feed, window);

    let tuning = EngineTuning {
        change_timeout: Duration::from_millis(500),
        nudge_timeout: Duration::from_millis(300),
        ..fast_tuning()
    };
    let outcome = Harvester::new(window, d(2024, 6, 30))
        .with_tuning(tuning)
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::WindowCovered);
    let harvested: BTreeSet<String> = outcome.records.iter().map(|r| r.identity_key()).collect();
    assert_eq!(harvested, expected);
    assert_eq!(outcome.bounds.newest, Some(d(2024, 6, 30)));
}

#[tokio::test(start_paused = true)]
async fn test_simulated_feed_with_lost_triggers_still_converges() {
    let config = SimFeedConfig {
        drop_every: Some(2),
        ..sim_config()
    };
    let window = DateWindow::new(d(2024, 6, 30), d(2024, 6, 10));
    let mut feed = SimulatedFeed::new(config);
    let expected = in_window_keys(&feed, window);

    let (tx, mut rx) = progress::channel();
    let tuning = EngineTuning {
        change_timeout: Duration::from_millis(500),
        nudge_timeout: Duration::from_millis(300),
        ..fast_tuning()
    };
    let outcome = Harvester::new(window, d(2024, 6, 30))
        .with_tuning(tuning)
        .with_progress(tx)
        .run(&mut feed)
        .await;

    assert_eq!(outcome.reason, StopReason::WindowCovered);
    let harvested: BTreeSet<String> = outcome.records.iter().map(|r| r.identity_key()).collect();
    assert_eq!(harvested, expected);

    // Every second load trigger was swallowed, so the nudge path must have
    // fired at least once on the way down.
    let mut nudged = false;
    while let Ok(event) = rx.recv().await {
        if matches!(event.event, HarvestEventKind::NudgeAttempted { .. }) {
            nudged = true;
        }
    }
    assert!(nudged);
}
