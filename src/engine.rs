//! The collection engine: drives a feed through load/extract/merge cycles
//! until the requested date window is covered or progress stops.
//!
//! One engine instance runs one harvest. The loop never aborts on feed
//! errors; every failure degrades into the stall/retry path and the run
//! always ends with a best-effort outcome.

use crate::extract::Extractor;
use crate::feed::Feed;
use crate::progress::{
    emit, human_duration, HarvestEventKind, ProgressSender, ProgressTracker, ScanBounds,
};
use crate::record::{Accumulator, DateWindow, Record};
use chrono::NaiveDate;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Timing and budget knobs for a harvest run.
///
/// The defaults mirror the cadence of the lazy-load hosts this was built
/// against; tests shrink the delays to keep paused-clock runs fast.
#[derive(Debug, Clone, Copy)]
pub struct EngineTuning {
    /// Hard cap on load requests per run.
    pub max_load_requests: u32,
    /// Consecutive no-change cycles tolerated before the run stalls.
    pub max_no_progress_retries: u32,
    /// Primary wait for a change after requesting more content.
    pub change_timeout: Duration,
    /// Shorter re-wait after a nudge.
    pub nudge_timeout: Duration,
    /// Settle delay after an observed change.
    pub settle_delay: Duration,
    /// Settle delay after a nudge-recovered change.
    pub nudge_settle: Duration,
    /// Backoff before retrying a no-change cycle.
    pub backoff_delay: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            max_load_requests: 200,
            max_no_progress_retries: 3,
            change_timeout: Duration::from_millis(4500),
            nudge_timeout: Duration::from_millis(3000),
            settle_delay: Duration::from_millis(400),
            nudge_settle: Duration::from_millis(300),
            backoff_delay: Duration::from_millis(500),
        }
    }
}

/// Cooperative cancellation handle. Clone it, hand one side to the caller,
/// keep the other in the engine; tripping it ends the run at the next
/// check point with whatever was accumulated.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why a run ended. Every variant still yields a full [`HarvestOutcome`];
/// the reason is diagnostic, not a success/failure split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The oldest date on the page passed the window's older bound.
    WindowCovered,
    /// The load-request budget ran out.
    BudgetExhausted,
    /// Too many consecutive cycles without an observed change.
    Stalled,
    /// The caller tripped the cancel flag.
    Cancelled,
}

impl StopReason {
    /// One-line explanation for run summaries.
    pub fn explain(&self) -> &'static str {
        match self {
            StopReason::WindowCovered => "reached the requested date boundary",
            StopReason::BudgetExhausted => "hit the safety cap on load requests",
            StopReason::Stalled => "gave up after repeated no-progress cycles",
            StopReason::Cancelled => "cancelled before the window was covered",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            StopReason::WindowCovered => "window_covered",
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::Stalled => "stalled",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(token)
    }
}

/// Everything a finished run hands back, regardless of how it ended.
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub reason: StopReason,
    /// Unique in-window records, in the order they were first seen.
    pub records: Vec<Record>,
    /// Oldest/newest dates actually observed, including out-of-window pages.
    pub bounds: ScanBounds,
    /// Extract/merge/decide cycles executed.
    pub cycles: u32,
    /// Load requests issued (settles the budget check).
    pub load_requests: u32,
    /// Distinct identity keys seen, in-window or not.
    pub unique_seen: usize,
    pub elapsed: Duration,
}

/// Drives one harvest over one feed.
pub struct Harvester {
    window: DateWindow,
    reference: NaiveDate,
    tuning: EngineTuning,
    cancel: CancelFlag,
    progress: Option<ProgressSender>,
}

impl Harvester {
    /// `reference` anchors relative date phrases in extracted text, normally
    /// today's date.
    pub fn new(window: DateWindow, reference: NaiveDate) -> Self {
        Self {
            window,
            reference,
            tuning: EngineTuning::default(),
            cancel: CancelFlag::new(),
            progress: None,
        }
    }

    pub fn with_tuning(mut self, tuning: EngineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run to a terminal state. Feed errors are logged and absorbed; the
    /// worst case is an early stall with a partial result.
    pub async fn run(self, feed: &mut dyn Feed) -> HarvestOutcome {
        let run_id = Uuid::new_v4().to_string();
        let started = tokio::time::Instant::now();
        let mut seq = 0u64;

        let extractor = Extractor::new(self.reference);
        let mut accumulator = Accumulator::new(self.window);
        let mut tracker = ProgressTracker::new(self.window);
        let mut prev_oldest: Option<NaiveDate> = None;
        let mut cycles = 0u32;
        let mut load_requests = 0u32;
        let mut retries = 0u32;

        info!(
            run_id = %run_id,
            feed = %feed.describe(),
            start = %self.window.start,
            end = %self.window.end,
            "starting harvest"
        );

        let reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            cycles += 1;

            let raw = match feed.snapshot().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("snapshot failed, treating the page as empty: {e:#}");
                    Vec::new()
                }
            };
            let page = extractor.extract(&raw);

            // An empty page degrades to the window edges so the bounds and
            // termination logic stay well-defined.
            let page_oldest = page.iter().map(|r| r.date).min();
            let page_newest = page.iter().map(|r| r.date).max();
            let oldest_on_page = page_oldest.unwrap_or(self.window.end);
            let newest_on_page = page_newest.unwrap_or(self.window.start);
            tracker.observe_page(oldest_on_page, newest_on_page);

            for record in page {
                accumulator.admit(record);
            }

            // Progress means a strictly older oldest date, nothing else.
            // New unique rows can keep arriving while the oldest boundary
            // repeats, and that is not progress.
            let progressed = prev_oldest.is_none_or(|prev| oldest_on_page < prev);
            if progressed {
                prev_oldest = Some(oldest_on_page);
                retries = 0;
            }

            let eta = tracker.eta(started.elapsed());
            debug!(
                cycle = cycles,
                retained = accumulator.retained().len(),
                unique = accumulator.unique_seen(),
                oldest = %oldest_on_page,
                retries,
                eta = %eta.map(human_duration).unwrap_or_else(|| "n/a".to_string()),
                "cycle complete"
            );
            emit(
                &self.progress,
                &run_id,
                &mut seq,
                HarvestEventKind::CycleCompleted {
                    cycle: cycles,
                    fraction: tracker.fraction(),
                    eta_seconds: eta.map(|d| d.as_secs()),
                    retained: accumulator.retained().len(),
                    unique_seen: accumulator.unique_seen(),
                    oldest_on_page: page_oldest,
                    no_progress_retries: retries,
                },
            );

            if oldest_on_page < self.window.end {
                break StopReason::WindowCovered;
            }
            if load_requests >= self.tuning.max_load_requests {
                break StopReason::BudgetExhausted;
            }

            if let Err(e) = feed.request_more().await {
                warn!("load request failed: {e:#}");
            }
            load_requests += 1;

            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let changed = match feed.await_change(self.tuning.change_timeout).await {
                Ok(changed) => changed,
                Err(e) => {
                    warn!("change wait failed, treating as a timeout: {e:#}");
                    false
                }
            };
            if changed {
                sleep(self.tuning.settle_delay).await;
                continue;
            }

            retries += 1;
            debug!(retries, "no change detected, nudging");
            emit(
                &self.progress,
                &run_id,
                &mut seq,
                HarvestEventKind::NudgeAttempted { retry: retries },
            );
            if let Err(e) = feed.nudge().await {
                warn!("nudge failed: {e:#}");
            }
            let recovered = match feed.await_change(self.tuning.nudge_timeout).await {
                Ok(changed) => changed,
                Err(e) => {
                    warn!("post-nudge change wait failed, treating as a timeout: {e:#}");
                    false
                }
            };
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if recovered {
                sleep(self.tuning.nudge_settle).await;
                continue;
            }
            if retries >= self.tuning.max_no_progress_retries {
                break StopReason::Stalled;
            }
            sleep(self.tuning.backoff_delay).await;
        };

        let elapsed = started.elapsed();
        let retained = accumulator.retained().len();
        let unique_seen = accumulator.unique_seen();
        emit(
            &self.progress,
            &run_id,
            &mut seq,
            HarvestEventKind::RunFinished {
                fraction: 1.0,
                reason: reason.to_string(),
                retained,
                elapsed_ms: elapsed.as_millis() as u64,
            },
        );
        info!(
            run_id = %run_id,
            reason = %reason,
            retained,
            unique = unique_seen,
            cycles,
            load_requests,
            took = %human_duration(elapsed),
            "harvest finished"
        );

        HarvestOutcome {
            reason,
            records: accumulator.into_retained(),
            bounds: tracker.bounds(),
            cycles,
            load_requests,
            unique_seen,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_defaults_match_host_cadence() {
        let tuning = EngineTuning::default();
        assert_eq!(tuning.max_load_requests, 200);
        assert_eq!(tuning.max_no_progress_retries, 3);
        assert_eq!(tuning.change_timeout, Duration::from_millis(4500));
        assert_eq!(tuning.nudge_timeout, Duration::from_millis(3000));
    }

    #[test]
    fn cancel_flag_is_shared_across_clones() {
        let flag = CancelFlag::new();
        let remote = flag.clone();
        assert!(!flag.is_cancelled());
        remote.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn stop_reason_tokens_and_explanations() {
        assert_eq!(StopReason::WindowCovered.to_string(), "window_covered");
        assert_eq!(StopReason::Stalled.to_string(), "stalled");
        assert!(StopReason::BudgetExhausted.explain().contains("safety cap"));
    }
}
