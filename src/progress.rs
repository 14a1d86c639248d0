// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scan-bounds tracking, completion estimation, and progress events.
//!
//! The engine emits [`HarvestEvent`]s during a run, which flow through a
//! `tokio::sync::broadcast` channel to all subscribers (CLI progress line,
//! log followers). When no subscriber exists, events are silently dropped.

use crate::record::DateWindow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Oldest and newest record dates observed across a run, over every page
/// seen, whether or not those records fall inside the requested window.
///
/// Monotonic for the lifetime of one run: `oldest` only decreases and
/// `newest` only increases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanBounds {
    pub oldest: Option<NaiveDate>,
    pub newest: Option<NaiveDate>,
}

impl ScanBounds {
    /// Fold one page's extremes into the running bounds.
    pub fn observe(&mut self, oldest_on_page: NaiveDate, newest_on_page: NaiveDate) {
        if self.oldest.is_none_or(|d| oldest_on_page < d) {
            self.oldest = Some(oldest_on_page);
        }
        if self.newest.is_none_or(|d| newest_on_page > d) {
            self.newest = Some(newest_on_page);
        }
    }

    /// Whole days between the bounds, once both are known.
    pub fn days_covered(&self) -> Option<i64> {
        match (self.oldest, self.newest) {
            (Some(oldest), Some(newest)) => Some((newest - oldest).num_days()),
            _ => None,
        }
    }
}

/// Completion-fraction and ETA estimation for one run.
///
/// The fraction compares scanned depth against the requested window and is
/// not required to be monotonic cycle-to-cycle (either bound can move), but
/// trends upward as the scan walks backward in time.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    window: DateWindow,
    bounds: ScanBounds,
}

impl ProgressTracker {
    pub fn new(window: DateWindow) -> Self {
        Self {
            window,
            bounds: ScanBounds::default(),
        }
    }

    /// Record one page's observed extremes.
    pub fn observe_page(&mut self, oldest_on_page: NaiveDate, newest_on_page: NaiveDate) {
        self.bounds.observe(oldest_on_page, newest_on_page);
    }

    pub fn bounds(&self) -> ScanBounds {
        self.bounds
    }

    /// Fraction of the requested window covered so far, in `[0, 1]`.
    ///
    /// `0` until both bounds are known; a zero-length window reports `1` as
    /// soon as anything was scanned.
    pub fn fraction(&self) -> f64 {
        let Some(covered) = self.bounds.days_covered() else {
            return 0.0;
        };
        let window_days = self.window.days();
        if window_days <= 0 {
            return 1.0;
        }
        (covered as f64 / window_days as f64).clamp(0.0, 1.0)
    }

    /// Estimated time remaining, extrapolated from scan speed so far.
    ///
    /// `None` until there is enough signal: both bounds known, at least one
    /// whole day covered, more than a second elapsed. Never negative.
    pub fn eta(&self, elapsed: Duration) -> Option<Duration> {
        let days_covered = self.bounds.days_covered()?;
        let elapsed_secs = elapsed.as_secs_f64();
        if days_covered <= 0 || elapsed_secs <= 1.0 {
            return None;
        }
        let oldest = self.bounds.oldest?;
        let remaining_days = (oldest - self.window.end).num_days().max(0);
        let secs_per_day = elapsed_secs / days_covered as f64;
        Some(Duration::from_secs_f64(secs_per_day * remaining_days as f64))
    }
}

/// Format a duration the way a person reads it: `2h 14m 3s`, `14m 3s`, `3s`.
pub fn human_duration(duration: Duration) -> String {
    let total = duration.as_secs_f64().round().max(0.0) as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// A progress event emitted during a harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    /// The kind of progress event.
    pub event: HarvestEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEventKind {
    /// One extract/merge/decide cycle finished.
    CycleCompleted {
        cycle: u32,
        /// Completion fraction in `[0, 1]`.
        fraction: f64,
        /// Estimated seconds remaining; absent while undefined.
        eta_seconds: Option<u64>,
        retained: usize,
        unique_seen: usize,
        /// Oldest date on the page this cycle; absent for an empty page.
        oldest_on_page: Option<NaiveDate>,
        no_progress_retries: u32,
    },
    /// The primary change wait timed out and a nudge was attempted.
    NudgeAttempted { retry: u32 },
    /// The run reached a terminal state. Always carries fraction `1.0`.
    RunFinished {
        fraction: f64,
        reason: String,
        retained: usize,
        elapsed_ms: u64,
    },
}

/// Sender handle for emitting harvest events.
pub type ProgressSender = tokio::sync::broadcast::Sender<HarvestEvent>;

/// Receiver handle for consuming harvest events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<HarvestEvent>;

/// Create a progress broadcast channel with a bounded buffer.
///
/// 256 events covers a full run at the default load budget of 200 cycles.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit a progress event, silently ignoring send errors (which occur when
/// no receivers are listening).
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: &mut u64, event: HarvestEventKind) {
    if let Some(sender) = tx {
        *seq += 1;
        let _ = sender.send(HarvestEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}
