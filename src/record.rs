//! Core data model: records, the requested date window, and the
//! deduplicating accumulator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single harvested feed entry.
///
/// Immutable once created. The amount is already normalized to two decimal
/// places by the extractor; the identity key formats it back to exactly two
/// decimals so that `12.3` and `12.30` never count as distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Calendar date of the entry (day precision).
    pub date: NaiveDate,
    /// Whitespace-normalized description text.
    pub description: String,
    /// Signed amount, positive for income, negative for spending.
    pub amount: f64,
}

impl Record {
    pub fn new(date: NaiveDate, description: impl Into<String>, amount: f64) -> Self {
        Self {
            date,
            description: description.into(),
            amount,
        }
    }

    /// Canonical identity key: ISO date, raw description, amount at 2dp.
    pub fn identity_key(&self) -> String {
        format!("{}|{}|{:.2}", self.date, self.description, self.amount)
    }
}

/// The inclusive date range a run aims to cover.
///
/// `start` is the newer bound and `end` the older one (`end <= start`); the
/// harvest walks backward in time from `start` toward `end`. Callers
/// validate against inverted windows before starting a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    /// Inclusive newer bound.
    pub start: NaiveDate,
    /// Inclusive older bound.
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Whether `date` falls inside the window (both bounds inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.end && date <= self.start
    }

    /// Window span in whole days. Zero for a single-day window.
    pub fn days(&self) -> i64 {
        (self.start - self.end).num_days()
    }
}

/// What happened when a record was offered to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New record inside the window: deduplicated and retained for output.
    Retained,
    /// New record outside the window: deduplicated, counted for scan depth,
    /// but excluded from output.
    OutOfWindow,
    /// Identity key already seen in this run.
    Duplicate,
}

/// Insertion-ordered, deduplicated collection of records.
///
/// Every distinct record observed during a run enters the dedup set, whether
/// or not its date lies inside the window; only in-window records are
/// retained for output. Out-of-window records still advancing the dedup set
/// keeps bookkeeping stable when the scan runs briefly past the window edge.
#[derive(Debug)]
pub struct Accumulator {
    window: DateWindow,
    seen: HashSet<String>,
    retained: Vec<Record>,
}

impl Accumulator {
    pub fn new(window: DateWindow) -> Self {
        Self {
            window,
            seen: HashSet::new(),
            retained: Vec::new(),
        }
    }

    /// Offer a record. Duplicates (by identity key) are ignored; new records
    /// are retained only when their date lies inside the window.
    pub fn admit(&mut self, record: Record) -> Admission {
        if !self.seen.insert(record.identity_key()) {
            return Admission::Duplicate;
        }
        if self.window.contains(record.date) {
            self.retained.push(record);
            Admission::Retained
        } else {
            Admission::OutOfWindow
        }
    }

    /// Retained in-window records, in insertion order.
    pub fn retained(&self) -> &[Record] {
        &self.retained
    }

    /// Count of distinct records observed, in-window or not.
    pub fn unique_seen(&self) -> usize {
        self.seen.len()
    }

    /// Consume the accumulator, yielding the retained records.
    pub fn into_retained(self) -> Vec<Record> {
        self.retained
    }
}
