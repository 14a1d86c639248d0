//! Snapshot extraction: raw rendered items to normalized [`Record`]s.
//!
//! Extraction is a pure function of one snapshot plus a reference date. Each
//! item is parsed in isolation so a single malformed row never aborts the
//! rest of the snapshot: items missing a field are skipped quietly, items
//! that fail to parse are dropped with a warning.

pub mod amounts;
pub mod dates;

use crate::record::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One rendered feed item as the feed saw it: three raw text fields, any of
/// which may be absent on a partially-rendered row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItem {
    pub date: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
}

impl RawItem {
    pub fn new(
        date: impl Into<String>,
        description: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            date: Some(date.into()),
            description: Some(description.into()),
            amount: Some(amount.into()),
        }
    }
}

/// Why a single item could not be turned into a record.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("item is missing its {0} field")]
    MissingField(&'static str),
    #[error("empty date text")]
    EmptyDate,
    #[error("unrecognized date phrase {0:?}")]
    UnrecognizedDate(String),
    #[error("unknown month name {0:?}")]
    UnknownMonth(String),
    #[error("invalid day number {0:?}")]
    InvalidDay(String),
    #[error("invalid year number {0:?}")]
    InvalidYear(String),
    #[error("no such calendar date: {year}-{month:02}-{day:02}")]
    ImpossibleDate { year: i32, month: u32, day: u32 },
    #[error("malformed amount {0:?}")]
    MalformedAmount(String),
}

/// Collapse consecutive whitespace to single spaces and trim.
pub fn normalize_description(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turns raw snapshot items into normalized records.
pub struct Extractor {
    /// The date `"vandaag"` and year-less phrases resolve against.
    reference: NaiveDate,
}

impl Extractor {
    pub fn new(reference: NaiveDate) -> Self {
        Self { reference }
    }

    /// Extract every parseable record from a snapshot.
    ///
    /// Items missing a required field or failing to parse are dropped; the
    /// remaining items are unaffected.
    pub fn extract(&self, items: &[RawItem]) -> Vec<Record> {
        let mut records = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            match self.extract_one(item) {
                Ok(record) => records.push(record),
                Err(ExtractError::MissingField(field)) => {
                    debug!("snapshot item {idx}: missing {field} field, skipped");
                }
                Err(e) => warn!("snapshot item {idx} dropped: {e}"),
            }
        }
        records
    }

    fn extract_one(&self, item: &RawItem) -> Result<Record, ExtractError> {
        let date_text = item
            .date
            .as_deref()
            .ok_or(ExtractError::MissingField("date"))?;
        let desc_text = item
            .description
            .as_deref()
            .ok_or(ExtractError::MissingField("description"))?;
        let amount_text = item
            .amount
            .as_deref()
            .ok_or(ExtractError::MissingField("amount"))?;

        let date = dates::parse_date(date_text, self.reference)?;
        let amount = amounts::parse_amount(amount_text)?;
        Ok(Record::new(date, normalize_description(desc_text), amount))
    }
}
