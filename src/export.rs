//! Export adapter: renders a finished run into the structured (JSON) or
//! tabular (CSV) artifact and writes it to disk.

use crate::engine::HarvestOutcome;
use crate::progress::human_duration;
use crate::record::{DateWindow, Record};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Artifact shape for a harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON document with run metadata, optional stats, and the records.
    Structured,
    /// `Date,Description,Amount` rows.
    Tabular,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Structured => "json",
            ExportFormat::Tabular => "csv",
        }
    }
}

/// Caller-supplied context that passes through into the structured artifact
/// unchanged. None of it influences the engine.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    pub category: String,
    pub source_label: String,
    pub origin_location: String,
    pub collect_stats: bool,
}

/// Income/spending breakdown over the retained records.
///
/// Income is `amount > 0`, spending is `amount < 0`; zero-amount records
/// land in neither bucket. Empty buckets average to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub total_income: f64,
    pub total_spending: f64,
    pub total: f64,
    pub income_transactions_count: usize,
    pub average_income_transaction: f64,
    pub spending_transactions_count: usize,
    pub average_spending_transaction: f64,
}

impl TransactionStats {
    pub fn compute(records: &[Record]) -> Self {
        let income: Vec<f64> = records
            .iter()
            .filter(|r| r.amount > 0.0)
            .map(|r| r.amount)
            .collect();
        let spending: Vec<f64> = records
            .iter()
            .filter(|r| r.amount < 0.0)
            .map(|r| r.amount)
            .collect();
        let total_income: f64 = income.iter().sum();
        let total_spending: f64 = spending.iter().sum();
        Self {
            total_income,
            total_spending,
            total: total_income + total_spending,
            income_transactions_count: income.len(),
            average_income_transaction: if income.is_empty() {
                0.0
            } else {
                total_income / income.len() as f64
            },
            spending_transactions_count: spending.len(),
            average_spending_transaction: if spending.is_empty() {
                0.0
            } else {
                total_spending / spending.len() as f64
            },
        }
    }
}

/// The structured artifact. Key casing follows the long-standing consumer
/// format, so downstream tooling keeps parsing these files unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredExport {
    pub exported_at: DateTime<Utc>,
    /// Requested inclusive newer bound.
    pub start_date: NaiveDate,
    /// Requested inclusive older bound.
    pub end_date: NaiveDate,
    /// Newest date actually observed, absent when nothing was scanned.
    pub actual_first_scanned: Option<NaiveDate>,
    /// Oldest date actually observed, absent when nothing was scanned.
    pub actual_last_scanned: Option<NaiveDate>,
    pub time_taken_seconds: f64,
    pub time_taken_human: String,
    pub category: String,
    pub source_label: String,
    pub origin_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TransactionStats>,
    pub transactions: Vec<Record>,
}

impl StructuredExport {
    /// Assemble the artifact for a finished run. `exported_at` is a
    /// parameter so artifacts are reproducible under test.
    pub fn from_run(
        outcome: &HarvestOutcome,
        window: DateWindow,
        metadata: &RunMetadata,
        exported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            exported_at,
            start_date: window.start,
            end_date: window.end,
            actual_first_scanned: outcome.bounds.newest,
            actual_last_scanned: outcome.bounds.oldest,
            time_taken_seconds: outcome.elapsed.as_secs_f64(),
            time_taken_human: human_duration(outcome.elapsed),
            category: metadata.category.clone(),
            source_label: metadata.source_label.clone(),
            origin_location: metadata.origin_location.clone(),
            stats: metadata
                .collect_stats
                .then(|| TransactionStats::compute(&outcome.records)),
            transactions: outcome.records.clone(),
        }
    }
}

/// Render the artifact body in the requested format.
pub fn render(format: ExportFormat, export: &StructuredExport) -> Result<String> {
    match format {
        ExportFormat::Structured => {
            serde_json::to_string_pretty(export).context("serializing structured export")
        }
        ExportFormat::Tabular => Ok(to_tabular(&export.transactions)),
    }
}

/// `Date,Description,Amount` rows. The date is ISO and unquoted, the
/// description is always quoted with embedded quotes doubled, and the
/// amount keeps its minimal decimal form (`12.3`, not `12.30`).
pub fn to_tabular(records: &[Record]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push("Date,Description,Amount".to_string());
    for record in records {
        lines.push(format!(
            "{},{},{}",
            record.date,
            quote_field(&record.description),
            record.amount
        ));
    }
    lines.join("\n")
}

fn quote_field(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// `<prefix>_<yyyy-mm-dd>.<ext>`, the naming downstream tooling sorts on.
pub fn artifact_name(prefix: &str, on: NaiveDate, format: ExportFormat) -> String {
    format!("{prefix}_{on}.{}", format.extension())
}

/// Write the artifact under `dir`, creating the directory as needed.
pub fn write_artifact(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
