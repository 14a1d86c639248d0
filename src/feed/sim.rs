//! Deterministic in-process feed for tests and the `simulate` command.
//!
//! Builds a seeded synthetic ledger and replays it through the same
//! virtualized-window behavior a real host exhibits: an initial batch,
//! appends that land after a latency, a render cap that drops the newest
//! rows out of view, and a loader that can miss triggers.

use crate::detect::ChangePulse;
use crate::extract::dates::month_name;
use crate::extract::RawItem;
use crate::feed::Feed;
use crate::record::Record;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const MERCHANTS: [&str; 10] = [
    "ALBERT HEIJN 1406 AMSTERDAM",
    "NS GROEP IZ REIZIGERS",
    "BOL.COM BV UTRECHT",
    "COOLBLUE BV ROTTERDAM",
    "SPOTIFY AB STOCKHOLM",
    "JUMBO SUPERMARKT 573",
    "SHELL STATION HAARLEM",
    "GEMEENTE AMSTERDAM BELASTING",
    "KPN BV DEN HAAG",
    "SALARIS WERKGEVER BV",
];

/// Knobs for the synthetic ledger and its loading behavior.
#[derive(Debug, Clone)]
pub struct SimFeedConfig {
    /// Date of the newest ledger entry; also the extraction reference for
    /// `vandaag` rendering.
    pub newest: NaiveDate,
    /// How many calendar days the ledger spans. Every day gets at least
    /// one entry.
    pub ledger_days: u32,
    /// Upper bound on entries per day.
    pub max_per_day: u32,
    /// Items rendered before the first load request.
    pub initial_items: usize,
    /// Items appended per honored load request.
    pub items_per_load: usize,
    /// Maximum rendered rows; older appends push the newest rows out.
    pub render_cap: usize,
    /// Delay between a load request and the rows landing.
    pub append_latency: Duration,
    /// When set, every Nth load request is silently lost. A nudge still
    /// gets through, which is exactly the recovery the engine runs.
    pub drop_every: Option<u32>,
    pub seed: u64,
}

impl Default for SimFeedConfig {
    fn default() -> Self {
        Self {
            newest: Utc::now().date_naive(),
            ledger_days: 120,
            max_per_day: 3,
            initial_items: 30,
            items_per_load: 25,
            render_cap: 150,
            append_latency: Duration::from_millis(150),
            drop_every: None,
            seed: 7,
        }
    }
}

struct SimState {
    /// Index of the first rendered ledger row.
    rendered_from: usize,
    /// One past the last rendered ledger row.
    rendered_upto: usize,
    render_cap: usize,
}

/// Feed backed by a pre-generated ledger instead of a live page.
pub struct SimulatedFeed {
    ledger: Arc<Vec<(Record, RawItem)>>,
    state: Arc<Mutex<SimState>>,
    pulse: ChangePulse,
    latency: Duration,
    items_per_load: usize,
    drop_every: Option<u32>,
    loads: u32,
    label: String,
}

impl SimulatedFeed {
    pub fn new(config: SimFeedConfig) -> Self {
        let ledger = Arc::new(build_ledger(&config));
        let label = format!("simulated({} items, seed {})", ledger.len(), config.seed);
        let state = Arc::new(Mutex::new(SimState {
            rendered_from: 0,
            rendered_upto: config.initial_items.min(ledger.len()),
            render_cap: config.render_cap.max(1),
        }));
        Self {
            ledger,
            state,
            pulse: ChangePulse::default(),
            latency: config.append_latency,
            items_per_load: config.items_per_load.max(1),
            drop_every: config.drop_every,
            loads: 0,
            label,
        }
    }

    /// Every ledger record, newest first. Descriptions carry a unique
    /// reference number, so identity keys never collide and callers can
    /// compare harvest output against this directly.
    pub fn ground_truth(&self) -> Vec<Record> {
        self.ledger.iter().map(|(record, _)| record.clone()).collect()
    }

    fn spawn_append(&self) {
        let ledger_len = self.ledger.len();
        let state = Arc::clone(&self.state);
        let pulse = self.pulse.clone();
        let latency = self.latency;
        let step = self.items_per_load;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let mut state = state.lock().await;
            if state.rendered_upto >= ledger_len {
                // Ledger exhausted: the page stops mutating.
                return;
            }
            state.rendered_upto = (state.rendered_upto + step).min(ledger_len);
            let rendered = state.rendered_upto - state.rendered_from;
            if rendered > state.render_cap {
                state.rendered_from = state.rendered_upto - state.render_cap;
            }
            pulse.signal();
        });
    }
}

#[async_trait]
impl Feed for SimulatedFeed {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn snapshot(&mut self) -> Result<Vec<RawItem>> {
        let state = self.state.lock().await;
        Ok(self.ledger[state.rendered_from..state.rendered_upto]
            .iter()
            .map(|(_, raw)| raw.clone())
            .collect())
    }

    async fn request_more(&mut self) -> Result<()> {
        self.loads += 1;
        if let Some(every) = self.drop_every {
            if every > 0 && self.loads % every == 0 {
                debug!(load = self.loads, "simulated loader lost the trigger");
                return Ok(());
            }
        }
        self.spawn_append();
        Ok(())
    }

    async fn nudge(&mut self) -> Result<()> {
        self.spawn_append();
        Ok(())
    }

    async fn await_change(&mut self, timeout: Duration) -> Result<bool> {
        Ok(self.pulse.await_change(timeout).await)
    }
}

fn build_ledger(config: &SimFeedConfig) -> Vec<(Record, RawItem)> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut ledger = Vec::new();
    let mut reference = 0u32;
    for offset in 0..config.ledger_days {
        let Some(date) = config.newest.checked_sub_days(Days::new(offset as u64)) else {
            break;
        };
        let per_day = rng.gen_range(1..=config.max_per_day.max(1));
        for _ in 0..per_day {
            reference += 1;
            let merchant = MERCHANTS[rng.gen_range(0..MERCHANTS.len())];
            let description = format!("{merchant} REF{reference:06}");
            let cents: i64 = rng.gen_range(-12_000..=8_000);
            let record = Record::new(date, description.clone(), cents as f64 / 100.0);
            let raw_description = if rng.gen_bool(0.12) {
                description.replacen(' ', "  ", 1)
            } else {
                description
            };
            let raw = RawItem::new(
                render_date(date, config.newest),
                raw_description,
                render_amount(cents),
            );
            ledger.push((record, raw));
        }
    }
    ledger
}

fn render_date(date: NaiveDate, newest: NaiveDate) -> String {
    if date == newest {
        "vandaag".to_string()
    } else if date.year() == newest.year() {
        format!("{} {}", date.day(), month_name(date.month()))
    } else {
        format!("{} {} {}", date.day(), month_name(date.month()), date.year())
    }
}

fn render_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let whole = cents.unsigned_abs() / 100;
    let frac = cents.unsigned_abs() % 100;
    format!("{sign}€ {},{frac:02}", group_thousands(whole))
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}
