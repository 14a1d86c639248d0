//! Live progress line for harvest runs.
//!
//! Renders the engine's event stream as a single indicatif bar. Stays
//! silent under --quiet/--json so machine output is never polluted.

use crate::cli::output;
use crate::progress::{human_duration, HarvestEventKind, ProgressReceiver};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Consume events until the channel closes. Await the handle after the run
/// so the final bar state lands before the summary prints.
pub fn spawn(mut events: ProgressReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        if output::is_quiet() || output::is_json() {
            return;
        }
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("  {bar:30.cyan/blue} {pos:>3}% {msg}").unwrap(),
        );
        bar.enable_steady_tick(Duration::from_millis(120));

        loop {
            match events.recv().await {
                Ok(event) => match event.event {
                    HarvestEventKind::CycleCompleted {
                        fraction,
                        eta_seconds,
                        retained,
                        no_progress_retries,
                        ..
                    } => {
                        bar.set_position((fraction * 100.0).round() as u64);
                        let eta = eta_seconds
                            .map(|s| human_duration(Duration::from_secs(s)))
                            .unwrap_or_else(|| "n/a".to_string());
                        let mut message = format!("{retained} records, eta {eta}");
                        if no_progress_retries > 0 {
                            message.push_str(&format!(" (retry {no_progress_retries})"));
                        }
                        bar.set_message(message);
                    }
                    HarvestEventKind::NudgeAttempted { retry } => {
                        bar.set_message(format!("no change observed, nudging (retry {retry})"));
                    }
                    HarvestEventKind::RunFinished { retained, .. } => {
                        bar.set_position(100);
                        bar.set_message(format!("{retained} records"));
                    }
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        bar.finish_and_clear();
    })
}
