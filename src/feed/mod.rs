//! Feed abstraction: the seam between the engine and a concrete
//! lazily-loading item source.
//!
//! Defines the [`Feed`] trait the collection engine drives, with a
//! browser-backed implementation (chromiumoxide) and a simulated one for
//! tests and offline runs.

pub mod chromium;
pub mod sim;

use crate::extract::RawItem;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A virtualized, lazily-loading source of rendered feed items.
///
/// One engine run drives exactly one feed. Every method is best-effort from
/// the engine's point of view: a failing advance or wait degrades into the
/// engine's stall/retry path instead of aborting the run.
#[async_trait]
pub trait Feed: Send {
    /// Short label for logs.
    fn describe(&self) -> String;

    /// The currently rendered items in document order (newest first, older
    /// items appended at the end as the feed advances).
    async fn snapshot(&mut self) -> Result<Vec<RawItem>>;

    /// Ask the host to render more content (advance to the bottom).
    async fn request_more(&mut self) -> Result<()>;

    /// Back off slightly, then advance again. Some lazy loaders only fire
    /// on an intermediate scroll-position delta.
    async fn nudge(&mut self) -> Result<()>;

    /// Wait until the feed mutates, up to `timeout`. `Ok(true)` when a
    /// change was observed first. The observation is scoped to this call
    /// and released on every exit path.
    async fn await_change(&mut self, timeout: Duration) -> Result<bool>;
}
